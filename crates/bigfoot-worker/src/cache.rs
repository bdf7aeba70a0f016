//! Redis-backed real-time metrics cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncConnectionConfig;
use tracing::{debug, error, info, warn};

use crate::collaborators::MetricsCache;
use crate::error::{WorkerError, WorkerResult};

/// Hash field holding the serialized aggregate.
pub const AGGREGATED_FIELD: &str = "aggregated";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECT_RETRIES: u32 = 10;

/// Delay before reconnect attempt `retries`, capped at one second.
pub fn reconnect_delay(retries: u32) -> Duration {
    Duration::from_millis((u64::from(retries) * 50).min(1000))
}

/// Metrics cache over a multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisMetricsCache {
    conn: MultiplexedConnection,
}

/// Open a multiplexed connection and verify the server answers `PING`.
///
/// Retries the initial connection with a growing delay and gives up
/// after ten attempts. The job store and the metrics cache share it.
pub async fn connect_redis(redis_url: &str) -> WorkerResult<MultiplexedConnection> {
    let client = redis::Client::open(redis_url)?;
    let config = AsyncConnectionConfig::new()
        .set_connection_timeout(CONNECT_TIMEOUT)
        .set_response_timeout(RESPONSE_TIMEOUT);

    let mut retries = 0u32;
    let mut conn = loop {
        match client
            .get_multiplexed_async_connection_with_config(&config)
            .await
        {
            Ok(conn) => break conn,
            Err(e) if retries < MAX_CONNECT_RETRIES => {
                retries += 1;
                let delay = reconnect_delay(retries);
                warn!(
                    error = %e,
                    attempt = retries,
                    delay_ms = delay.as_millis() as u64,
                    "Redis connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!("Redis connection failed after {} attempts", MAX_CONNECT_RETRIES);
                return Err(WorkerError::Redis(e));
            }
        }
    };

    let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
    debug!("Redis replied {}", pong);
    info!("Redis connection established successfully");

    Ok(conn)
}

impl RedisMetricsCache {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// Connect on a dedicated connection.
    pub async fn connect(redis_url: &str) -> WorkerResult<Self> {
        Ok(Self::new(connect_redis(redis_url).await?))
    }
}

#[async_trait]
impl MetricsCache for RedisMetricsCache {
    async fn cache_set(&self, key: &str, value: &str, ttl: Duration) -> WorkerResult<()> {
        let mut conn = self.conn.clone();
        let ttl_secs = i64::try_from(ttl.as_secs())
            .map_err(|_| WorkerError::cache_failed(format!("ttl too large: {ttl:?}")))?;

        let _: () = redis::pipe()
            .atomic()
            .hset(key, AGGREGATED_FIELD, value)
            .ignore()
            .expire(key, ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(key, ttl_secs, "Cached metrics");
        Ok(())
    }
}
