//! Redis metrics cache tests.
//!
//! Run with `cargo test -- --ignored` against a local Redis, or point
//! `REDIS_URL` at another server.

use std::time::Duration;

use redis::AsyncCommands;

use bigfoot_worker::cache::AGGREGATED_FIELD;
use bigfoot_worker::{MetricsCache, RedisMetricsCache};

fn redis_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_cache_set_writes_field_with_ttl() {
    let url = redis_url();
    let cache = RedisMetricsCache::connect(&url).await.unwrap();
    let key = format!("metrics:test-{}", std::process::id());

    cache
        .cache_set(&key, r#"{"total_views":30}"#, Duration::from_secs(60))
        .await
        .unwrap();

    let client = redis::Client::open(url.as_str()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let value: String = conn.hget(&key, AGGREGATED_FIELD).await.unwrap();
    let ttl: i64 = conn.ttl(&key).await.unwrap();
    let _: () = conn.del(&key).await.unwrap();

    assert_eq!(value, r#"{"total_views":30}"#);
    assert!(ttl > 0 && ttl <= 60);
}
