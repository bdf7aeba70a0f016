//! Background job worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use bigfoot_queue::{QueueManager, RedisJobStore, SystemClock};
use bigfoot_storage::ArchiveClient;
use bigfoot_worker::telemetry::{init_metrics, init_tracing};
use bigfoot_worker::{
    connect_redis, create_router, mailer_from_config, register_queues, AdminState, Collaborators,
    EventServiceClient, JobProcessor, RedisMetricsCache, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;
    info!("Starting bigfoot-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let metrics_handle = if config.metrics_enabled {
        Some(init_metrics()?)
    } else {
        None
    };

    // Collaborators
    let archive = ArchiveClient::from_env()
        .await
        .context("Failed to create S3 archive client")?;
    let redis = connect_redis(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    let cache = RedisMetricsCache::new(redis.clone());
    let event_service = Arc::new(
        EventServiceClient::new(&config.event_service_url, config.http_timeout)
            .context("Failed to create event service client")?,
    );
    let mailer = mailer_from_config(&config.mail, config.http_timeout)?;

    let collaborators = Collaborators {
        archive: Arc::new(archive),
        event_status: event_service.clone(),
        analytics_store: event_service,
        cache: Arc::new(cache),
        mailer,
    };

    // Queues live in Redis so other services can enqueue into them
    let store = RedisJobStore::new(redis, config.queue_prefix.clone());
    let manager = QueueManager::new(Arc::new(store), Arc::new(SystemClock), config.manager.clone());
    let processor = Arc::new(JobProcessor::new(collaborators));
    register_queues(&manager, &config.queues, processor).await?;
    manager.start().await?;

    // Admin server
    let addr: SocketAddr = format!("{}:{}", config.admin_host, config.admin_port)
        .parse()
        .context("Invalid admin address")?;
    let router = create_router(
        AdminState {
            manager: manager.clone(),
        },
        metrics_handle,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind admin server to {addr}"))?;
    info!("Admin server listening on {}", addr);

    let server_manager = manager.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        server_manager.shutdown().await;
    });

    if let Err(e) = server.await {
        error!("Admin server error: {}", e);
    }

    // Covers the server exiting on its own
    manager.shutdown().await;

    info!("Worker shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
