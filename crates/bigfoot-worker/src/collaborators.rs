//! Services the handlers delegate to.
//!
//! Handlers only see these traits; the binary wires in the S3, Redis and
//! HTTP adapters, and tests wire in fakes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use bigfoot_models::{AggregatedAnalytics, AnalyticsDataPoint, ChatMessage};

use crate::error::WorkerResult;

/// Long-term storage for a finished event's data.
///
/// Every operation must be safe to repeat for the same event.
#[async_trait]
pub trait EventArchive: Send + Sync {
    async fn archive_chat_logs(&self, event_id: &str, messages: &[ChatMessage]) -> WorkerResult<()>;

    async fn archive_analytics_data(
        &self,
        event_id: &str,
        data: &[AnalyticsDataPoint],
    ) -> WorkerResult<()>;

    /// Move recordings and thumbnails to cold storage.
    async fn archive_artifacts(&self, event_id: &str, artifacts: &[String]) -> WorkerResult<()>;
}

#[async_trait]
pub trait EventStatusStore: Send + Sync {
    /// Mark the event finished with its final statistics.
    async fn finalize_event_status(&self, event_id: &str) -> WorkerResult<()>;
}

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn persist_aggregated_analytics(
        &self,
        event_id: &str,
        aggregate: &AggregatedAnalytics,
    ) -> WorkerResult<()>;
}

/// Short-lived cache read by the real-time dashboards.
#[async_trait]
pub trait MetricsCache: Send + Sync {
    async fn cache_set(&self, key: &str, value: &str, ttl: Duration) -> WorkerResult<()>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> WorkerResult<()>;
}

/// The full set of collaborators a worker needs.
#[derive(Clone)]
pub struct Collaborators {
    pub archive: Arc<dyn EventArchive>,
    pub event_status: Arc<dyn EventStatusStore>,
    pub analytics_store: Arc<dyn AnalyticsStore>,
    pub cache: Arc<dyn MetricsCache>,
    pub mailer: Arc<dyn Mailer>,
}
