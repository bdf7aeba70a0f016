//! Analytics aggregation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use bigfoot_models::{AggregatedAnalytics, AnalyticsDataPoint, AnalyticsProcessingJob};

use crate::collaborators::{AnalyticsStore, MetricsCache};
use crate::error::WorkerResult;

/// How long aggregated metrics stay in the real-time cache.
pub const METRICS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Cache key holding an event's latest aggregate.
pub fn metrics_cache_key(event_id: &str) -> String {
    format!("metrics:{}", event_id)
}

/// Fold raw samples into event totals. Missing counters count as zero.
pub fn aggregate_analytics_data(data: &[AnalyticsDataPoint]) -> AggregatedAnalytics {
    if data.is_empty() {
        return AggregatedAnalytics::default();
    }

    // Totals saturate instead of wrapping
    let total_views = data
        .iter()
        .map(|d| d.views.unwrap_or(0))
        .fold(0, u64::saturating_add);
    let viewers: Vec<u64> = data.iter().map(|d| d.viewers.unwrap_or(0)).collect();
    let peak_viewers = viewers.iter().copied().max().unwrap_or(0);
    let viewer_sum: f64 = viewers.iter().map(|&v| v as f64).sum();
    let total_chat_messages = data
        .iter()
        .map(|d| d.chat_messages.unwrap_or(0))
        .fold(0, u64::saturating_add);

    AggregatedAnalytics {
        total_views,
        peak_viewers,
        average_viewers: viewer_sum / data.len() as f64,
        total_chat_messages,
        engagement_rate: 0.0,
    }
}

/// Aggregates raw samples, persists the result and refreshes the cache.
pub struct AnalyticsHandler {
    store: Arc<dyn AnalyticsStore>,
    cache: Arc<dyn MetricsCache>,
}

impl AnalyticsHandler {
    pub fn new(store: Arc<dyn AnalyticsStore>, cache: Arc<dyn MetricsCache>) -> Self {
        Self { store, cache }
    }

    #[instrument(skip_all, fields(event_id = %job.event_id))]
    pub async fn handle(&self, job: &AnalyticsProcessingJob) -> WorkerResult<()> {
        info!(data_points = job.raw_data.len(), "Processing analytics data");

        let aggregate = aggregate_analytics_data(&job.raw_data);

        info!("Storing aggregated analytics");
        self.store
            .persist_aggregated_analytics(&job.event_id, &aggregate)
            .await?;

        let value = serde_json::to_string(&aggregate)?;
        self.cache
            .cache_set(&metrics_cache_key(&job.event_id), &value, METRICS_CACHE_TTL)
            .await?;

        info!(
            total_views = aggregate.total_views,
            peak_viewers = aggregate.peak_viewers,
            "Analytics processing completed"
        );
        Ok(())
    }
}
