//! HTTP client for the event service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use bigfoot_models::AggregatedAnalytics;

use crate::collaborators::{AnalyticsStore, EventStatusStore};
use crate::error::{WorkerError, WorkerResult};

/// Calls the event service's internal endpoints.
#[derive(Clone)]
pub struct EventServiceClient {
    http: Client,
    base_url: Url,
}

impl EventServiceClient {
    pub fn new(base_url: &str, timeout: Duration) -> WorkerResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| WorkerError::config_error(format!("invalid event service URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(WorkerError::config_error(format!(
                "event service URL cannot be a base: {base_url}"
            )));
        }

        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    /// `{base}/internal/events/{event_id}/{action}`, with the ID escaped.
    fn event_url(&self, event_id: &str, action: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["internal", "events", event_id, action]);
        }
        url
    }
}

#[async_trait]
impl EventStatusStore for EventServiceClient {
    async fn finalize_event_status(&self, event_id: &str) -> WorkerResult<()> {
        let url = self.event_url(event_id, "finalize");
        debug!(%url, "Finalizing event");

        self.http
            .post(url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| WorkerError::event_service_failed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AnalyticsStore for EventServiceClient {
    async fn persist_aggregated_analytics(
        &self,
        event_id: &str,
        aggregate: &AggregatedAnalytics,
    ) -> WorkerResult<()> {
        let url = self.event_url(event_id, "analytics");
        debug!(%url, "Storing aggregated analytics");

        self.http
            .put(url)
            .json(aggregate)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| WorkerError::event_service_failed(e.to_string()))?;
        Ok(())
    }
}
