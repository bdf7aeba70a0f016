//! Post-stream event cleanup.

use std::sync::Arc;

use tracing::{info, instrument};

use bigfoot_models::EventCleanupJob;

use crate::collaborators::{EventArchive, EventStatusStore};
use crate::error::WorkerResult;

/// Archives an ended event's data, then finalizes the event.
///
/// Steps run in order and each is skipped when its input is empty. The
/// first error aborts the rest; the event is only finalized after every
/// archival step succeeded.
pub struct EventCleanupHandler {
    archive: Arc<dyn EventArchive>,
    status: Arc<dyn EventStatusStore>,
}

impl EventCleanupHandler {
    pub fn new(archive: Arc<dyn EventArchive>, status: Arc<dyn EventStatusStore>) -> Self {
        Self { archive, status }
    }

    #[instrument(skip_all, fields(event_id = %job.event_id, container_id = %job.container_id))]
    pub async fn handle(&self, job: &EventCleanupJob) -> WorkerResult<()> {
        info!("Processing event cleanup");

        if !job.chat_logs.is_empty() {
            info!(message_count = job.chat_logs.len(), "Archiving chat logs");
            self.archive
                .archive_chat_logs(&job.event_id, &job.chat_logs)
                .await?;
        }

        if !job.analytics_data.is_empty() {
            info!(data_points = job.analytics_data.len(), "Archiving analytics data");
            self.archive
                .archive_analytics_data(&job.event_id, &job.analytics_data)
                .await?;
        }

        if !job.artifacts.is_empty() {
            info!(artifact_count = job.artifacts.len(), "Archiving artifacts");
            self.archive
                .archive_artifacts(&job.event_id, &job.artifacts)
                .await?;
        }

        info!("Updating event final status");
        self.status.finalize_event_status(&job.event_id).await?;

        info!("Event cleanup completed");
        Ok(())
    }
}
