//! S3-backed event archive.

use async_trait::async_trait;
use tracing::info;

use bigfoot_models::{AnalyticsDataPoint, ChatMessage};
use bigfoot_storage::{ArchiveClient, MoveOutcome};

use crate::collaborators::EventArchive;
use crate::error::WorkerResult;

#[async_trait]
impl EventArchive for ArchiveClient {
    async fn archive_chat_logs(&self, event_id: &str, messages: &[ChatMessage]) -> WorkerResult<()> {
        self.put_chat_log(event_id, messages).await?;
        Ok(())
    }

    async fn archive_analytics_data(
        &self,
        event_id: &str,
        data: &[AnalyticsDataPoint],
    ) -> WorkerResult<()> {
        self.put_analytics(event_id, data).await?;
        Ok(())
    }

    async fn archive_artifacts(&self, event_id: &str, artifacts: &[String]) -> WorkerResult<()> {
        let mut moved = 0usize;
        let mut skipped = 0usize;
        for artifact in artifacts {
            match self.move_to_cold(event_id, artifact).await? {
                MoveOutcome::Moved => moved += 1,
                MoveOutcome::AlreadyMoved => skipped += 1,
            }
        }

        info!(event_id, moved, skipped, "Artifacts moved to cold storage");
        Ok(())
    }
}
