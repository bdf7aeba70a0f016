//! Payload dispatch.

use async_trait::async_trait;

use bigfoot_models::JobPayload;
use bigfoot_queue::{HandlerResult, JobHandler};

use crate::collaborators::Collaborators;
use crate::handlers::{AnalyticsHandler, EmailHandler, EventCleanupHandler};

/// Routes each payload to its handler.
///
/// Registered on every built-in queue; the match is exhaustive so a new
/// payload kind cannot be left without a handler.
pub struct JobProcessor {
    cleanup: EventCleanupHandler,
    analytics: AnalyticsHandler,
    email: EmailHandler,
}

impl JobProcessor {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            cleanup: EventCleanupHandler::new(collaborators.archive, collaborators.event_status),
            analytics: AnalyticsHandler::new(collaborators.analytics_store, collaborators.cache),
            email: EmailHandler::new(collaborators.mailer),
        }
    }
}

#[async_trait]
impl JobHandler for JobProcessor {
    async fn handle(&self, payload: &JobPayload) -> HandlerResult {
        let result = match payload {
            JobPayload::EventCleanup(job) => self.cleanup.handle(job).await,
            JobPayload::AnalyticsProcessing(job) => self.analytics.handle(job).await,
            JobPayload::EmailNotification(job) => self.email.handle(job).await,
        };
        result.map_err(Into::into)
    }
}
