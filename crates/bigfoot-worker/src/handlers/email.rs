//! Email notification delivery.

use std::sync::Arc;

use tracing::{info, instrument};

use bigfoot_models::EmailJob;

use crate::collaborators::Mailer;
use crate::error::WorkerResult;

pub struct EmailHandler {
    mailer: Arc<dyn Mailer>,
}

impl EmailHandler {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    #[instrument(skip_all, fields(kind = %job.kind, to = %job.to))]
    pub async fn handle(&self, job: &EmailJob) -> WorkerResult<()> {
        info!("Processing email notification");
        self.mailer.send_email(&job.to, &job.subject, &job.body).await?;
        info!(subject = %job.subject, "Email notification sent");
        Ok(())
    }
}
