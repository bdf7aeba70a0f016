//! Structured job lifecycle logging.
//!
//! Every queue event is logged with the queue name, job ID and job type so a
//! single job can be followed across attempts.

use std::time::Duration;

use tracing::{debug, error, info, warn, Span};

use crate::record::JobRecord;

/// Logger carrying the identifying fields of one job.
#[derive(Debug, Clone)]
pub struct JobLogger {
    queue: String,
    job_id: String,
    job_type: &'static str,
}

impl JobLogger {
    pub fn new(record: &JobRecord) -> Self {
        Self {
            queue: record.queue_name.clone(),
            job_id: record.id.to_string(),
            job_type: record.job_type(),
        }
    }

    pub fn log_added(&self, priority: i32, delay: Duration) {
        info!(
            queue = %self.queue,
            job_id = %self.job_id,
            job_type = self.job_type,
            priority,
            delay_ms = delay.as_millis() as u64,
            "Job added to queue"
        );
    }

    pub fn log_started(&self, attempt: u32) {
        debug!(
            queue = %self.queue,
            job_id = %self.job_id,
            job_type = self.job_type,
            attempt,
            "Queue job started"
        );
    }

    pub fn log_completed(&self, duration: Duration) {
        info!(
            queue = %self.queue,
            job_id = %self.job_id,
            job_type = self.job_type,
            duration_ms = duration.as_millis() as u64,
            "Queue job completed"
        );
    }

    /// A failed attempt that will be retried after `delay`.
    pub fn log_retry(&self, error: &str, attempts: u32, max_attempts: u32, delay: Duration) {
        warn!(
            queue = %self.queue,
            job_id = %self.job_id,
            job_type = self.job_type,
            error,
            attempts,
            max_attempts,
            retry_in_ms = delay.as_millis() as u64,
            "Queue job failed, retrying"
        );
    }

    /// A failed attempt with no attempts left.
    pub fn log_failed(&self, error: &str, attempts: u32, max_attempts: u32) {
        error!(
            queue = %self.queue,
            job_id = %self.job_id,
            job_type = self.job_type,
            error,
            attempts,
            max_attempts,
            "Queue job failed"
        );
    }

    pub fn log_stalled(&self, timeout: Duration) {
        warn!(
            queue = %self.queue,
            job_id = %self.job_id,
            job_type = self.job_type,
            timeout_ms = timeout.as_millis() as u64,
            "Queue job stalled"
        );
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn job_type(&self) -> &'static str {
        self.job_type
    }

    /// Span wrapping one handler invocation.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            queue = %self.queue,
            job_id = %self.job_id,
            job_type = self.job_type
        )
    }
}
