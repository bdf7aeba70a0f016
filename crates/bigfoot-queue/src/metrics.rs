//! Queue metrics.
//!
//! Recorded through the `metrics` facade; the binary decides which exporter
//! is installed.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use bigfoot_models::JobState;

use crate::record::QueueCounts;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_ENQUEUED_TOTAL: &str = "bigfoot_jobs_enqueued_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "bigfoot_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "bigfoot_jobs_failed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "bigfoot_jobs_retried_total";
    pub const JOBS_STALLED_TOTAL: &str = "bigfoot_jobs_stalled_total";
    pub const JOB_DURATION_SECONDS: &str = "bigfoot_job_duration_seconds";
    pub const JOBS_CLEANED_TOTAL: &str = "bigfoot_jobs_cleaned_total";
    pub const QUEUE_JOBS: &str = "bigfoot_queue_jobs";
}

fn labels(queue: &str, job_type: &str) -> [(&'static str, String); 2] {
    [("queue", queue.to_string()), ("type", job_type.to_string())]
}

pub fn record_job_enqueued(queue: &str, job_type: &str) {
    counter!(names::JOBS_ENQUEUED_TOTAL, &labels(queue, job_type)).increment(1);
}

pub fn record_job_completed(queue: &str, job_type: &str, duration: Duration) {
    let labels = labels(queue, job_type);
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration.as_secs_f64());
}

/// Record a terminal failure.
pub fn record_job_failed(queue: &str, job_type: &str) {
    counter!(names::JOBS_FAILED_TOTAL, &labels(queue, job_type)).increment(1);
}

pub fn record_job_retried(queue: &str, job_type: &str) {
    counter!(names::JOBS_RETRIED_TOTAL, &labels(queue, job_type)).increment(1);
}

pub fn record_job_stalled(queue: &str, job_type: &str) {
    counter!(names::JOBS_STALLED_TOTAL, &labels(queue, job_type)).increment(1);
}

pub fn record_jobs_cleaned(queue: &str, state: JobState, count: usize) {
    let labels = [
        ("queue", queue.to_string()),
        ("state", state.as_str().to_string()),
    ];
    counter!(names::JOBS_CLEANED_TOTAL, &labels).increment(count as u64);
}

/// Update the per-state gauges of one queue.
pub fn set_queue_counts(queue: &str, counts: &QueueCounts) {
    let states = [
        (JobState::Waiting, counts.waiting),
        (JobState::Active, counts.active),
        (JobState::Completed, counts.completed),
        (JobState::Failed, counts.failed),
    ];
    for (state, count) in states {
        let labels = [
            ("queue", queue.to_string()),
            ("state", state.as_str().to_string()),
        ];
        gauge!(names::QUEUE_JOBS, &labels).set(count as f64);
    }
}
