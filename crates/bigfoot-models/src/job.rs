//! Job definitions for queue processing.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{AnalyticsDataPoint, ChatMessage, TimeRange};

/// Queue that archives event data after a stream ends.
pub const EVENT_CLEANUP_QUEUE: &str = "event-cleanup";
/// Queue that aggregates raw analytics samples.
pub const ANALYTICS_PROCESSING_QUEUE: &str = "analytics-processing";
/// Queue that delivers outbound email.
pub const EMAIL_NOTIFICATIONS_QUEUE: &str = "email-notifications";

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to become eligible or to be claimed
    #[default]
    Waiting,
    /// Claimed by a worker
    Active,
    /// Handler succeeded
    Completed,
    /// Attempts exhausted
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-stream cleanup of a live event.
///
/// Queued by the container manager when an event container stops. Carries
/// everything that must be archived before the event can be finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCleanupJob {
    /// Event ID
    pub event_id: String,
    /// Container that hosted the event
    pub container_id: String,
    /// Chat messages collected during the stream
    #[serde(default)]
    pub chat_logs: Vec<ChatMessage>,
    /// Raw analytics samples collected during the stream
    #[serde(default)]
    pub analytics_data: Vec<AnalyticsDataPoint>,
    /// Object keys of recordings, thumbnails and other artifacts
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl EventCleanupJob {
    pub fn new(event_id: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            container_id: container_id.into(),
            chat_logs: Vec::new(),
            analytics_data: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_chat_logs(mut self, chat_logs: Vec<ChatMessage>) -> Self {
        self.chat_logs = chat_logs;
        self
    }

    pub fn with_analytics_data(mut self, data: Vec<AnalyticsDataPoint>) -> Self {
        self.analytics_data = data;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// Aggregation of a batch of raw analytics samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsProcessingJob {
    /// Event ID
    pub event_id: String,
    /// Raw samples to aggregate
    #[serde(default)]
    pub raw_data: Vec<AnalyticsDataPoint>,
    /// Window the samples were collected in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

impl AnalyticsProcessingJob {
    pub fn new(event_id: impl Into<String>, raw_data: Vec<AnalyticsDataPoint>) -> Self {
        Self {
            event_id: event_id.into(),
            raw_data,
            time_range: None,
        }
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = Some(time_range);
        self
    }
}

/// Outbound email notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailJob {
    /// Notification kind, e.g. `event_reminder`
    #[serde(rename = "type")]
    pub kind: String,
    /// Recipient address
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailJob {
    pub fn new(
        kind: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Job payload stored in a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum JobPayload {
    /// Archive event data and finalize the event
    EventCleanup(EventCleanupJob),
    /// Aggregate raw analytics samples
    AnalyticsProcessing(AnalyticsProcessingJob),
    /// Send an email through the mail provider
    EmailNotification(EmailJob),
}

impl JobPayload {
    /// Tag used in logs and metrics labels.
    pub fn job_type(&self) -> &'static str {
        match self {
            JobPayload::EventCleanup(_) => "event_cleanup",
            JobPayload::AnalyticsProcessing(_) => "analytics_processing",
            JobPayload::EmailNotification(_) => "email_notification",
        }
    }

    /// Queue this payload is normally routed to.
    pub fn default_queue(&self) -> &'static str {
        match self {
            JobPayload::EventCleanup(_) => EVENT_CLEANUP_QUEUE,
            JobPayload::AnalyticsProcessing(_) => ANALYTICS_PROCESSING_QUEUE,
            JobPayload::EmailNotification(_) => EMAIL_NOTIFICATIONS_QUEUE,
        }
    }

    /// Returns the event ID for event-scoped payloads.
    pub fn event_id(&self) -> Option<&str> {
        match self {
            JobPayload::EventCleanup(j) => Some(&j.event_id),
            JobPayload::AnalyticsProcessing(j) => Some(&j.event_id),
            JobPayload::EmailNotification(_) => None,
        }
    }
}

impl From<EventCleanupJob> for JobPayload {
    fn from(job: EventCleanupJob) -> Self {
        JobPayload::EventCleanup(job)
    }
}

impl From<AnalyticsProcessingJob> for JobPayload {
    fn from(job: AnalyticsProcessingJob) -> Self {
        JobPayload::AnalyticsProcessing(job)
    }
}

impl From<EmailJob> for JobPayload {
    fn from(job: EmailJob) -> Self {
        JobPayload::EmailNotification(job)
    }
}
