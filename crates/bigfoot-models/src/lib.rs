//! Shared data models for the Bigfoot backend.
//!
//! This crate provides Serde-serializable types for:
//! - Job identifiers, states and the queue payload sum type
//! - Chat messages collected from live events
//! - Raw and aggregated analytics data points

pub mod analytics;
pub mod chat;
pub mod job;

pub use analytics::{AggregatedAnalytics, AnalyticsDataPoint, TimeRange};
pub use chat::{ChatMessage, ChatMessageMetadata, ChatMessageType};
pub use job::{
    AnalyticsProcessingJob, EmailJob, EventCleanupJob, JobId, JobPayload, JobState,
    ANALYTICS_PROCESSING_QUEUE, EMAIL_NOTIFICATIONS_QUEUE, EVENT_CLEANUP_QUEUE,
};
