//! Analytics data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw analytics sample collected during a live event.
///
/// Every counter is optional; samples from different producers carry
/// different subsets. Fields this crate does not know about are kept in
/// `extra` so archival does not lose them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsDataPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewers: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_messages: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AnalyticsDataPoint {
    /// Create a sample with all three counters set.
    pub fn new(views: u64, viewers: u64, chat_messages: u64) -> Self {
        Self {
            views: Some(views),
            viewers: Some(viewers),
            chat_messages: Some(chat_messages),
            ..Default::default()
        }
    }
}

/// Time window covered by a batch of raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Aggregated metrics for one event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedAnalytics {
    pub total_views: u64,
    pub peak_viewers: u64,
    pub average_viewers: f64,
    pub total_chat_messages: u64,
    /// Interactions per view. Not computed yet, always 0.
    pub engagement_rate: f64,
}
