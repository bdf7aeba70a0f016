//! Queue defaults, per-job overrides and backoff policies.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles after each failed attempt
    Exponential,
}

impl fmt::Display for BackoffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffKind::Fixed => f.write_str("fixed"),
            BackoffKind::Exponential => f.write_str("exponential"),
        }
    }
}

impl FromStr for BackoffKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(BackoffKind::Fixed),
            "exponential" => Ok(BackoffKind::Exponential),
            other => Err(QueueError::invalid_options(format!(
                "unknown backoff type: {other}"
            ))),
        }
    }
}

/// Delay policy applied before each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,
    /// Delay before the first retry
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,
}

impl BackoffPolicy {
    pub fn fixed(base_delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            base_delay,
        }
    }

    pub fn exponential(base_delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base_delay,
        }
    }

    /// Delay to wait after the given number of failed attempts.
    ///
    /// `attempts_made` is 1 after the first failure, so an exponential policy
    /// yields `base`, `2 * base`, `4 * base`, ...
    pub fn delay_for_attempt(&self, attempts_made: u32) -> Duration {
        match self.kind {
            BackoffKind::Fixed => self.base_delay,
            BackoffKind::Exponential => {
                let exponent = attempts_made.saturating_sub(1);
                self.base_delay
                    .saturating_mul(2u32.saturating_pow(exponent))
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(2))
    }
}

/// Options applied to every job of a queue unless overridden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDefaults {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Keep at most this many completed jobs
    pub retention_completed: Option<usize>,
    /// Keep at most this many failed jobs
    pub retention_failed: Option<usize>,
}

impl Default for QueueDefaults {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            retention_completed: None,
            retention_failed: None,
        }
    }
}

impl QueueDefaults {
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts,
            backoff,
            ..Default::default()
        }
    }

    pub fn with_retention(mut self, completed: Option<usize>, failed: Option<usize>) -> Self {
        self.retention_completed = completed;
        self.retention_failed = failed;
        self
    }

    pub(crate) fn validate(&self) -> QueueResult<()> {
        if self.max_attempts < 1 {
            return Err(QueueError::invalid_options("max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Per-job overrides passed to `add_job`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOptions {
    pub priority: Option<i32>,
    pub delay: Option<Duration>,
    pub max_attempts: Option<u32>,
    pub backoff: Option<BackoffPolicy>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Resolve these overrides against a queue's defaults.
    pub(crate) fn resolve(&self, defaults: &QueueDefaults) -> QueueResult<ResolvedOptions> {
        let max_attempts = self.max_attempts.unwrap_or(defaults.max_attempts);
        if max_attempts < 1 {
            return Err(QueueError::invalid_options("max_attempts must be at least 1"));
        }

        Ok(ResolvedOptions {
            priority: self.priority.unwrap_or(0),
            delay: self.delay.unwrap_or(Duration::ZERO),
            max_attempts,
            backoff: self.backoff.unwrap_or(defaults.backoff),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResolvedOptions {
    pub priority: i32,
    pub delay: Duration,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
