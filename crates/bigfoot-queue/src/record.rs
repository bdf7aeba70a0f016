//! Stored job records.

use std::cmp::{Ordering, Reverse};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bigfoot_models::{JobId, JobPayload, JobState};

use crate::clock::checked_add;
use crate::error::{QueueError, QueueResult};
use crate::options::{BackoffPolicy, ResolvedOptions};

/// A job as held by the store, with its execution metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    /// Enqueue order within the manager, breaks ties between equal timestamps
    pub seq: u64,
    pub queue_name: String,
    pub payload: JobPayload,
    pub priority: i32,
    /// Initial delay requested at enqueue time
    pub delay_ms: u64,
    /// Earliest time the job may be claimed
    pub available_at: DateTime<Utc>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub state: JobState,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Times the handler exceeded the stall window
    pub stalls: u32,
}

impl JobRecord {
    pub(crate) fn new(
        seq: u64,
        queue_name: &str,
        payload: JobPayload,
        options: ResolvedOptions,
        now: DateTime<Utc>,
    ) -> QueueResult<Self> {
        let available_at = checked_add(now, options.delay).ok_or_else(|| {
            QueueError::invalid_options(format!("delay {:?} is out of range", options.delay))
        })?;

        Ok(Self {
            id: JobId::new(),
            seq,
            queue_name: queue_name.to_string(),
            payload,
            priority: options.priority,
            delay_ms: options.delay.as_millis().min(u64::MAX as u128) as u64,
            available_at,
            attempts_made: 0,
            max_attempts: options.max_attempts,
            backoff: options.backoff,
            state: JobState::Waiting,
            enqueued_at: now,
            started_at: None,
            finished_at: None,
            last_error: None,
            stalls: 0,
        })
    }

    pub fn job_type(&self) -> &'static str {
        self.payload.job_type()
    }

    /// Whether a worker may claim this job at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Waiting && self.available_at <= now
    }

    /// Claim order: higher priority first, then oldest, then lowest sequence.
    ///
    /// `Ordering::Greater` means `self` should run before `other`.
    pub fn claim_order(&self, other: &Self) -> Ordering {
        (self.priority, Reverse(self.enqueued_at), Reverse(self.seq)).cmp(&(
            other.priority,
            Reverse(other.enqueued_at),
            Reverse(other.seq),
        ))
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts_made < self.max_attempts
    }

    /// Take back an active job whose run was interrupted.
    ///
    /// The run counts as a stalled attempt. The job goes back to waiting if
    /// attempts remain, otherwise it fails. Returns whether it is waiting.
    pub(crate) fn abandon(&mut self, reason: &str, now: DateTime<Utc>) -> bool {
        self.attempts_made += 1;
        self.stalls += 1;
        self.last_error = Some(reason.to_string());
        if self.has_attempts_left() {
            self.state = JobState::Waiting;
            self.available_at = now;
            true
        } else {
            self.state = JobState::Failed;
            self.finished_at = Some(now);
            false
        }
    }
}

/// Per-state job counts for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueCounts {
    pub(crate) fn add(&mut self, state: JobState) {
        match state {
            JobState::Waiting => self.waiting += 1,
            JobState::Active => self.active += 1,
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.waiting + self.active + self.completed + self.failed
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bigfoot_models::EmailJob;

    use super::*;

    fn record(seq: u64, priority: i32, enqueued_at: DateTime<Utc>) -> JobRecord {
        let options = ResolvedOptions {
            priority,
            delay: Duration::ZERO,
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        };
        let payload = EmailJob::new("test", "a@example.com", "s", "b").into();
        JobRecord::new(seq, "email-notifications", payload, options, enqueued_at).unwrap()
    }

    #[test]
    fn higher_priority_claims_first() {
        let now = Utc::now();
        let low = record(1, 0, now);
        let high = record(2, 5, now + chrono::Duration::seconds(1));

        assert_eq!(high.claim_order(&low), Ordering::Greater);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let now = Utc::now();
        let first = record(1, 0, now);
        let second = record(2, 0, now + chrono::Duration::milliseconds(1));
        let same_instant = record(3, 0, now + chrono::Duration::milliseconds(1));

        assert_eq!(first.claim_order(&second), Ordering::Greater);
        assert_eq!(second.claim_order(&same_instant), Ordering::Greater);
    }

    #[test]
    fn out_of_range_delay_is_rejected() {
        let options = ResolvedOptions {
            priority: 0,
            delay: Duration::from_millis(u64::MAX),
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        };
        let payload = EmailJob::new("test", "a@example.com", "s", "b").into();

        let err = JobRecord::new(1, "email-notifications", payload, options, Utc::now()).unwrap_err();
        assert!(matches!(err, QueueError::InvalidOptions(_)));
    }

    #[test]
    fn abandon_requeues_until_attempts_run_out() {
        let now = Utc::now();
        let mut job = record(1, 0, now);
        job.max_attempts = 2;
        job.state = JobState::Active;

        assert!(job.abandon("lost", now));
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!((job.attempts_made, job.stalls), (1, 1));

        job.state = JobState::Active;
        assert!(!job.abandon("lost", now));
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.finished_at, Some(now));
        assert_eq!(job.last_error.as_deref(), Some("lost"));
    }

    #[test]
    fn delayed_job_is_not_eligible_until_available() {
        let now = Utc::now();
        let mut job = record(1, 0, now);
        job.available_at = now + chrono::Duration::seconds(10);

        assert!(!job.is_eligible(now));
        assert!(job.is_eligible(now + chrono::Duration::seconds(10)));
    }
}
