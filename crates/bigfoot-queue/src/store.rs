//! Job store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bigfoot_models::{JobId, JobState};

use crate::error::QueueResult;
use crate::record::{JobRecord, QueueCounts};

/// Storage for job records, partitioned by queue name.
///
/// Implementations must make `claim_next` an atomic test-and-set: a record
/// returned by one call is `active` before any other caller can observe it
/// as eligible.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new waiting record.
    async fn push(&self, record: JobRecord) -> QueueResult<()>;

    /// Claim the best eligible record of `queue` at `now`, marking it active.
    async fn claim_next(&self, queue: &str, now: DateTime<Utc>) -> QueueResult<Option<JobRecord>>;

    /// Mark an active record completed.
    async fn complete(&self, queue: &str, id: &JobId, finished_at: DateTime<Utc>) -> QueueResult<()>;

    /// Put an active record back to waiting after a failed attempt.
    async fn retry(
        &self,
        queue: &str,
        id: &JobId,
        attempts_made: u32,
        error: &str,
        available_at: DateTime<Utc>,
        stalled: bool,
    ) -> QueueResult<()>;

    /// Mark an active record terminally failed.
    async fn fail(
        &self,
        queue: &str,
        id: &JobId,
        attempts_made: u32,
        error: &str,
        finished_at: DateTime<Utc>,
        stalled: bool,
    ) -> QueueResult<()>;

    async fn get(&self, queue: &str, id: &JobId) -> QueueResult<Option<JobRecord>>;

    /// Snapshot of per-state counts for one queue.
    async fn counts(&self, queue: &str) -> QueueResult<QueueCounts>;

    /// Remove terminal records of `state` finished before `older_than`, then
    /// trim the oldest beyond `keep` if given. Returns how many were removed.
    ///
    /// Waiting and active records are never removed.
    async fn clean(
        &self,
        queue: &str,
        state: JobState,
        older_than: DateTime<Utc>,
        keep: Option<usize>,
    ) -> QueueResult<usize>;

    /// Return the listed records of `queue` that are still active to waiting,
    /// counting the interrupted run as a stalled attempt. Records that run out
    /// of attempts fail instead. Returns how many went back to waiting.
    async fn requeue_active(
        &self,
        queue: &str,
        ids: &[JobId],
        reason: &str,
        now: DateTime<Utc>,
    ) -> QueueResult<usize>;

    /// Active records of `queue` claimed before `started_before`, oldest first.
    async fn stale_active(
        &self,
        queue: &str,
        started_before: DateTime<Utc>,
    ) -> QueueResult<Vec<JobId>>;
}
