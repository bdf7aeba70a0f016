//! In-memory job store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

use bigfoot_models::{JobId, JobState};

use crate::error::{QueueError, QueueResult};
use crate::record::{JobRecord, QueueCounts};
use crate::store::JobStore;

type Partition = Arc<Mutex<HashMap<JobId, JobRecord>>>;

/// Job store that keeps every record in process memory.
///
/// Each queue has its own lock, so work on one queue never waits on another
/// and a stats snapshot only holds one partition at a time.
#[derive(Default)]
pub struct MemoryJobStore {
    partitions: RwLock<HashMap<String, Partition>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn partition(&self, queue: &str) -> Partition {
        if let Some(partition) = self.partitions.read().await.get(queue) {
            return Arc::clone(partition);
        }

        let mut partitions = self.partitions.write().await;
        Arc::clone(partitions.entry(queue.to_string()).or_default())
    }
}

fn active_mut<'a>(
    jobs: &'a mut HashMap<JobId, JobRecord>,
    id: &JobId,
) -> QueueResult<&'a mut JobRecord> {
    match jobs.get_mut(id) {
        Some(job) if job.state == JobState::Active => Ok(job),
        Some(job) => Err(QueueError::not_active(id, job.state)),
        None => Err(QueueError::JobNotFound(id.to_string())),
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    #[instrument(skip_all, fields(queue = %record.queue_name, job_id = %record.id))]
    async fn push(&self, record: JobRecord) -> QueueResult<()> {
        let partition = self.partition(&record.queue_name).await;
        let mut jobs = partition.lock().await;
        jobs.insert(record.id.clone(), record);
        Ok(())
    }

    async fn claim_next(&self, queue: &str, now: DateTime<Utc>) -> QueueResult<Option<JobRecord>> {
        let partition = self.partition(queue).await;
        let mut jobs = partition.lock().await;

        let job = jobs
            .values_mut()
            .filter(|j| j.is_eligible(now))
            .max_by(|a, b| a.claim_order(b));

        Ok(job.map(|job| {
            job.state = JobState::Active;
            job.started_at = Some(now);
            job.clone()
        }))
    }

    async fn complete(&self, queue: &str, id: &JobId, finished_at: DateTime<Utc>) -> QueueResult<()> {
        let partition = self.partition(queue).await;
        let mut jobs = partition.lock().await;

        let job = active_mut(&mut jobs, id)?;
        job.state = JobState::Completed;
        job.finished_at = Some(finished_at);
        Ok(())
    }

    async fn retry(
        &self,
        queue: &str,
        id: &JobId,
        attempts_made: u32,
        error: &str,
        available_at: DateTime<Utc>,
        stalled: bool,
    ) -> QueueResult<()> {
        let partition = self.partition(queue).await;
        let mut jobs = partition.lock().await;

        let job = active_mut(&mut jobs, id)?;
        job.state = JobState::Waiting;
        job.attempts_made = attempts_made;
        job.available_at = available_at;
        job.last_error = Some(error.to_string());
        if stalled {
            job.stalls += 1;
        }
        Ok(())
    }

    async fn fail(
        &self,
        queue: &str,
        id: &JobId,
        attempts_made: u32,
        error: &str,
        finished_at: DateTime<Utc>,
        stalled: bool,
    ) -> QueueResult<()> {
        let partition = self.partition(queue).await;
        let mut jobs = partition.lock().await;

        let job = active_mut(&mut jobs, id)?;
        job.state = JobState::Failed;
        job.attempts_made = attempts_made;
        job.finished_at = Some(finished_at);
        job.last_error = Some(error.to_string());
        if stalled {
            job.stalls += 1;
        }
        Ok(())
    }

    async fn get(&self, queue: &str, id: &JobId) -> QueueResult<Option<JobRecord>> {
        let partition = self.partition(queue).await;
        let jobs = partition.lock().await;
        Ok(jobs.get(id).cloned())
    }

    async fn counts(&self, queue: &str) -> QueueResult<QueueCounts> {
        let partition = self.partition(queue).await;
        let jobs = partition.lock().await;

        let mut counts = QueueCounts::default();
        for job in jobs.values() {
            counts.add(job.state);
        }
        Ok(counts)
    }

    async fn clean(
        &self,
        queue: &str,
        state: JobState,
        older_than: DateTime<Utc>,
        keep: Option<usize>,
    ) -> QueueResult<usize> {
        if !state.is_terminal() {
            return Err(QueueError::store(format!("cannot clean {state} jobs")));
        }

        let partition = self.partition(queue).await;
        let mut jobs = partition.lock().await;

        // Oldest first
        let mut candidates: Vec<(DateTime<Utc>, u64, JobId)> = jobs
            .values()
            .filter(|j| j.state == state)
            .map(|j| (j.finished_at.unwrap_or(j.enqueued_at), j.seq, j.id.clone()))
            .collect();
        candidates.sort();

        let expired = candidates.iter().take_while(|(at, _, _)| *at < older_than).count();
        let over_limit = keep.map_or(0, |keep| candidates.len().saturating_sub(keep));
        let remove = expired.max(over_limit);

        for (_, _, id) in candidates.iter().take(remove) {
            jobs.remove(id);
        }

        if remove > 0 {
            debug!(queue, state = %state, removed = remove, "Removed old jobs");
        }
        Ok(remove)
    }

    async fn requeue_active(
        &self,
        queue: &str,
        ids: &[JobId],
        reason: &str,
        now: DateTime<Utc>,
    ) -> QueueResult<usize> {
        let partition = self.partition(queue).await;
        let mut jobs = partition.lock().await;

        let mut requeued = 0;
        for id in ids {
            let Some(job) = jobs.get_mut(id).filter(|j| j.state == JobState::Active) else {
                continue;
            };
            if job.abandon(reason, now) {
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn stale_active(
        &self,
        queue: &str,
        started_before: DateTime<Utc>,
    ) -> QueueResult<Vec<JobId>> {
        let partition = self.partition(queue).await;
        let jobs = partition.lock().await;

        let mut stale: Vec<(DateTime<Utc>, JobId)> = jobs
            .values()
            .filter(|j| j.state == JobState::Active)
            .filter_map(|j| j.started_at.map(|at| (at, j.id.clone())))
            .filter(|(at, _)| *at < started_before)
            .collect();
        stale.sort();
        Ok(stale.into_iter().map(|(_, id)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bigfoot_models::EmailJob;

    use super::*;
    use crate::options::{BackoffPolicy, ResolvedOptions};

    const QUEUE: &str = "email-notifications";

    fn record(seq: u64, priority: i32, now: DateTime<Utc>) -> JobRecord {
        let options = ResolvedOptions {
            priority,
            delay: Duration::ZERO,
            max_attempts: 2,
            backoff: BackoffPolicy::fixed(Duration::from_secs(1)),
        };
        let payload = EmailJob::new("test", "a@example.com", "s", "b").into();
        JobRecord::new(seq, QUEUE, payload, options, now).unwrap()
    }

    async fn finished(store: &MemoryJobStore, seq: u64, at: DateTime<Utc>) -> JobId {
        let job = record(seq, 0, at);
        let id = job.id.clone();
        store.push(job).await.unwrap();
        let claimed = store.claim_next(QUEUE, at).await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        store.complete(QUEUE, &id, at).await.unwrap();
        id
    }

    #[tokio::test]
    async fn claim_marks_job_active_and_hides_it() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        store.push(record(1, 0, now)).await.unwrap();

        let claimed = store.claim_next(QUEUE, now).await.unwrap().unwrap();
        assert_eq!(claimed.state, JobState::Active);
        assert_eq!(claimed.started_at, Some(now));

        assert!(store.claim_next(QUEUE, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_prefers_priority_then_age() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let old = record(1, 0, now);
        let urgent = record(2, 10, now + chrono::Duration::seconds(1));
        let newer = record(3, 0, now + chrono::Duration::seconds(2));
        let (old_id, urgent_id, newer_id) = (old.id.clone(), urgent.id.clone(), newer.id.clone());

        for job in [newer, old, urgent] {
            store.push(job).await.unwrap();
        }

        let later = now + chrono::Duration::seconds(5);
        let order: Vec<JobId> = [
            store.claim_next(QUEUE, later).await.unwrap().unwrap().id,
            store.claim_next(QUEUE, later).await.unwrap().unwrap().id,
            store.claim_next(QUEUE, later).await.unwrap().unwrap().id,
        ]
        .into();

        assert_eq!(order, vec![urgent_id, old_id, newer_id]);
    }

    #[tokio::test]
    async fn concurrent_claims_never_share_a_job() {
        let store = Arc::new(MemoryJobStore::new());
        let now = Utc::now();
        for seq in 0..50 {
            store.push(record(seq, 0, now)).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(job) = store.claim_next(QUEUE, now).await.unwrap() {
                    claimed.push(job.id);
                }
                claimed
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        let total = all.len();
        all.sort();
        all.dedup();

        assert_eq!(total, 50);
        assert_eq!(all.len(), 50);
    }

    #[tokio::test]
    async fn retry_returns_job_to_waiting_with_delay() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let job = record(1, 0, now);
        let id = job.id.clone();
        store.push(job).await.unwrap();
        store.claim_next(QUEUE, now).await.unwrap();

        let retry_at = now + chrono::Duration::seconds(2);
        store.retry(QUEUE, &id, 1, "boom", retry_at, false).await.unwrap();

        let stored = store.get(QUEUE, &id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Waiting);
        assert_eq!(stored.attempts_made, 1);
        assert_eq!(stored.last_error.as_deref(), Some("boom"));
        assert!(store.claim_next(QUEUE, now).await.unwrap().is_none());
        assert!(store.claim_next(QUEUE, retry_at).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn transitions_require_an_active_job() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let job = record(1, 0, now);
        let id = job.id.clone();
        store.push(job).await.unwrap();

        assert!(matches!(
            store.complete(QUEUE, &id, now).await,
            Err(QueueError::NotActive { .. })
        ));
        assert!(matches!(
            store.complete(QUEUE, &JobId::new(), now).await,
            Err(QueueError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn clean_removes_only_expired_terminal_jobs() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let day = chrono::Duration::hours(24);

        let old = finished(&store, 1, now - day - day).await;
        let fresh = finished(&store, 2, now).await;

        // Old waiting and active jobs must survive
        let waiting = record(3, 0, now - day - day);
        let waiting_id = waiting.id.clone();
        let mut delayed = waiting;
        delayed.available_at = now + day;
        store.push(delayed).await.unwrap();

        let active = record(4, 0, now - day - day);
        let active_id = active.id.clone();
        store.push(active).await.unwrap();
        store.claim_next(QUEUE, now).await.unwrap();

        let removed = store.clean(QUEUE, JobState::Completed, now - day, None).await.unwrap();

        assert_eq!(removed, 1);
        assert!(store.get(QUEUE, &old).await.unwrap().is_none());
        assert!(store.get(QUEUE, &fresh).await.unwrap().is_some());
        assert!(store.get(QUEUE, &waiting_id).await.unwrap().is_some());
        assert!(store.get(QUEUE, &active_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clean_trims_oldest_beyond_retention_count() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let mut ids = Vec::new();
        for seq in 0..5 {
            ids.push(finished(&store, seq, now + chrono::Duration::seconds(seq as i64)).await);
        }

        let horizon = now - chrono::Duration::hours(24);
        let removed = store.clean(QUEUE, JobState::Completed, horizon, Some(2)).await.unwrap();

        assert_eq!(removed, 3);
        for id in &ids[..3] {
            assert!(store.get(QUEUE, id).await.unwrap().is_none());
        }
        for id in &ids[3..] {
            assert!(store.get(QUEUE, id).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn clean_rejects_non_terminal_states() {
        let store = MemoryJobStore::new();
        let result = store.clean(QUEUE, JobState::Waiting, Utc::now(), None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn requeue_active_counts_a_stalled_attempt() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let job = record(1, 0, now);
        let id = job.id.clone();
        store.push(job).await.unwrap();
        store.claim_next(QUEUE, now).await.unwrap();

        let ids = [id.clone()];
        assert_eq!(store.requeue_active(QUEUE, &ids, "interrupted", now).await.unwrap(), 1);
        let stored = store.get(QUEUE, &id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Waiting);
        assert_eq!(stored.attempts_made, 1);
        assert_eq!(stored.stalls, 1);
        assert_eq!(stored.last_error.as_deref(), Some("interrupted"));

        // Second interruption exhausts the two allowed attempts
        store.claim_next(QUEUE, now).await.unwrap();
        assert_eq!(store.requeue_active(QUEUE, &ids, "interrupted", now).await.unwrap(), 0);
        let stored = store.get(QUEUE, &id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Failed);
    }

    #[tokio::test]
    async fn requeue_active_leaves_unlisted_jobs_running() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let mine = record(1, 0, now);
        let theirs = record(2, 0, now);
        let (mine_id, theirs_id) = (mine.id.clone(), theirs.id.clone());
        store.push(mine).await.unwrap();
        store.push(theirs).await.unwrap();
        store.claim_next(QUEUE, now).await.unwrap();
        store.claim_next(QUEUE, now).await.unwrap();

        let requeued = store
            .requeue_active(QUEUE, &[mine_id.clone(), JobId::new()], "interrupted", now)
            .await
            .unwrap();

        assert_eq!(requeued, 1);
        let theirs = store.get(QUEUE, &theirs_id).await.unwrap().unwrap();
        assert_eq!(theirs.state, JobState::Active);
        assert_eq!(theirs.attempts_made, 0);
    }

    #[tokio::test]
    async fn stale_active_lists_old_claims_only() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let old = record(1, 0, now - chrono::Duration::minutes(10));
        let fresh = record(2, 0, now);
        let waiting = record(3, 0, now);
        let old_id = old.id.clone();
        store.push(old).await.unwrap();
        store.claim_next(QUEUE, now - chrono::Duration::minutes(5)).await.unwrap();
        store.push(fresh).await.unwrap();
        store.claim_next(QUEUE, now).await.unwrap();
        store.push(waiting).await.unwrap();

        let stale = store
            .stale_active(QUEUE, now - chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(stale, vec![old_id]);
    }

    #[tokio::test]
    async fn counts_reflect_states() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        finished(&store, 1, now).await;
        store.push(record(2, 0, now)).await.unwrap();
        store.push(record(3, 0, now)).await.unwrap();
        store.claim_next(QUEUE, now).await.unwrap();

        let counts = store.counts(QUEUE).await.unwrap();
        assert_eq!(
            counts,
            QueueCounts {
                waiting: 1,
                active: 1,
                completed: 1,
                failed: 0
            }
        );
        assert_eq!(store.counts("unknown").await.unwrap().total(), 0);
    }
}
