//! Redis-backed job store.
//!
//! Each queue lives under its own hash-tagged prefix so every key of a queue
//! maps to one cluster slot:
//!
//! - `{prefix}:{queue}:jobs`: hash of job id to JSON record
//! - `{prefix}:{queue}:delayed`: waiting jobs scored by `available_at` millis
//! - `{prefix}:{queue}:wait`: due jobs, all scored 0 and ordered by member
//! - `{prefix}:{queue}:active`: claimed job ids scored by claim time
//! - `{prefix}:{queue}:completed` and `:failed`: job ids scored by finish time
//! - `{prefix}:{queue}:seq`: enqueue counter shared by every producer
//!
//! Members of `wait` and `delayed` are claim-order keys, so popping the
//! lexicographically smallest member of `wait` yields the highest priority,
//! then the oldest job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::Script;
use tracing::{debug, instrument};

use bigfoot_models::{JobId, JobState};

use crate::error::{QueueError, QueueResult};
use crate::record::{JobRecord, QueueCounts};
use crate::store::JobStore;

/// Key prefix used when none is configured.
pub const DEFAULT_KEY_PREFIX: &str = "bigfoot:queue";

/// Due jobs promoted from `delayed` per claim call.
const PROMOTE_BATCH: usize = 1000;

// KEYS: delayed, wait, active, jobs. ARGV: now millis, promote batch.
const CLAIM_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
for _, member in ipairs(due) do
    redis.call('ZREM', KEYS[1], member)
    redis.call('ZADD', KEYS[2], 0, member)
end
while true do
    local popped = redis.call('ZPOPMIN', KEYS[2])
    if #popped == 0 then
        return false
    end
    local id = string.match(popped[1], '([^:]+)$')
    local record = redis.call('HGET', KEYS[4], id)
    if record then
        redis.call('ZADD', KEYS[3], ARGV[1], id)
        return {id, record}
    end
end
"#;

// KEYS: jobs, active, target set. ARGV: id, record, target score, target member.
const TRANSITION_SCRIPT: &str = r#"
if redis.call('ZREM', KEYS[2], ARGV[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('ZADD', KEYS[3], ARGV[3], ARGV[4])
return 1
"#;

/// Sort key of a waiting job: priority descending, then sequence, then id.
pub(crate) fn order_key(record: &JobRecord) -> String {
    let inverted = i64::from(i32::MAX) - i64::from(record.priority);
    format!("{:010}:{:020}:{}", inverted, record.seq, record.id)
}

/// Keys of one queue.
struct QueueKeys {
    jobs: String,
    delayed: String,
    wait: String,
    active: String,
    completed: String,
    failed: String,
    seq: String,
}

impl QueueKeys {
    fn new(prefix: &str, queue: &str) -> Self {
        let base = format!("{prefix}:{{{queue}}}");
        Self {
            jobs: format!("{base}:jobs"),
            delayed: format!("{base}:delayed"),
            wait: format!("{base}:wait"),
            active: format!("{base}:active"),
            completed: format!("{base}:completed"),
            failed: format!("{base}:failed"),
            seq: format!("{base}:seq"),
        }
    }

    fn finished(&self, state: JobState) -> QueueResult<&str> {
        match state {
            JobState::Completed => Ok(self.completed.as_str()),
            JobState::Failed => Ok(self.failed.as_str()),
            other => Err(QueueError::store(format!("cannot clean {other} jobs"))),
        }
    }
}

/// Where a transition moves a record.
struct Target<'a> {
    set: &'a str,
    score: i64,
    member: String,
}

/// Job store shared by every process pointed at the same Redis.
///
/// Claims are single Lua scripts, so exactly one worker wins each job even
/// across processes.
pub struct RedisJobStore {
    conn: MultiplexedConnection,
    prefix: String,
    claim: Script,
    transition: Script,
}

impl RedisJobStore {
    pub fn new(conn: MultiplexedConnection, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            claim: Script::new(CLAIM_SCRIPT),
            transition: Script::new(TRANSITION_SCRIPT),
        }
    }

    fn keys(&self, queue: &str) -> QueueKeys {
        QueueKeys::new(&self.prefix, queue)
    }

    async fn load(&self, keys: &QueueKeys, id: &JobId) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("HGET")
            .arg(&keys.jobs)
            .arg(id.as_str())
            .query_async(&mut conn)
            .await?;
        raw.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(QueueError::from)
    }

    async fn load_active(&self, keys: &QueueKeys, id: &JobId) -> QueueResult<JobRecord> {
        match self.load(keys, id).await? {
            Some(record) if record.state == JobState::Active => Ok(record),
            Some(record) => Err(QueueError::not_active(id, record.state)),
            None => Err(QueueError::JobNotFound(id.to_string())),
        }
    }

    /// Move an active record to `target`. Returns false if it was no longer active.
    async fn move_active(
        &self,
        keys: &QueueKeys,
        record: &JobRecord,
        target: Target<'_>,
    ) -> QueueResult<bool> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(record)?;
        let moved: i32 = self
            .transition
            .key(&keys.jobs)
            .key(&keys.active)
            .key(target.set)
            .arg(record.id.as_str())
            .arg(json)
            .arg(target.score)
            .arg(target.member)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved == 1)
    }

    async fn finish_transition(
        &self,
        keys: &QueueKeys,
        record: &JobRecord,
        target: Target<'_>,
    ) -> QueueResult<()> {
        if self.move_active(keys, record, target).await? {
            Ok(())
        } else {
            Err(QueueError::not_active(&record.id, "no longer active"))
        }
    }

    fn waiting_target<'a>(keys: &'a QueueKeys, record: &JobRecord) -> Target<'a> {
        Target {
            set: &keys.delayed,
            score: record.available_at.timestamp_millis(),
            member: order_key(record),
        }
    }

    fn finished_target<'a>(set: &'a str, record: &JobRecord, at: DateTime<Utc>) -> Target<'a> {
        Target {
            set,
            score: at.timestamp_millis(),
            member: record.id.to_string(),
        }
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    #[instrument(skip_all, fields(queue = %record.queue_name, job_id = %record.id))]
    async fn push(&self, mut record: JobRecord) -> QueueResult<()> {
        let keys = self.keys(&record.queue_name);
        let mut conn = self.conn.clone();

        // Producers in other processes share this counter
        record.seq = redis::cmd("INCR")
            .arg(&keys.seq)
            .query_async(&mut conn)
            .await?;
        let json = serde_json::to_string(&record)?;

        redis::pipe()
            .atomic()
            .hset(&keys.jobs, record.id.as_str(), json)
            .ignore()
            .zadd(&keys.delayed, order_key(&record), record.available_at.timestamp_millis())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn claim_next(&self, queue: &str, now: DateTime<Utc>) -> QueueResult<Option<JobRecord>> {
        let keys = self.keys(queue);
        let mut conn = self.conn.clone();

        let claimed: Option<(String, String)> = self
            .claim
            .key(&keys.delayed)
            .key(&keys.wait)
            .key(&keys.active)
            .key(&keys.jobs)
            .arg(now.timestamp_millis())
            .arg(PROMOTE_BATCH)
            .invoke_async(&mut conn)
            .await?;
        let Some((id, raw)) = claimed else {
            return Ok(None);
        };

        let mut record: JobRecord = serde_json::from_str(&raw)?;
        record.state = JobState::Active;
        record.started_at = Some(now);
        let json = serde_json::to_string(&record)?;
        redis::cmd("HSET")
            .arg(&keys.jobs)
            .arg(&id)
            .arg(json)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(queue, job_id = %id, "Claimed job");
        Ok(Some(record))
    }

    async fn complete(&self, queue: &str, id: &JobId, finished_at: DateTime<Utc>) -> QueueResult<()> {
        let keys = self.keys(queue);
        let mut record = self.load_active(&keys, id).await?;
        record.state = JobState::Completed;
        record.finished_at = Some(finished_at);

        let target = Self::finished_target(&keys.completed, &record, finished_at);
        self.finish_transition(&keys, &record, target).await
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
        let keys = self.keys(queue);
        let mut record = self.load_active(&keys, id).await?;
        record.state = JobState::Waiting;
        record.attempts_made = attempts_made;
        record.available_at = available_at;
        record.last_error = Some(error.to_string());
        if stalled {
            record.stalls += 1;
        }

        let target = Self::waiting_target(&keys, &record);
        self.finish_transition(&keys, &record, target).await
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
        let keys = self.keys(queue);
        let mut record = self.load_active(&keys, id).await?;
        record.state = JobState::Failed;
        record.attempts_made = attempts_made;
        record.finished_at = Some(finished_at);
        record.last_error = Some(error.to_string());
        if stalled {
            record.stalls += 1;
        }

        let target = Self::finished_target(&keys.failed, &record, finished_at);
        self.finish_transition(&keys, &record, target).await
    }

    async fn get(&self, queue: &str, id: &JobId) -> QueueResult<Option<JobRecord>> {
        self.load(&self.keys(queue), id).await
    }

    async fn counts(&self, queue: &str) -> QueueResult<QueueCounts> {
        let keys = self.keys(queue);
        let mut conn = self.conn.clone();

        let (delayed, wait, active, completed, failed): (usize, usize, usize, usize, usize) =
            redis::pipe()
                .zcard(&keys.delayed)
                .zcard(&keys.wait)
                .zcard(&keys.active)
                .zcard(&keys.completed)
                .zcard(&keys.failed)
                .query_async(&mut conn)
                .await?;

        Ok(QueueCounts {
            waiting: delayed + wait,
            active,
            completed,
            failed,
        })
    }

    async fn clean(
        &self,
        queue: &str,
        state: JobState,
        older_than: DateTime<Utc>,
        keep: Option<usize>,
    ) -> QueueResult<usize> {
        let keys = self.keys(queue);
        let set = keys.finished(state)?;
        let mut conn = self.conn.clone();

        let mut doomed: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(set)
            .arg("-inf")
            .arg(format!("({}", older_than.timestamp_millis()))
            .query_async(&mut conn)
            .await?;

        if let Some(keep) = keep {
            let len: usize = redis::cmd("ZCARD").arg(set).query_async(&mut conn).await?;
            let over_limit = len.saturating_sub(keep);
            // Both lists are prefixes of the same oldest-first order
            if over_limit > doomed.len() {
                doomed = redis::cmd("ZRANGE")
                    .arg(set)
                    .arg(0)
                    .arg(over_limit - 1)
                    .query_async(&mut conn)
                    .await?;
            }
        }

        if doomed.is_empty() {
            return Ok(0);
        }

        redis::pipe()
            .atomic()
            .zrem(set, &doomed)
            .ignore()
            .hdel(&keys.jobs, &doomed)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(queue, state = %state, removed = doomed.len(), "Removed old jobs");
        Ok(doomed.len())
    }

    async fn requeue_active(
        &self,
        queue: &str,
        ids: &[JobId],
        reason: &str,
        now: DateTime<Utc>,
    ) -> QueueResult<usize> {
        let keys = self.keys(queue);

        let mut requeued = 0;
        for id in ids {
            // Membership of the active set decides, not the record state
            let Some(mut record) = self.load(&keys, id).await? else {
                continue;
            };

            let waiting = record.abandon(reason, now);
            let target = if waiting {
                Self::waiting_target(&keys, &record)
            } else {
                Self::finished_target(&keys.failed, &record, now)
            };
            if self.move_active(&keys, &record, target).await? && waiting {
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
        let keys = self.keys(queue);
        let mut conn = self.conn.clone();

        let ids: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&keys.active)
            .arg("-inf")
            .arg(format!("({}", started_before.timestamp_millis()))
            .query_async(&mut conn)
            .await?;
        Ok(ids.into_iter().map(JobId::from_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bigfoot_models::EmailJob;

    use super::*;
    use crate::options::{BackoffPolicy, ResolvedOptions};

    fn record(seq: u64, priority: i32) -> JobRecord {
        let options = ResolvedOptions {
            priority,
            delay: Duration::ZERO,
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        };
        let payload = EmailJob::new("test", "a@example.com", "s", "b").into();
        JobRecord::new(seq, "email-notifications", payload, options, Utc::now()).unwrap()
    }

    #[test]
    fn order_keys_sort_by_priority_then_sequence() {
        let mut keys = vec![
            order_key(&record(3, 0)),
            order_key(&record(1, 0)),
            order_key(&record(9, 10)),
            order_key(&record(2, -5)),
            order_key(&record(4, i32::MAX)),
            order_key(&record(5, i32::MIN)),
        ];
        keys.sort();

        let seqs: Vec<&str> = keys
            .iter()
            .map(|k| k.split(':').nth(1).unwrap_or_default())
            .collect();
        assert_eq!(
            seqs,
            vec![
                "00000000000000000004",
                "00000000000000000009",
                "00000000000000000001",
                "00000000000000000003",
                "00000000000000000002",
                "00000000000000000005",
            ]
        );
    }

    #[test]
    fn order_key_ends_with_job_id() {
        let job = record(1, 0);
        let key = order_key(&job);
        assert_eq!(key.rsplit(':').next(), Some(job.id.as_str()));
    }

    #[test]
    fn queue_keys_share_a_hash_tag() {
        let keys = QueueKeys::new(DEFAULT_KEY_PREFIX, "email-notifications");

        assert_eq!(keys.jobs, "bigfoot:queue:{email-notifications}:jobs");
        assert_eq!(keys.delayed, "bigfoot:queue:{email-notifications}:delayed");
        assert!(keys.finished(JobState::Waiting).is_err());
        assert_eq!(keys.finished(JobState::Failed).ok(), Some(keys.failed.as_str()));
    }
}
