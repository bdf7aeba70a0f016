//! Per-queue worker pool.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{watch, Notify};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn, Instrument};

use bigfoot_models::{JobId, JobState};

use crate::cleanup;
use crate::clock::{saturating_add, saturating_sub, Clock};
use crate::config::ManagerConfig;
use crate::error::{HandlerError, HandlerResult, QueueResult};
use crate::handler::JobHandler;
use crate::logging::JobLogger;
use crate::metrics;
use crate::options::QueueDefaults;
use crate::record::JobRecord;
use crate::store::JobStore;

/// Store transitions are tried this many times before the job is left to the reaper.
const TRANSITION_ATTEMPTS: u32 = 3;
const TRANSITION_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Registration data of one queue. Replaced wholesale on re-registration.
#[derive(Clone)]
pub(crate) struct QueueSettings {
    pub concurrency: usize,
    pub defaults: QueueDefaults,
    /// `None` for queues this process only enqueues into
    pub handler: Option<Arc<dyn JobHandler>>,
}

/// A registered queue, shared by the manager and its pool.
pub(crate) struct QueueEntry {
    pub name: String,
    settings: RwLock<QueueSettings>,
    /// Wakes an idle pool when a job is added
    pub notify: Notify,
    pool_spawned: AtomicBool,
}

impl QueueEntry {
    pub fn new(name: &str, settings: QueueSettings) -> Self {
        Self {
            name: name.to_string(),
            settings: RwLock::new(settings),
            notify: Notify::new(),
            pool_spawned: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> QueueSettings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn replace_settings(&self, settings: QueueSettings) {
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
        self.notify.notify_one();
    }

    pub fn has_handler(&self) -> bool {
        self.settings().handler.is_some()
    }

    /// Returns true exactly once, for the caller that should spawn the pool.
    pub fn mark_pool_spawned(&self) -> bool {
        !self.pool_spawned.swap(true, Ordering::SeqCst)
    }
}

/// Everything a pool and its job tasks need.
pub(crate) struct PoolContext {
    pub entry: Arc<QueueEntry>,
    pub store: Arc<dyn JobStore>,
    pub clock: Arc<dyn Clock>,
    pub config: ManagerConfig,
}

/// How long a record may sit active before the reaper treats it as lost.
///
/// Handlers are cut off after the stall timeout, so only a run whose final
/// store transition failed stays active this long.
pub(crate) fn stale_after(stall_timeout: Duration) -> Duration {
    stall_timeout
        .saturating_mul(2)
        .saturating_add(Duration::from_secs(1))
}

/// Claims and runs the jobs of one queue, at most `concurrency` at a time.
pub(crate) struct WorkerPool {
    ctx: Arc<PoolContext>,
    shutdown: watch::Receiver<bool>,
    /// Job each running task is working on
    in_flight: HashMap<task::Id, JobId>,
}

impl WorkerPool {
    pub fn new(ctx: PoolContext, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            ctx: Arc::new(ctx),
            shutdown,
            in_flight: HashMap::new(),
        }
    }

    fn queue(&self) -> &str {
        &self.ctx.entry.name
    }

    pub async fn run(mut self) {
        let mut tasks: JoinSet<()> = JoinSet::new();
        info!(
            queue = self.queue(),
            concurrency = self.ctx.entry.settings().concurrency,
            "Worker pool started"
        );

        let reap_every = self.ctx.config.stall_timeout.max(Duration::from_millis(1));
        let mut reaper = tokio::time::interval(reap_every);
        reaper.set_missed_tick_behavior(MissedTickBehavior::Delay);
        reaper.tick().await;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            while let Some(result) = tasks.try_join_next_with_id() {
                self.finish(result);
            }

            // Re-read every iteration so re-registration takes effect
            let settings = self.ctx.entry.settings();
            if let Some(handler) = settings.handler.as_ref() {
                while tasks.len() < settings.concurrency {
                    let now = self.ctx.clock.now();
                    match self.ctx.store.claim_next(self.queue(), now).await {
                        Ok(Some(record)) => {
                            let id = record.id.clone();
                            let ctx = Arc::clone(&self.ctx);
                            let handle = tasks.spawn(run_job(ctx, Arc::clone(handler), record));
                            self.in_flight.insert(handle.id(), id);
                        }
                        Ok(None) => break,
                        Err(e) => {
                            error!(queue = self.queue(), error = %e, "Failed to claim job");
                            break;
                        }
                    }
                }
            }

            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = self.ctx.entry.notify.notified() => {}
                _ = tokio::time::sleep(self.ctx.config.poll_interval) => {}
                _ = reaper.tick() => self.reap_lost().await,
                Some(result) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                    self.finish(result);
                }
            }
        }

        info!(
            queue = self.queue(),
            in_flight = tasks.len(),
            "Shutdown signal received, stopping worker pool"
        );
        self.drain(tasks).await;
        info!(queue = self.queue(), "Worker pool stopped");
    }

    /// Wait for in-flight jobs up to the grace period, then abandon the rest.
    async fn drain(&mut self, mut tasks: JoinSet<()>) {
        let grace = self.ctx.config.shutdown_grace;
        if tokio::time::timeout(grace, self.join_all(&mut tasks)).await.is_ok() {
            return;
        }

        // Only this pool's own jobs; a shared store may hold other workers' claims
        let abandoned: Vec<JobId> = self.in_flight.values().cloned().collect();
        warn!(
            queue = self.queue(),
            abandoned = abandoned.len(),
            "Shutdown grace period elapsed, abandoning in-flight jobs"
        );
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        self.in_flight.clear();

        let now = self.ctx.clock.now();
        match self
            .ctx
            .store
            .requeue_active(self.queue(), &abandoned, "abandoned during shutdown", now)
            .await
        {
            Ok(0) => {}
            Ok(count) => warn!(queue = self.queue(), count, "Returned abandoned jobs to waiting"),
            Err(e) => error!(queue = self.queue(), error = %e, "Failed to requeue abandoned jobs"),
        }
    }

    async fn join_all(&mut self, tasks: &mut JoinSet<()>) {
        while let Some(result) = tasks.join_next_with_id().await {
            self.finish(result);
        }
    }

    fn finish(&mut self, result: Result<(task::Id, ()), JoinError>) {
        match result {
            Ok((id, ())) => {
                self.in_flight.remove(&id);
            }
            Err(e) => {
                let job_id = self.in_flight.remove(&e.id());
                if !e.is_cancelled() {
                    error!(
                        queue = self.queue(),
                        job_id = ?job_id,
                        error = %e,
                        "Job task terminated abnormally"
                    );
                }
            }
        }
    }

    /// Return records left active past the stale horizon to waiting.
    ///
    /// Jobs this pool is still running are skipped.
    async fn reap_lost(&self) {
        let now = self.ctx.clock.now();
        let horizon = saturating_sub(now, stale_after(self.ctx.config.stall_timeout));
        let stale = match self.ctx.store.stale_active(self.queue(), horizon).await {
            Ok(stale) => stale,
            Err(e) => {
                warn!(queue = self.queue(), error = %e, "Failed to scan for lost jobs");
                return;
            }
        };

        let running: HashSet<&JobId> = self.in_flight.values().collect();
        let lost: Vec<JobId> = stale.into_iter().filter(|id| !running.contains(id)).collect();
        if lost.is_empty() {
            return;
        }

        match self
            .ctx
            .store
            .requeue_active(self.queue(), &lost, "lost while active", now)
            .await
        {
            Ok(requeued) => warn!(
                queue = self.queue(),
                lost = lost.len(),
                requeued,
                "Recovered jobs left active"
            ),
            Err(e) => error!(queue = self.queue(), error = %e, "Failed to recover lost jobs"),
        }
    }
}

/// Run a store transition, retrying transient errors with a short linear backoff.
async fn with_retry<F, Fut>(job_id: &JobId, action: &str, mut op: F) -> QueueResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = QueueResult<()>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < TRANSITION_ATTEMPTS && e.is_transient() => {
                warn!(%job_id, action, attempt, error = %e, "Store transition failed, retrying");
                tokio::time::sleep(TRANSITION_RETRY_DELAY * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Trim finished records of `state` after a transition, if the queue keeps a count.
async fn trim_after_finish(ctx: &PoolContext, queue: &str, state: JobState) {
    let defaults = ctx.entry.settings().defaults;
    let keep = match state {
        JobState::Completed => defaults.retention_completed,
        _ => defaults.retention_failed,
    };
    let Some(keep) = keep else {
        return;
    };
    if let Err(e) = cleanup::trim_finished(ctx.store.as_ref(), queue, state, keep).await {
        warn!(queue, state = %state, error = %e, "Failed to trim finished jobs");
    }
}

/// Execute one claimed job and record its outcome.
async fn run_job(ctx: Arc<PoolContext>, handler: Arc<dyn JobHandler>, record: JobRecord) {
    let logger = JobLogger::new(&record);
    logger.log_started(record.attempts_made + 1);

    let stall_timeout = ctx.config.stall_timeout;
    let started = Instant::now();
    let outcome = invoke(handler.as_ref(), &record, stall_timeout)
        .instrument(logger.create_span())
        .await;
    let elapsed = started.elapsed();
    let now = ctx.clock.now();

    match outcome {
        Ok(()) => {
            let queue = record.queue_name.as_str();
            let store = ctx.store.as_ref();
            let completed =
                with_retry(&record.id, "complete", || store.complete(queue, &record.id, now)).await;
            if let Err(e) = completed {
                error!(job_id = %record.id, error = %e, "Failed to mark job completed");
                return;
            }
            logger.log_completed(elapsed);
            metrics::record_job_completed(queue, record.job_type(), elapsed);
            trim_after_finish(&ctx, queue, JobState::Completed).await;
        }
        Err(err) => record_failure(&ctx, &record, &logger, err, now).await,
    }
}

/// Run the handler, turning a stall or panic into a handler error.
async fn invoke(handler: &dyn JobHandler, record: &JobRecord, stall_timeout: Duration) -> HandlerResult {
    let call = AssertUnwindSafe(handler.handle(&record.payload)).catch_unwind();
    match tokio::time::timeout(stall_timeout, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
        Err(_) => Err(HandlerError::StallTimeout(stall_timeout)),
    }
}

async fn record_failure(
    ctx: &PoolContext,
    record: &JobRecord,
    logger: &JobLogger,
    err: HandlerError,
    now: DateTime<Utc>,
) {
    let queue = record.queue_name.as_str();
    let stalled = err.is_stall();
    if stalled {
        logger.log_stalled(ctx.config.stall_timeout);
        metrics::record_job_stalled(queue, record.job_type());
    }

    let attempts = record.attempts_made + 1;
    let message = err.to_string();
    let store = ctx.store.as_ref();

    if attempts < record.max_attempts {
        let delay = record.backoff.delay_for_attempt(attempts);
        let available_at = saturating_add(now, delay);
        let retried = with_retry(&record.id, "retry", || {
            store.retry(queue, &record.id, attempts, &message, available_at, stalled)
        })
        .await;
        if let Err(e) = retried {
            error!(job_id = %record.id, error = %e, "Failed to schedule job retry");
            return;
        }
        logger.log_retry(&message, attempts, record.max_attempts, delay);
        metrics::record_job_retried(queue, record.job_type());
        debug!(job_id = %record.id, %available_at, "Job scheduled for retry");
    } else {
        let failed = with_retry(&record.id, "fail", || {
            store.fail(queue, &record.id, attempts, &message, now, stalled)
        })
        .await;
        if let Err(e) = failed {
            error!(job_id = %record.id, error = %e, "Failed to mark job failed");
            return;
        }
        logger.log_failed(&message, attempts, record.max_attempts);
        metrics::record_job_failed(queue, record.job_type());
        trim_after_finish(ctx, queue, JobState::Failed).await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_string_payloads() {
        let static_str: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        let other: Box<dyn Any + Send> = Box::new(42u8);

        assert_eq!(panic_message(static_str.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "owned boom");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }

    #[test]
    fn stale_horizon_outlasts_stall_window() {
        assert_eq!(stale_after(Duration::from_secs(30)), Duration::from_secs(61));
        assert_eq!(stale_after(Duration::MAX), Duration::MAX);
    }

    #[tokio::test]
    async fn transient_store_errors_are_retried() {
        let id = JobId::new();
        let mut calls = 0;
        let result = with_retry(&id, "complete", || {
            calls += 1;
            let outcome = if calls < TRANSITION_ATTEMPTS {
                Err(crate::error::QueueError::store("connection reset"))
            } else {
                Ok(())
            };
            async move { outcome }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls, TRANSITION_ATTEMPTS);
    }

    #[tokio::test]
    async fn missing_jobs_are_not_retried() {
        let id = JobId::new();
        let mut calls = 0;
        let result = with_retry(&id, "complete", || {
            calls += 1;
            async { Err::<(), _>(crate::error::QueueError::JobNotFound("gone".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
