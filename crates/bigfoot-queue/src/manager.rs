//! Queue manager.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use bigfoot_models::{
    AnalyticsProcessingJob, EmailJob, EventCleanupJob, JobId, JobPayload,
    ANALYTICS_PROCESSING_QUEUE, EMAIL_NOTIFICATIONS_QUEUE, EVENT_CLEANUP_QUEUE,
};

use crate::cleanup::{self, CleanupReport};
use crate::clock::Clock;
use crate::config::ManagerConfig;
use crate::error::{QueueError, QueueResult};
use crate::handler::JobHandler;
use crate::logging::JobLogger;
use crate::metrics;
use crate::options::{JobOptions, QueueDefaults};
use crate::pool::{PoolContext, QueueEntry, QueueSettings, WorkerPool};
use crate::record::{JobRecord, QueueCounts};
use crate::store::JobStore;

/// Priority given to event cleanup jobs queued when a stream stops.
pub const EVENT_CLEANUP_PRIORITY: i32 = 5;
/// Attempts given to event cleanup jobs queued when a stream stops.
pub const EVENT_CLEANUP_ATTEMPTS: u32 = 3;

/// Owns the named queues, their worker pools and the cleanup scheduler.
///
/// Cloning is cheap; every clone drives the same queues.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    config: ManagerConfig,
    queues: RwLock<BTreeMap<String, Arc<QueueEntry>>>,
    seq: AtomicU64,
    started: AtomicBool,
    closing: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<JoinSet<()>>,
}

impl QueueManager {
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, config: ManagerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ManagerInner {
                store,
                clock,
                config,
                queues: RwLock::new(BTreeMap::new()),
                seq: AtomicU64::new(0),
                started: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                shutdown_tx,
                tasks: Mutex::new(JoinSet::new()),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Register a queue, or replace the handler and defaults of an existing one.
    ///
    /// A running pool picks up replaced settings on its next iteration.
    /// Registering after [`start`](Self::start) spawns the pool right away.
    pub async fn register_queue(
        &self,
        name: &str,
        concurrency: usize,
        defaults: QueueDefaults,
        handler: Arc<dyn JobHandler>,
    ) -> QueueResult<()> {
        if concurrency < 1 {
            return Err(QueueError::invalid_options("concurrency must be at least 1"));
        }
        self.upsert_queue(name, concurrency, defaults, Some(handler))
            .await
    }

    /// Declare a queue this manager only enqueues into.
    ///
    /// No pool runs for it here; another process sharing the store does the
    /// work. A later [`register_queue`](Self::register_queue) attaches a handler.
    pub async fn declare_queue(&self, name: &str, defaults: QueueDefaults) -> QueueResult<()> {
        defaults.validate()?;
        if let Some(entry) = self.inner.entry(name).await {
            if entry.has_handler() {
                let mut settings = entry.settings();
                settings.defaults = defaults;
                entry.replace_settings(settings);
                return Ok(());
            }
        }
        self.upsert_queue(name, 1, defaults, None).await
    }

    async fn upsert_queue(
        &self,
        name: &str,
        concurrency: usize,
        defaults: QueueDefaults,
        handler: Option<Arc<dyn JobHandler>>,
    ) -> QueueResult<()> {
        defaults.validate()?;
        let consumes = handler.is_some();

        let settings = QueueSettings {
            concurrency,
            defaults,
            handler,
        };

        let mut queues = self.inner.queues.write().await;
        if self.inner.closing.load(Ordering::SeqCst) {
            return Err(QueueError::ShuttingDown);
        }
        let entry = match queues.get(name) {
            Some(entry) => {
                entry.replace_settings(settings);
                info!(queue = name, concurrency, consumes, "Queue re-registered");
                Arc::clone(entry)
            }
            None => {
                let entry = Arc::new(QueueEntry::new(name, settings));
                queues.insert(name.to_string(), Arc::clone(&entry));
                info!(queue = name, concurrency, consumes, "Queue registered");
                entry
            }
        };

        // Checked under the registry lock so `start` never races this spawn
        if self.inner.started.load(Ordering::SeqCst) {
            self.inner.spawn_pool(entry).await;
        }
        Ok(())
    }

    /// Enqueue a job. Handler errors never surface here.
    pub async fn add_job(
        &self,
        queue: &str,
        payload: impl Into<JobPayload>,
        options: JobOptions,
    ) -> QueueResult<JobId> {
        if self.inner.closing.load(Ordering::SeqCst) {
            return Err(QueueError::ShuttingDown);
        }

        let entry = self
            .inner
            .entry(queue)
            .await
            .ok_or_else(|| QueueError::not_found(queue))?;
        let resolved = options.resolve(&entry.settings().defaults)?;

        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        let record = JobRecord::new(seq, queue, payload.into(), resolved, self.inner.clock.now())?;
        let id = record.id.clone();
        let job_type = record.job_type();
        let logger = JobLogger::new(&record);

        self.inner.store.push(record).await?;
        entry.notify.notify_one();

        logger.log_added(resolved.priority, resolved.delay);
        metrics::record_job_enqueued(queue, job_type);
        Ok(id)
    }

    /// Queue post-stream cleanup of an event.
    pub async fn enqueue_event_cleanup(&self, job: EventCleanupJob) -> QueueResult<JobId> {
        let options = JobOptions::new()
            .with_priority(EVENT_CLEANUP_PRIORITY)
            .with_max_attempts(EVENT_CLEANUP_ATTEMPTS);
        self.add_job(EVENT_CLEANUP_QUEUE, job, options).await
    }

    pub async fn enqueue_analytics(&self, job: AnalyticsProcessingJob) -> QueueResult<JobId> {
        self.add_job(ANALYTICS_PROCESSING_QUEUE, job, JobOptions::new())
            .await
    }

    pub async fn enqueue_email(&self, job: EmailJob) -> QueueResult<JobId> {
        self.add_job(EMAIL_NOTIFICATIONS_QUEUE, job, JobOptions::new())
            .await
    }

    /// Read a job record for inspection.
    pub async fn get_job(&self, queue: &str, id: &JobId) -> QueueResult<Option<JobRecord>> {
        if self.inner.entry(queue).await.is_none() {
            return Err(QueueError::not_found(queue));
        }
        self.inner.store.get(queue, id).await
    }

    /// Per-queue job counts.
    ///
    /// Counts are taken one queue at a time, so the map is not a single
    /// atomic snapshot across queues.
    pub async fn get_queue_stats(&self) -> QueueResult<BTreeMap<String, QueueCounts>> {
        let names = self.inner.queue_names().await;

        let mut stats = BTreeMap::new();
        for name in names {
            let counts = self.inner.store.counts(&name).await?;
            metrics::set_queue_counts(&name, &counts);
            stats.insert(name, counts);
        }
        Ok(stats)
    }

    /// Run one retention pass over every queue.
    pub async fn cleanup_old_jobs(&self) -> QueueResult<CleanupReport> {
        self.inner.cleanup_old_jobs().await
    }

    /// Spawn the worker pools and the cleanup scheduler.
    pub async fn start(&self) -> QueueResult<()> {
        if self.inner.closing.load(Ordering::SeqCst) {
            return Err(QueueError::ShuttingDown);
        }
        let queues = self.inner.queues.write().await;
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let entries: Vec<Arc<QueueEntry>> = queues.values().cloned().collect();
        drop(queues);

        let queue_count = entries.len();
        for entry in entries {
            self.inner.spawn_pool(entry).await;
        }

        let scheduler = cleanup::run_scheduler(
            Arc::downgrade(&self.inner),
            self.inner.config.cleanup_interval,
            self.inner.shutdown_tx.subscribe(),
        );
        self.inner.tasks.lock().await.spawn(scheduler);

        info!(queues = queue_count, "Queue manager started");
        Ok(())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs and wind down the pools.
    ///
    /// Waits up to the shutdown grace period for in-flight jobs; jobs still
    /// running after that are abandoned and returned to waiting. Calling this
    /// again, or concurrently, returns immediately.
    pub async fn shutdown(&self) {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Shutting down queue manager");
        self.inner.shutdown_tx.send_replace(true);

        // Joined outside the lock; a pool spawned after this sees the signal and exits
        let mut tasks = std::mem::take(&mut *self.inner.tasks.lock().await);
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Queue task terminated abnormally");
            }
        }

        info!("Queue manager stopped");
    }
}

impl ManagerInner {
    async fn entry(&self, name: &str) -> Option<Arc<QueueEntry>> {
        self.queues.read().await.get(name).cloned()
    }

    async fn queue_names(&self) -> Vec<String> {
        self.queues.read().await.keys().cloned().collect()
    }

    /// Spawn the pool of a consuming queue, at most once per entry.
    async fn spawn_pool(&self, entry: Arc<QueueEntry>) {
        if !entry.has_handler() || !entry.mark_pool_spawned() {
            return;
        }
        let ctx = PoolContext {
            entry,
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        };
        let pool = WorkerPool::new(ctx, self.shutdown_tx.subscribe());
        self.tasks.lock().await.spawn(pool.run());
    }

    pub(crate) async fn cleanup_old_jobs(&self) -> QueueResult<CleanupReport> {
        let entries: Vec<Arc<QueueEntry>> = self.queues.read().await.values().cloned().collect();
        let now = self.clock.now();

        let mut report = CleanupReport::default();
        for entry in entries {
            let defaults = entry.settings().defaults;
            let cleaned =
                cleanup::clean_queue(self.store.as_ref(), &entry.name, &defaults, &self.config, now)
                    .await?;
            report.queues.insert(entry.name.clone(), cleaned);
        }

        if report.total() == 0 {
            debug!("No old jobs to clean up");
        } else {
            info!(removed = report.total(), "Cleanup pass finished");
        }
        Ok(report)
    }
}
