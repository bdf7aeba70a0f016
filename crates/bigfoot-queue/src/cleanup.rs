//! Retention cleanup of finished jobs.

use std::collections::BTreeMap;
use std::sync::Weak;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use bigfoot_models::JobState;

use crate::clock::saturating_sub;
use crate::config::ManagerConfig;
use crate::error::QueueResult;
use crate::manager::ManagerInner;
use crate::metrics;
use crate::options::QueueDefaults;
use crate::store::JobStore;

/// Jobs removed from one queue by a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCleanup {
    pub completed: usize,
    pub failed: usize,
}

/// Result of one cleanup pass across all queues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub queues: BTreeMap<String, QueueCleanup>,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.queues.values().map(|q| q.completed + q.failed).sum()
    }
}

/// Apply age and count retention to one queue.
pub(crate) async fn clean_queue(
    store: &dyn JobStore,
    queue: &str,
    defaults: &QueueDefaults,
    config: &ManagerConfig,
    now: DateTime<Utc>,
) -> QueueResult<QueueCleanup> {
    let completed_before = saturating_sub(now, config.completed_retention);
    let failed_before = saturating_sub(now, config.failed_retention);

    let completed = store
        .clean(queue, JobState::Completed, completed_before, defaults.retention_completed)
        .await?;
    let failed = store
        .clean(queue, JobState::Failed, failed_before, defaults.retention_failed)
        .await?;

    if completed > 0 {
        metrics::record_jobs_cleaned(queue, JobState::Completed, completed);
    }
    if failed > 0 {
        metrics::record_jobs_cleaned(queue, JobState::Failed, failed);
    }
    if completed + failed > 0 {
        info!(queue, completed, failed, "Cleaned up old jobs");
    }

    Ok(QueueCleanup { completed, failed })
}

/// Trim a queue's `state` records down to the newest `keep`, regardless of age.
///
/// Runs as each job finishes so retention counts hold between cleanup passes.
pub(crate) async fn trim_finished(
    store: &dyn JobStore,
    queue: &str,
    state: JobState,
    keep: usize,
) -> QueueResult<usize> {
    let removed = store
        .clean(queue, state, DateTime::<Utc>::MIN_UTC, Some(keep))
        .await?;
    if removed > 0 {
        metrics::record_jobs_cleaned(queue, state, removed);
        debug!(queue, state = %state, removed, keep, "Trimmed finished jobs");
    }
    Ok(removed)
}

/// Run the cleanup pass every `interval` until shutdown.
///
/// Holds only a weak handle so a dropped manager ends the loop.
pub(crate) async fn run_scheduler(
    manager: Weak<ManagerInner>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = interval.max(Duration::from_millis(1));
    info!("Starting job cleanup scheduler (interval: {:?})", period);

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                if let Err(e) = manager.cleanup_old_jobs().await {
                    error!(error = %e, "Job cleanup failed");
                }
            }
        }
    }

    info!("Job cleanup scheduler stopped");
}
