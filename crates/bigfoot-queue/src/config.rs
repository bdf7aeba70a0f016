//! Queue manager configuration.

use std::time::Duration;

/// Timing settings shared by every queue of a manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How often the cleanup pass runs
    pub cleanup_interval: Duration,
    /// Completed jobs older than this are removed
    pub completed_retention: Duration,
    /// Failed jobs older than this are removed
    pub failed_retention: Duration,
    /// A handler running longer than this is abandoned as stalled
    pub stall_timeout: Duration,
    /// Idle pools re-check the store at least this often
    pub poll_interval: Duration,
    /// How long shutdown waits for in-flight jobs
    pub shutdown_grace: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(3600), // 1 hour
            completed_retention: Duration::from_secs(24 * 3600),
            failed_retention: Duration::from_secs(7 * 24 * 3600),
            stall_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ManagerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(env_u64("QUEUE_CLEANUP_INTERVAL_SECS", 3600)),
            completed_retention: Duration::from_secs(env_u64(
                "QUEUE_COMPLETED_RETENTION_SECS",
                24 * 3600,
            )),
            failed_retention: Duration::from_secs(env_u64(
                "QUEUE_FAILED_RETENTION_SECS",
                7 * 24 * 3600,
            )),
            stall_timeout: Duration::from_secs(env_u64("QUEUE_STALL_TIMEOUT_SECS", 30)),
            poll_interval: Duration::from_millis(env_u64("QUEUE_POLL_INTERVAL_MS", 500)),
            shutdown_grace: Duration::from_secs(env_u64("QUEUE_SHUTDOWN_GRACE_SECS", 30)),
        }
    }

    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }

    pub fn with_cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }
}
