//! Background job queues.
//!
//! This crate provides:
//! - Named queues with per-queue concurrency and retry defaults
//! - A bounded worker pool per queue with fixed/exponential backoff
//! - Stall detection for wedged handlers
//! - Periodic cleanup of completed and failed jobs
//! - A pluggable job store with in-memory and Redis implementations

pub mod cleanup;
pub mod clock;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod manager;
pub mod memory;
pub mod metrics;
pub mod options;
mod pool;
pub mod record;
pub mod redis_store;
pub mod store;

pub use cleanup::{CleanupReport, QueueCleanup};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ManagerConfig;
pub use error::{HandlerError, HandlerResult, QueueError, QueueResult};
pub use handler::{handler_fn, FnHandler, JobHandler};
pub use logging::JobLogger;
pub use manager::{QueueManager, EVENT_CLEANUP_ATTEMPTS, EVENT_CLEANUP_PRIORITY};
pub use memory::MemoryJobStore;
pub use options::{BackoffKind, BackoffPolicy, JobOptions, QueueDefaults};
pub use record::{JobRecord, QueueCounts};
pub use redis_store::{RedisJobStore, DEFAULT_KEY_PREFIX};
pub use store::JobStore;
