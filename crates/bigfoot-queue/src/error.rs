//! Queue error types.

use std::time::Duration;

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

/// Errors surfaced synchronously to callers of the queue manager.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue {0} not found")]
    QueueNotFound(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Queue manager is shutting down")]
    ShuttingDown,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {id} is {state}, expected active")]
    NotActive { id: String, state: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn not_found(queue: impl Into<String>) -> Self {
        Self::QueueNotFound(queue.into())
    }

    pub fn invalid_options(msg: impl Into<String>) -> Self {
        Self::InvalidOptions(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn not_active(id: impl ToString, state: impl ToString) -> Self {
        Self::NotActive {
            id: id.to_string(),
            state: state.to_string(),
        }
    }

    /// Whether retrying the same store call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Store(_) | QueueError::Redis(_))
    }
}

pub type HandlerResult = Result<(), HandlerError>;

/// Errors produced while executing a job.
///
/// These never reach the enqueuer. The worker pool turns them into a retry
/// or a terminal failure.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("Handler stalled after {0:?}")]
    StallTimeout(Duration),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn is_stall(&self) -> bool {
        matches!(self, HandlerError::StallTimeout(_))
    }
}
