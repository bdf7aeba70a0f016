//! Worker error types.

use thiserror::Error;

use bigfoot_queue::HandlerError;
use bigfoot_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Event service request failed: {0}")]
    EventServiceFailed(String),

    #[error("Cache update failed: {0}")]
    CacheFailed(String),

    #[error("Mail delivery failed: {0}")]
    MailFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn event_service_failed(msg: impl Into<String>) -> Self {
        Self::EventServiceFailed(msg.into())
    }

    pub fn cache_failed(msg: impl Into<String>) -> Self {
        Self::CacheFailed(msg.into())
    }

    pub fn mail_failed(msg: impl Into<String>) -> Self {
        Self::MailFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

/// Every handler failure is retryable; the queue decides when to give up.
impl From<WorkerError> for HandlerError {
    fn from(e: WorkerError) -> Self {
        HandlerError::Failed(e.to_string())
    }
}
