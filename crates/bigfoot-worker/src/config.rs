//! Worker configuration.

use std::time::Duration;

use bigfoot_queue::{ManagerConfig, DEFAULT_KEY_PREFIX};

use crate::queues::{default_queue_specs, QueueSpec};

/// Outbound mail provider settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Provider endpoint; mail is only logged when unset
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            from: "no-reply@bigfootlive.com".to_string(),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Redis URL for the job store and the real-time metrics cache
    pub redis_url: String,
    /// Prefix of every job store key
    pub queue_prefix: String,
    /// Base URL of the event service
    pub event_service_url: String,
    /// Timeout for event service and mail provider requests
    pub http_timeout: Duration,
    pub mail: MailConfig,
    /// Admin server bind address
    pub admin_host: String,
    pub admin_port: u16,
    /// Expose Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
    pub manager: ManagerConfig,
    pub queues: Vec<QueueSpec>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            queue_prefix: DEFAULT_KEY_PREFIX.to_string(),
            event_service_url: "http://localhost:3001".to_string(),
            http_timeout: Duration::from_secs(10),
            mail: MailConfig::default(),
            admin_host: "0.0.0.0".to_string(),
            admin_port: 9090,
            metrics_enabled: true,
            manager: ManagerConfig::default(),
            queues: default_queue_specs(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let redis_url = std::env::var("REDIS_URL").ok().unwrap_or_else(|| {
            match (std::env::var("REDIS_HOST"), std::env::var("REDIS_PORT")) {
                (Err(_), Err(_)) => defaults.redis_url.clone(),
                (host, port) => format!(
                    "redis://{}:{}",
                    host.unwrap_or_else(|_| "localhost".to_string()),
                    port.unwrap_or_else(|_| "6379".to_string())
                ),
            }
        });

        let event_service_url = std::env::var("EVENT_SERVICE_URL")
            .or_else(|_| std::env::var("API_URL"))
            .unwrap_or(defaults.event_service_url);

        Self {
            redis_url,
            queue_prefix: std::env::var("QUEUE_REDIS_PREFIX")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.queue_prefix),
            event_service_url,
            http_timeout: Duration::from_secs(
                std::env::var("HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            mail: MailConfig {
                api_url: std::env::var("MAIL_API_URL").ok().filter(|s| !s.is_empty()),
                api_key: std::env::var("MAIL_API_KEY").ok().filter(|s| !s.is_empty()),
                from: std::env::var("MAIL_FROM").unwrap_or(defaults.mail.from),
            },
            admin_host: std::env::var("ADMIN_HOST").unwrap_or(defaults.admin_host),
            admin_port: std::env::var("ADMIN_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(9090),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            manager: ManagerConfig::from_env(),
            queues: default_queue_specs()
                .into_iter()
                .map(QueueSpec::with_env_overrides)
                .collect(),
        }
    }
}
