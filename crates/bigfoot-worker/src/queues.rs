//! Built-in queue table and registration.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use bigfoot_models::{ANALYTICS_PROCESSING_QUEUE, EMAIL_NOTIFICATIONS_QUEUE, EVENT_CLEANUP_QUEUE};
use bigfoot_queue::{BackoffKind, BackoffPolicy, JobHandler, QueueDefaults, QueueManager, QueueResult};

/// Registration settings of one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub concurrency: usize,
    pub defaults: QueueDefaults,
}

impl QueueSpec {
    pub fn new(name: &str, concurrency: usize, defaults: QueueDefaults) -> Self {
        Self {
            name: name.to_string(),
            concurrency,
            defaults,
        }
    }

    /// Prefix of this queue's override variables, e.g. `QUEUE_EVENT_CLEANUP`.
    pub fn env_prefix(&self) -> String {
        format!("QUEUE_{}", self.name.to_uppercase().replace('-', "_"))
    }

    /// Apply `QUEUE_<NAME>_*` overrides on top of these settings.
    pub fn with_env_overrides(self) -> Self {
        let prefix = self.env_prefix();
        self.with_overrides(|key| std::env::var(format!("{prefix}_{key}")).ok())
    }

    /// Apply overrides from `lookup`, keyed by the variable suffix.
    ///
    /// Unparseable values are logged and ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(queue: &str, key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(queue, key, value = %raw, "Ignoring invalid queue override");
                    None
                }
            }
        }

        fn retention(queue: &str, key: &str, raw: Option<String>) -> Option<Option<usize>> {
            match raw.as_deref().map(str::trim) {
                Some("none") | Some("off") => Some(None),
                _ => parsed::<usize>(queue, key, raw).map(Some),
            }
        }

        let name = self.name.clone();
        if let Some(concurrency) = parsed::<usize>(&name, "CONCURRENCY", lookup("CONCURRENCY")) {
            if concurrency >= 1 {
                self.concurrency = concurrency;
            }
        }
        if let Some(attempts) = parsed::<u32>(&name, "ATTEMPTS", lookup("ATTEMPTS")) {
            if attempts >= 1 {
                self.defaults.max_attempts = attempts;
            }
        }
        if let Some(kind) = parsed::<BackoffKind>(&name, "BACKOFF_TYPE", lookup("BACKOFF_TYPE")) {
            self.defaults.backoff.kind = kind;
        }
        if let Some(ms) = parsed::<u64>(&name, "BACKOFF_DELAY_MS", lookup("BACKOFF_DELAY_MS")) {
            self.defaults.backoff.base_delay = Duration::from_millis(ms);
        }
        if let Some(keep) = retention(&name, "REMOVE_ON_COMPLETE", lookup("REMOVE_ON_COMPLETE")) {
            self.defaults.retention_completed = keep;
        }
        if let Some(keep) = retention(&name, "REMOVE_ON_FAIL", lookup("REMOVE_ON_FAIL")) {
            self.defaults.retention_failed = keep;
        }
        self
    }
}

/// The three built-in queues with their production defaults.
pub fn default_queue_specs() -> Vec<QueueSpec> {
    vec![
        QueueSpec::new(
            EVENT_CLEANUP_QUEUE,
            5,
            QueueDefaults::new(3, BackoffPolicy::exponential(Duration::from_millis(2000)))
                .with_retention(Some(10), Some(50)),
        ),
        QueueSpec::new(
            ANALYTICS_PROCESSING_QUEUE,
            10,
            QueueDefaults::new(5, BackoffPolicy::exponential(Duration::from_millis(1000)))
                .with_retention(Some(20), Some(100)),
        ),
        QueueSpec::new(
            EMAIL_NOTIFICATIONS_QUEUE,
            3,
            QueueDefaults::new(3, BackoffPolicy::exponential(Duration::from_millis(5000)))
                .with_retention(Some(5), Some(20)),
        ),
    ]
}

/// Register every queue with the same handler.
pub async fn register_queues(
    manager: &QueueManager,
    specs: &[QueueSpec],
    handler: Arc<dyn JobHandler>,
) -> QueueResult<()> {
    for spec in specs {
        manager
            .register_queue(
                &spec.name,
                spec.concurrency,
                spec.defaults.clone(),
                Arc::clone(&handler),
            )
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn spec(name: &str) -> QueueSpec {
        default_queue_specs()
            .into_iter()
            .find(|s| s.name == name)
            .unwrap()
    }

    #[test]
    fn test_default_table() {
        let cleanup = spec(EVENT_CLEANUP_QUEUE);
        assert_eq!(cleanup.concurrency, 5);
        assert_eq!(cleanup.defaults.max_attempts, 3);
        assert_eq!(cleanup.defaults.backoff, BackoffPolicy::exponential(Duration::from_secs(2)));
        assert_eq!(cleanup.defaults.retention_completed, Some(10));
        assert_eq!(cleanup.defaults.retention_failed, Some(50));

        let analytics = spec(ANALYTICS_PROCESSING_QUEUE);
        assert_eq!(analytics.concurrency, 10);
        assert_eq!(analytics.defaults.max_attempts, 5);

        let email = spec(EMAIL_NOTIFICATIONS_QUEUE);
        assert_eq!(email.concurrency, 3);
        assert_eq!(email.defaults.backoff.base_delay, Duration::from_secs(5));
        assert_eq!(email.defaults.retention_completed, Some(5));
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(spec(EVENT_CLEANUP_QUEUE).env_prefix(), "QUEUE_EVENT_CLEANUP");
        assert_eq!(
            spec(EMAIL_NOTIFICATIONS_QUEUE).env_prefix(),
            "QUEUE_EMAIL_NOTIFICATIONS"
        );
    }

    #[test]
    fn test_overrides_apply() {
        let spec = spec(EMAIL_NOTIFICATIONS_QUEUE).with_overrides(lookup(&[
            ("CONCURRENCY", "8"),
            ("ATTEMPTS", "6"),
            ("BACKOFF_TYPE", "fixed"),
            ("BACKOFF_DELAY_MS", "250"),
            ("REMOVE_ON_COMPLETE", "none"),
            ("REMOVE_ON_FAIL", "40"),
        ]));

        assert_eq!(spec.concurrency, 8);
        assert_eq!(spec.defaults.max_attempts, 6);
        assert_eq!(spec.defaults.backoff, BackoffPolicy::fixed(Duration::from_millis(250)));
        assert_eq!(spec.defaults.retention_completed, None);
        assert_eq!(spec.defaults.retention_failed, Some(40));
    }

    #[test]
    fn test_invalid_overrides_keep_defaults() {
        let original = spec(ANALYTICS_PROCESSING_QUEUE);
        let spec = original.clone().with_overrides(lookup(&[
            ("CONCURRENCY", "0"),
            ("ATTEMPTS", "many"),
            ("BACKOFF_TYPE", "linear"),
        ]));

        assert_eq!(spec, original);
    }
}
