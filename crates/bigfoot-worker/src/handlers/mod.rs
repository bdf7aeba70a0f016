//! Job handlers, one per payload kind.

pub mod analytics;
pub mod email;
pub mod event_cleanup;

pub use analytics::{aggregate_analytics_data, metrics_cache_key, AnalyticsHandler, METRICS_CACHE_TTL};
pub use email::EmailHandler;
pub use event_cleanup::EventCleanupHandler;
