//! Background job worker for the Bigfoot backend.
//!
//! This crate provides:
//! - Handlers for event cleanup, analytics aggregation and email delivery
//! - Collaborator traits and their S3, Redis and HTTP adapters
//! - The built-in queue table with environment overrides
//! - An operator admin router

pub mod admin;
pub mod archive;
pub mod cache;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod event_service;
pub mod handlers;
pub mod mailer;
pub mod processor;
pub mod queues;
pub mod telemetry;

pub use admin::{create_router, AdminState};
pub use cache::{connect_redis, RedisMetricsCache};
pub use collaborators::{
    AnalyticsStore, Collaborators, EventArchive, EventStatusStore, Mailer, MetricsCache,
};
pub use config::{MailConfig, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use event_service::EventServiceClient;
pub use handlers::aggregate_analytics_data;
pub use mailer::{mailer_from_config, HttpMailer, LogMailer};
pub use processor::JobProcessor;
pub use queues::{default_queue_specs, register_queues, QueueSpec};
