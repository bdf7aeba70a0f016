//! S3 storage for finished live events.
//!
//! This crate provides:
//! - JSON archival of chat logs and analytics under a fixed per-event key
//! - Artifact moves from the live bucket to cold storage

pub mod client;
pub mod error;
pub mod keys;

pub use client::{ArchiveClient, ArchiveConfig, MoveOutcome};
pub use error::{StorageError, StorageResult};
