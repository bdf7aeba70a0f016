//! S3 client for event archives and cold storage.

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::StorageClass;
use aws_sdk_s3::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::keys;

/// Configuration for the archive client.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// AWS region
    pub region: String,
    /// Custom S3 endpoint (MinIO, LocalStack)
    pub endpoint_url: Option<String>,
    /// Static credentials; the default provider chain is used when unset
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Bucket receiving chat logs and analytics
    pub archive_bucket: String,
    /// Bucket holding live recordings and thumbnails
    pub artifacts_bucket: String,
    /// Infrequent-access bucket artifacts are moved to
    pub cold_bucket: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            region: "us-west-2".to_string(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            archive_bucket: "bigfoot-archive".to_string(),
            artifacts_bucket: "bigfoot-artifacts".to_string(),
            cold_bucket: "bigfoot-cold-storage".to_string(),
        }
    }
}

impl ArchiveConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let defaults = Self::default();
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok();
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok();
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(StorageError::config_error(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together",
            ));
        }

        Ok(Self {
            region: std::env::var("AWS_REGION").unwrap_or(defaults.region),
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty()),
            access_key_id,
            secret_access_key,
            archive_bucket: std::env::var("S3_BUCKET_ARCHIVE").unwrap_or(defaults.archive_bucket),
            artifacts_bucket: std::env::var("S3_BUCKET_ARTIFACTS")
                .unwrap_or(defaults.artifacts_bucket),
            cold_bucket: std::env::var("S3_BUCKET_COLD").unwrap_or(defaults.cold_bucket),
        })
    }
}

/// How an artifact move ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    /// The cold copy was already present; only the source was removed
    AlreadyMoved,
}

/// S3 client for finished-event data.
#[derive(Clone)]
pub struct ArchiveClient {
    client: Client,
    config: ArchiveConfig,
}

impl ArchiveClient {
    /// Create a new client from configuration.
    pub async fn new(config: ArchiveConfig) -> StorageResult<Self> {
        let mut builder = match (&config.access_key_id, &config.secret_access_key) {
            (Some(key), Some(secret)) => {
                let credentials = Credentials::new(key, secret, None, None, "bigfoot-env");
                Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .credentials_provider(credentials)
            }
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                Builder::from(&shared)
            }
        };

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            config,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        Self::new(ArchiveConfig::from_env()?).await
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Serialize `value` as JSON and write it to the archive bucket.
    ///
    /// Overwrites any previous object at `key`.
    pub async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        let body = serde_json::to_vec(value)?;
        debug!("Uploading {} bytes to {}", body.len(), key);

        self.client
            .put_object()
            .bucket(&self.config.archive_bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(())
    }

    /// Archive an event's chat log.
    pub async fn put_chat_log<T: Serialize + ?Sized>(&self, event_id: &str, messages: &T) -> StorageResult<()> {
        self.put_json(&keys::chat_log_key(event_id), messages).await
    }

    /// Archive an event's raw analytics.
    pub async fn put_analytics<T: Serialize + ?Sized>(&self, event_id: &str, data: &T) -> StorageResult<()> {
        self.put_json(&keys::analytics_key(event_id), data).await
    }

    /// Check if an object exists.
    pub async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    Ok(false)
                } else {
                    Err(StorageError::AwsSdk(e.to_string()))
                }
            }
        }
    }

    /// Move an artifact to the cold bucket under the event's prefix.
    ///
    /// Safe to repeat: a cold copy that already exists is not copied again,
    /// and deleting an already-removed source succeeds.
    pub async fn move_to_cold(&self, event_id: &str, artifact_key: &str) -> StorageResult<MoveOutcome> {
        let destination = keys::cold_artifact_key(event_id, artifact_key)?;

        let outcome = if self.exists(&self.config.cold_bucket, &destination).await? {
            debug!("Artifact {} already in cold storage", destination);
            MoveOutcome::AlreadyMoved
        } else {
            self.client
                .copy_object()
                .copy_source(keys::copy_source(&self.config.artifacts_bucket, artifact_key))
                .bucket(&self.config.cold_bucket)
                .key(&destination)
                .storage_class(StorageClass::GlacierIr)
                .send()
                .await
                .map_err(|e| StorageError::copy_failed(e.to_string()))?;
            MoveOutcome::Moved
        };

        self.client
            .delete_object()
            .bucket(&self.config.artifacts_bucket)
            .key(artifact_key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        info!(
            event_id,
            artifact = artifact_key,
            destination = %destination,
            "Moved artifact to cold storage"
        );
        Ok(outcome)
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.config.archive_bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("S3 connectivity check failed: {}", e)))?;
        Ok(())
    }
}
