//! S3 integration tests.

use bigfoot_storage::{keys, ArchiveClient, MoveOutcome};

/// Test connectivity to the configured archive bucket.
#[tokio::test]
#[ignore = "requires S3"]
async fn test_s3_connectivity() {
    dotenvy::dotenv().ok();

    let client = ArchiveClient::from_env().await.expect("Failed to create client");
    client
        .check_connectivity()
        .await
        .expect("Archive bucket not reachable");
}

/// Archival overwrites the same key on every run.
#[tokio::test]
#[ignore = "requires S3"]
async fn test_chat_log_archive_is_idempotent() {
    dotenvy::dotenv().ok();

    let client = ArchiveClient::from_env().await.expect("Failed to create client");
    let event_id = "it-archive-event";
    let messages = serde_json::json!([{ "id": "m1", "content": "hello" }]);

    client.put_chat_log(event_id, &messages).await.expect("First upload failed");
    client.put_chat_log(event_id, &messages).await.expect("Second upload failed");

    let archive_bucket = client.config().archive_bucket.clone();
    let exists = client
        .exists(&archive_bucket, &keys::chat_log_key(event_id))
        .await
        .expect("Head failed");
    assert!(exists);
}

/// A second move of the same artifact is a no-op.
#[tokio::test]
#[ignore = "requires S3"]
async fn test_artifact_move_is_idempotent() {
    dotenvy::dotenv().ok();

    let client = ArchiveClient::from_env().await.expect("Failed to create client");
    let event_id = "it-move-event";
    // Must already exist in the artifacts bucket
    let artifact = std::env::var("S3_TEST_ARTIFACT_KEY").expect("S3_TEST_ARTIFACT_KEY not set");
    let artifact = artifact.as_str();

    let first = client.move_to_cold(event_id, artifact).await.expect("Move failed");
    let second = client.move_to_cold(event_id, artifact).await.expect("Repeat move failed");

    assert!(matches!(first, MoveOutcome::Moved | MoveOutcome::AlreadyMoved));
    assert_eq!(second, MoveOutcome::AlreadyMoved);
}
