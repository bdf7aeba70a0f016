//! Object key layout for archived events.

use crate::error::{StorageError, StorageResult};

/// Prefix for everything stored about one event.
pub fn event_prefix(event_id: &str) -> String {
    format!("events/{}", event_id)
}

/// Archived chat log of an event.
pub fn chat_log_key(event_id: &str) -> String {
    format!("{}/chat-log.json", event_prefix(event_id))
}

/// Archived raw analytics of an event.
pub fn analytics_key(event_id: &str) -> String {
    format!("{}/analytics.json", event_prefix(event_id))
}

/// Cold-storage key for an artifact, keeping only its file name.
///
/// Fails for keys with no file name, such as `""` or `"recordings/"`.
pub fn cold_artifact_key(event_id: &str, artifact_key: &str) -> StorageResult<String> {
    let file = artifact_key
        .rsplit('/')
        .next()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| StorageError::invalid_key(artifact_key))?;
    Ok(format!("{}/{}", event_prefix(event_id), file))
}

/// `CopySource` value for an object, with the key URL-encoded per segment.
pub fn copy_source(bucket: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", bucket, encoded.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_keys() {
        assert_eq!(chat_log_key("evt_42"), "events/evt_42/chat-log.json");
        assert_eq!(analytics_key("evt_42"), "events/evt_42/analytics.json");
    }

    #[test]
    fn test_cold_artifact_key_uses_file_name() {
        assert_eq!(
            cold_artifact_key("evt_1", "recordings/evt_1/stream.mp4").unwrap(),
            "events/evt_1/stream.mp4"
        );
        assert_eq!(
            cold_artifact_key("evt_1", "thumb.jpg").unwrap(),
            "events/evt_1/thumb.jpg"
        );
        assert!(cold_artifact_key("evt_1", "recordings/").is_err());
        assert!(cold_artifact_key("evt_1", "").is_err());
    }

    #[test]
    fn test_copy_source_encodes_segments() {
        assert_eq!(
            copy_source("bigfoot-artifacts", "recordings/my clip.mp4"),
            "bigfoot-artifacts/recordings/my%20clip.mp4"
        );
    }
}
