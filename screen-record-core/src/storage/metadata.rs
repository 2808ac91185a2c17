use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::RecordError;
use crate::models::recording_result::RecordingMetadata;

/// Sidecar path for a recording: `{recording_path}.metadata.json`.
pub fn metadata_path(recording_path: &Path) -> PathBuf {
    let mut name = recording_path.as_os_str().to_owned();
    name.push(".metadata.json");
    PathBuf::from(name)
}

/// Write recording metadata as a JSON sidecar file.
pub fn write_metadata(metadata: &RecordingMetadata, recording_path: &Path) -> Result<PathBuf, RecordError> {
    let path = metadata_path(recording_path);
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| RecordError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&path, json).map_err(|e| RecordError::StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(path)
}

/// Read recording metadata from a JSON sidecar file.
pub fn read_metadata(recording_path: &Path) -> Result<RecordingMetadata, RecordError> {
    let json = fs::read_to_string(metadata_path(recording_path))
        .map_err(|e| RecordError::StorageError(format!("failed to read metadata: {}", e)))?;
    let metadata: RecordingMetadata = serde_json::from_str(&json)
        .map_err(|e| RecordError::StorageError(format!("failed to parse metadata: {}", e)))?;
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::VideoFormat;
    use crate::test_support::temp_path;

    #[test]
    fn sidecar_keeps_the_container_extension() {
        let path = metadata_path(Path::new("/tmp/rec_1.y4m"));
        assert_eq!(path, PathBuf::from("/tmp/rec_1.y4m.metadata.json"));
    }

    #[test]
    fn write_then_read_sidecar() {
        let recording = temp_path("metadata_roundtrip.y4m");
        let format = VideoFormat {
            width: 1280,
            height: 720,
            bitrate: 6_000_000,
            frame_rate: 60,
        };
        let metadata = RecordingMetadata::new(&format, "video/x-yuv4mpeg", "x", 1.5, 90, 4, "abcd");

        let written = write_metadata(&metadata, &recording).unwrap();
        assert_eq!(read_metadata(&recording).unwrap(), metadata);

        fs::remove_file(written).ok();
    }

    #[test]
    fn missing_sidecar_is_a_storage_error() {
        let result = read_metadata(&temp_path("does_not_exist.y4m"));
        assert!(matches!(result, Err(RecordError::StorageError(_))));
    }
}
