use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::config::VideoFormat;

/// Result returned when a recording session is finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub frames_drawn: u64,
    pub frames_encoded: u64,
    pub checksum: String,
    pub metadata: RecordingMetadata,
    /// Where the export collaborator moved the file, if it ran.
    pub exported_path: Option<PathBuf>,
}

/// Metadata stored alongside a recording.
///
/// Serializable for the JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub file_path: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub video_bitrate: u32,
    pub frame_rate: u32,
    pub duration_secs: f64,
    pub frames_encoded: u64,
    pub placeholder_frames: u64,
    pub checksum: String,
}

impl RecordingMetadata {
    pub fn new(
        format: &VideoFormat,
        mime_type: &str,
        file_path: &str,
        duration_secs: f64,
        frames_encoded: u64,
        placeholder_frames: u64,
        checksum: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            file_path: file_path.to_string(),
            mime_type: mime_type.to_string(),
            width: format.width,
            height: format.height,
            video_bitrate: format.bitrate,
            frame_rate: format.frame_rate,
            duration_secs,
            frames_encoded,
            placeholder_frames,
            checksum: checksum.to_string(),
        }
    }

    /// Playback duration implied by the encoded frame count at the nominal rate.
    pub fn encoded_duration_secs(&self) -> f64 {
        if self.frame_rate == 0 {
            return 0.0;
        }
        self.frames_encoded as f64 / self.frame_rate as f64
    }
}

/// Live counters maintained by the render loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderDiagnostics {
    /// `await_next_frame` returned true.
    pub frames_signaled: u64,
    /// Cycles that reached `present` successfully.
    pub frames_drawn: u64,
    /// Of `frames_drawn`, how many used the placeholder image.
    pub placeholder_frames: u64,
    /// Cycles skipped because a GPU call failed.
    pub failed_cycles: u64,
}
