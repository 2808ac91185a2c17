use std::path::PathBuf;

use super::frame::PlaceholderImage;

/// Configuration for a recording session.
///
/// Resolution is fixed for the whole session; there is no mid-session resize.
#[derive(Debug, Clone)]
pub struct RecordingConfiguration {
    /// Output width in pixels (default: 1280). Must be even.
    pub width: u32,

    /// Output height in pixels (default: 720). Must be even.
    pub height: u32,

    /// Target video bitrate in bits per second (default: 6 Mbps).
    pub video_bitrate: u32,

    /// Target frame rate (default: 60).
    pub frame_rate: u32,

    /// Working directory where the output file is created while recording.
    pub output_directory: PathBuf,

    /// File name prefix; the final name is `{prefix}_{unix_millis}.{ext}`.
    pub file_prefix: String,

    /// Image drawn instead of captured content while that content is hidden.
    pub placeholder: PlaceholderImage,

    /// Write a `{file}.metadata.json` sidecar next to the finalized recording.
    pub write_metadata: bool,
}

impl RecordingConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("invalid resolution: {}x{}", self.width, self.height));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(format!(
                "resolution must have even dimensions: {}x{}",
                self.width, self.height
            ));
        }
        if self.video_bitrate == 0 {
            return Err("video bitrate must be positive".into());
        }
        if !(1..=240).contains(&self.frame_rate) {
            return Err(format!("unsupported frame rate: {}", self.frame_rate));
        }
        if self.file_prefix.is_empty() || self.file_prefix.contains(['/', '\\']) {
            return Err(format!("invalid file prefix: {:?}", self.file_prefix));
        }
        self.placeholder.validate()?;
        Ok(())
    }

    /// The format handed to the hardware encoder.
    pub fn video_format(&self) -> VideoFormat {
        VideoFormat {
            width: self.width,
            height: self.height,
            bitrate: self.video_bitrate,
            frame_rate: self.frame_rate,
        }
    }
}

impl Default for RecordingConfiguration {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            video_bitrate: 6_000_000,
            frame_rate: 60,
            output_directory: PathBuf::from("."),
            file_prefix: "ScreenRecording".into(),
            placeholder: PlaceholderImage::default(),
            write_metadata: true,
        }
    }
}

/// Encoder-facing video configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub frame_rate: u32,
}
