use std::path::Path;
use std::sync::Arc;

use crate::models::config::VideoFormat;
use crate::models::error::RecordError;
use crate::models::frame::RenderedFrame;

/// Drawable input of a hardware encoder.
///
/// One-to-one with an encoder instance and invalid once it is released.
pub trait InputSurface: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Queue a presented frame for encoding. May block while the encoder
    /// drains its input queue.
    fn queue_frame(&self, frame: RenderedFrame) -> Result<(), RecordError>;
}

/// Interface for platform video encoders.
///
/// Implemented by:
/// - `Y4mEncoder` (screen-record-software)
pub trait HardwareEncoder: Send {
    /// File extension of the container this encoder writes, without a dot.
    fn container_extension(&self) -> &str;

    fn mime_type(&self) -> &str;

    /// Configure the encoder and create the output file at `output_path`.
    fn configure(&mut self, format: &VideoFormat, output_path: &Path) -> Result<Arc<dyn InputSurface>, RecordError>;

    fn start(&mut self) -> Result<(), RecordError>;

    /// Drain buffered frames and seal the output file.
    fn stop(&mut self) -> Result<(), RecordError>;

    /// Free encoder resources and invalidate the input surface.
    fn release(&mut self);

    /// Frames written to the output so far.
    fn frames_encoded(&self) -> u64;
}
