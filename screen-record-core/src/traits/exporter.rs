use std::path::PathBuf;

use crate::models::error::RecordError;
use crate::models::recording_result::RecordingResult;

/// Moves a finalized recording into durable shared storage.
///
/// Invoked only after the session reached `Stopped`. Implementations own the
/// removal of the working copy.
pub trait RecordingExporter: Send + Sync {
    /// Returns the path of the exported file.
    fn export(&self, result: &RecordingResult) -> Result<PathBuf, RecordError>;
}
