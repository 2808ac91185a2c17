use thiserror::Error;

/// Errors that can occur while preparing, running, or finalizing a recording.
///
/// Setup failures (`ProviderUnavailable`, `ConfigurationFailed`, `GpuError`,
/// `EncoderError` during preparing) and finalization failures are fatal to the
/// session. Per-frame draw failures never surface past the render loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("capture provider not available")]
    ProviderUnavailable,

    #[error("capture was revoked")]
    CaptureRevoked,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("gpu error: {0}")]
    GpuError(String),

    #[error("encoder error: {0}")]
    EncoderError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("render thread terminated")]
    RenderThreadTerminated,

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("unknown error: {0}")]
    Unknown(String),
}
