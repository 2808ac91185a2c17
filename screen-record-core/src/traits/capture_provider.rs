use std::sync::Arc;

use crate::models::error::RecordError;
use crate::models::frame::CapturedFrame;

/// Callback invoked when the capture provider has a new frame.
///
/// Called on the provider's own thread. Implementations behind this callback
/// only record the frame and signal availability; they never touch GPU state.
pub type FrameCallback = Arc<dyn Fn(CapturedFrame) + Send + Sync + 'static>;

/// Callback invoked when the captured content becomes visible (`true`) or hidden (`false`).
pub type VisibilityCallback = Arc<dyn Fn(bool) + Send + Sync + 'static>;

/// Callback invoked when the capture grant is revoked externally.
pub type StoppedCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Everything a capture provider needs to feed a recording session.
#[derive(Clone)]
pub struct CaptureBinding {
    /// Size of the output target the provider should render into.
    pub width: u32,
    pub height: u32,
    pub on_frame: FrameCallback,
    pub on_visibility_changed: VisibilityCallback,
    pub on_stopped: StoppedCallback,
}

/// Interface for a screen capture source obtained from a capture grant.
///
/// Implemented by:
/// - `SyntheticCapture` (screen-record-software)
pub trait CaptureProvider: Send {
    /// Whether the capture grant behind this provider is still usable.
    fn is_available(&self) -> bool;

    /// Bind the provider's output to the session and start delivering frames.
    fn start(&mut self, binding: CaptureBinding) -> Result<(), RecordError>;

    /// Release the output binding. No callbacks fire after this returns.
    fn stop(&mut self) -> Result<(), RecordError>;

    /// Human-readable name of the captured source.
    fn name(&self) -> String;
}
