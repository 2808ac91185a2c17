use crate::models::error::RecordError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionState;

/// Event delegate for recording session notifications.
///
/// Methods are called from the session, render and capture threads, never
/// from the caller's thread. Implementations should marshal if needed.
pub trait SessionDelegate: Send + Sync {
    fn on_state_changed(&self, state: &SessionState);

    /// Called when the capture provider reports the content hidden or shown.
    fn on_content_visibility_changed(&self, _visible: bool) {}

    fn on_error(&self, error: &RecordError);

    /// Called once the output file is sealed.
    fn on_recording_finished(&self, result: &RecordingResult);
}
