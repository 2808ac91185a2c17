use super::error::RecordError;
use super::recording_result::RecordingResult;

/// Recording session state machine.
///
/// State transitions:
/// ```text
/// idle → preparing → recording → stopping → stopped
///            ↓                       ↓
///          failed                  failed
/// ```
///
/// Transitions are strictly sequential. A session that reached `Stopped` or
/// `Failed` is never reused.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Preparing,
    Recording,
    Stopping,
    Stopped(Box<RecordingResult>),
    Failed(RecordError),
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped(_) | Self::Failed(_))
    }

    /// Short lowercase name, used in logs and by delegates.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Stopped(_) => "stopped",
            Self::Failed(_) => "failed",
        }
    }
}
