//! # screen-record-core
//!
//! Platform-agnostic screen recording core library.
//!
//! Captured frames are handed from the capture provider to a dedicated render
//! thread, drawn onto the encoder's input surface and finalized into a file.
//! Platform backends implement the `GpuDevice`, `HardwareEncoder` and
//! `CaptureProvider` traits and plug into the generic `ScreenRecorder`.
//!
//! ## Architecture
//!
//! ```text
//! screen-record-core (this crate)
//! ├── traits/    ← CaptureProvider, GpuDevice, HardwareEncoder, RecorderBackend, SessionDelegate, RecordingExporter
//! ├── models/    ← RecordError, SessionState, RecordingConfiguration, frames, RecordingResult
//! ├── gpu/       ← GpuContextManager (render thread), TextureRenderer
//! ├── capture/   ← FrameSource (latest-frame handoff)
//! ├── render/    ← RenderLoop, CancelToken
//! ├── encoder/   ← EncoderSink (open → start → stop → release)
//! ├── session/   ← RecordingSession state machine, ScreenRecorder orchestrator
//! └── storage/   ← checksum, metadata sidecar
//! ```

pub mod capture;
pub mod encoder;
pub mod gpu;
pub mod models;
pub mod render;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use capture::frame_source::FrameSource;
pub use encoder::sink::{EncoderSink, SinkState};
pub use gpu::context::{GpuContext, GpuContextManager, GpuTask};
pub use gpu::renderer::TextureRenderer;
pub use models::config::{RecordingConfiguration, VideoFormat};
pub use models::error::RecordError;
pub use models::frame::{CapturedFrame, PlaceholderImage, RenderedFrame};
pub use models::recording_result::{RecordingMetadata, RecordingResult, RenderDiagnostics};
pub use models::state::SessionState;
pub use render::render_loop::{CancelToken, RenderLoop, RenderLoopHandle};
pub use session::recorder::ScreenRecorder;
pub use session::recording::{RecordingSession, SessionStatus};
pub use traits::capture_provider::{CaptureBinding, CaptureProvider, FrameCallback};
pub use traits::exporter::RecordingExporter;
pub use traits::gpu_device::{GpuDevice, ProgramHandle, TextureHandle, TextureKind};
pub use traits::hardware_encoder::{HardwareEncoder, InputSurface};
pub use traits::recorder_backend::RecorderBackend;
pub use traits::session_delegate::SessionDelegate;
