//! # screen-record-software
//!
//! Headless backend for screen-record-core.
//!
//! Provides:
//! - `SoftwareGpu`: CPU rasterizer implementing `GpuDevice`
//! - `Y4mEncoder`: YUV4MPEG2 file encoder implementing `HardwareEncoder`
//! - `SyntheticCapture`: test-pattern capture provider
//! - `DirectoryExporter`: moves finished recordings into a shared folder
//! - `SoftwareBackend`: the `RecorderBackend` tying the first two together
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use screen_record_core::{RecordingConfiguration, ScreenRecorder};
//! use screen_record_software::{SoftwareBackend, SyntheticCapture};
//!
//! let recorder = ScreenRecorder::new(Arc::new(SoftwareBackend), RecordingConfiguration::default());
//! let (capture, controller) = SyntheticCapture::new("synthetic display");
//! recorder.start_record(capture)?;
//! controller.deliver_pattern();
//! let result = recorder.stop_record()?;
//! ```

pub mod backend;
pub mod directory_exporter;
pub mod software_gpu;
pub mod synthetic_capture;
pub mod y4m_encoder;

pub use backend::SoftwareBackend;
pub use directory_exporter::DirectoryExporter;
pub use software_gpu::SoftwareGpu;
pub use synthetic_capture::{SyntheticCapture, SyntheticCaptureController};
pub use y4m_encoder::{Y4mEncoder, Y4mSurface};
