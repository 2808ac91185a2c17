//! In-memory doubles for the backend traits, shared by the unit tests.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::config::VideoFormat;
use crate::models::error::RecordError;
use crate::models::frame::{rgba_len, CapturedFrame, PlaceholderImage, RenderedFrame};
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionState;
use crate::traits::capture_provider::{CaptureBinding, CaptureProvider};
use crate::traits::gpu_device::{GpuDevice, ProgramHandle, TextureHandle, TextureKind};
use crate::traits::hardware_encoder::{HardwareEncoder, InputSurface};
use crate::traits::recorder_backend::RecorderBackend;
use crate::traits::session_delegate::SessionDelegate;

pub fn solid_frame(width: u32, height: u32, color: [u8; 4], timestamp_ns: u64) -> CapturedFrame {
    let rgba: Vec<u8> = color.iter().copied().cycle().take(rgba_len(width, height)).collect();
    CapturedFrame::new(width, height, rgba, timestamp_ns)
}

/// Poll `condition` for up to five seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Unique file path under the system temp directory. Not created.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("screen_record_{}_{}", uuid::Uuid::new_v4(), name))
}

/// Unique directory path under the system temp directory. Not created.
pub fn temp_dir(name: &str) -> PathBuf {
    temp_path(name)
}

// --- GPU ---

#[derive(Default)]
struct DeviceRecord {
    calls: Vec<String>,
    drawn: Vec<TextureHandle>,
    latched: Vec<u64>,
    objects: HashSet<u32>,
    live: bool,
}

/// Observes a [`MockDevice`] after it moved to the render thread.
#[derive(Clone, Default)]
pub struct DeviceLog {
    inner: Arc<Mutex<DeviceRecord>>,
}

impl DeviceLog {
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    pub fn drawn_textures(&self) -> Vec<TextureHandle> {
        self.inner.lock().drawn.clone()
    }

    pub fn latched_timestamps(&self) -> Vec<u64> {
        self.inner.lock().latched.clone()
    }

    /// Programs and textures created and not yet deleted.
    pub fn live_objects(&self) -> usize {
        self.inner.lock().objects.len()
    }

    /// Whether a device exists that has not been released.
    pub fn is_live(&self) -> bool {
        self.inner.lock().live
    }

    fn call(&self, name: &str) {
        self.inner.lock().calls.push(name.to_owned());
    }
}

pub struct MockDevice {
    log: DeviceLog,
    surface: Option<Arc<dyn InputSurface>>,
    viewport: (u32, u32),
    next_id: u32,
    draws: u64,
    pub fail_make_current: bool,
    pub fail_upload: bool,
    /// 1-based index of the `draw_quad` call that fails.
    pub fail_draw_on: Option<u64>,
}

impl MockDevice {
    pub fn new() -> (Self, DeviceLog) {
        let log = DeviceLog::default();
        (Self::with_log(log.clone()), log)
    }

    fn with_log(log: DeviceLog) -> Self {
        log.inner.lock().live = true;
        Self {
            log,
            surface: None,
            viewport: (0, 0),
            next_id: 1,
            draws: 0,
            fail_make_current: false,
            fail_upload: false,
            fail_draw_on: None,
        }
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.log.inner.lock().objects.insert(id);
        id
    }

    fn is_object(&self, id: u32) -> bool {
        self.log.inner.lock().objects.contains(&id)
    }
}

impl GpuDevice for MockDevice {
    fn make_current(&mut self, surface: &Arc<dyn InputSurface>) -> Result<(), RecordError> {
        self.log.call("make_current");
        if self.fail_make_current {
            return Err(RecordError::GpuError("make_current failed".into()));
        }
        self.surface = Some(Arc::clone(surface));
        Ok(())
    }

    fn create_program(&mut self, _vertex_src: &str, _fragment_src: &str) -> Result<ProgramHandle, RecordError> {
        self.log.call("create_program");
        Ok(ProgramHandle(self.allocate()))
    }

    fn create_texture(&mut self, _kind: TextureKind) -> Result<TextureHandle, RecordError> {
        self.log.call("create_texture");
        Ok(TextureHandle(self.allocate()))
    }

    fn upload_image(&mut self, _texture: TextureHandle, _image: &PlaceholderImage) -> Result<(), RecordError> {
        self.log.call("upload_image");
        if self.fail_upload {
            return Err(RecordError::GpuError("upload failed".into()));
        }
        Ok(())
    }

    fn update_external_texture(&mut self, texture: TextureHandle, frame: &CapturedFrame) -> Result<(), RecordError> {
        if !self.is_object(texture.0) {
            return Err(RecordError::GpuError(format!("unknown texture {}", texture.0)));
        }
        self.log.inner.lock().latched.push(frame.timestamp_ns);
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), RecordError> {
        self.viewport = (width, height);
        Ok(())
    }

    fn clear(&mut self, _color: [f32; 4]) -> Result<(), RecordError> {
        Ok(())
    }

    fn draw_quad(
        &mut self,
        program: ProgramHandle,
        texture: TextureHandle,
        vertices: &[f32],
    ) -> Result<(), RecordError> {
        self.draws += 1;
        if self.fail_draw_on == Some(self.draws) {
            return Err(RecordError::GpuError("injected draw failure".into()));
        }
        if !self.is_object(program.0) || !self.is_object(texture.0) || vertices.len() != 20 {
            return Err(RecordError::GpuError("invalid draw call".into()));
        }
        self.log.inner.lock().drawn.push(texture);
        Ok(())
    }

    fn swap_buffers(&mut self, presentation_time_ns: u64) -> Result<(), RecordError> {
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| RecordError::GpuError("no surface bound".into()))?;
        let (width, height) = self.viewport;
        surface.queue_frame(RenderedFrame {
            width,
            height,
            rgba: vec![0; rgba_len(width, height)],
            presentation_time_ns,
        })
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.log.inner.lock().objects.remove(&program.0);
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.log.inner.lock().objects.remove(&texture.0);
    }

    fn release(&mut self) {
        self.log.call("release");
        self.log.inner.lock().live = false;
        self.surface = None;
    }
}

pub struct MockSurface {
    width: u32,
    height: u32,
    queued: AtomicU64,
    released: AtomicBool,
}

impl MockSurface {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            queued: AtomicU64::new(0),
            released: AtomicBool::new(false),
        })
    }

    pub fn frames_queued(&self) -> u64 {
        self.queued.load(Ordering::Acquire)
    }

    fn invalidate(&self) {
        self.released.store(true, Ordering::Release);
    }
}

impl InputSurface for MockSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn queue_frame(&self, _frame: RenderedFrame) -> Result<(), RecordError> {
        if self.released.load(Ordering::Acquire) {
            return Err(RecordError::EncoderError("surface released".into()));
        }
        self.queued.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

// --- Encoder ---

#[derive(Default)]
struct EncoderRecord {
    calls: Vec<String>,
    shared: Option<Arc<Mutex<Vec<String>>>>,
}

#[derive(Clone, Default)]
pub struct EncoderLog {
    inner: Arc<Mutex<EncoderRecord>>,
}

impl EncoderLog {
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    /// Also append `encoder.<call>` entries to a log shared with other doubles.
    pub fn share_events(&self, events: Arc<Mutex<Vec<String>>>) {
        self.inner.lock().shared = Some(events);
    }

    fn call(&self, name: &str) {
        let mut record = self.inner.lock();
        record.calls.push(name.to_owned());
        if let Some(ref shared) = record.shared {
            shared.lock().push(format!("encoder.{}", name));
        }
    }
}

pub struct MockEncoder {
    log: EncoderLog,
    surface: Option<Arc<MockSurface>>,
    pub fail_configure: bool,
    pub fail_stop: bool,
    pub stop_delay: Option<Duration>,
    /// Hand out a surface of this size instead of the requested one.
    pub surface_size: Option<(u32, u32)>,
}

impl MockEncoder {
    pub fn new() -> (Self, EncoderLog) {
        let log = EncoderLog::default();
        (Self::with_log(log.clone()), log)
    }

    fn with_log(log: EncoderLog) -> Self {
        Self {
            log,
            surface: None,
            fail_configure: false,
            fail_stop: false,
            stop_delay: None,
            surface_size: None,
        }
    }
}

impl HardwareEncoder for MockEncoder {
    fn container_extension(&self) -> &str {
        "bin"
    }

    fn mime_type(&self) -> &str {
        "application/octet-stream"
    }

    fn configure(&mut self, format: &VideoFormat, output_path: &Path) -> Result<Arc<dyn InputSurface>, RecordError> {
        self.log.call("configure");
        // Real codecs may create the container before rejecting the format.
        fs::write(output_path, b"mock").map_err(|e| RecordError::StorageError(e.to_string()))?;
        if self.fail_configure {
            return Err(RecordError::EncoderError("codec unavailable".into()));
        }
        let (width, height) = self.surface_size.unwrap_or((format.width, format.height));
        let surface = MockSurface::new(width, height);
        self.surface = Some(Arc::clone(&surface));
        Ok(surface)
    }

    fn start(&mut self) -> Result<(), RecordError> {
        self.log.call("start");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecordError> {
        if let Some(delay) = self.stop_delay {
            thread::sleep(delay);
        }
        self.log.call("stop");
        if self.fail_stop {
            return Err(RecordError::EncoderError("flush failed".into()));
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(ref surface) = self.surface {
            surface.invalidate();
        }
        self.log.call("release");
    }

    fn frames_encoded(&self) -> u64 {
        self.surface.as_ref().map_or(0, |s| s.frames_queued())
    }
}

// --- Capture provider ---

struct ProviderShared {
    binding: Mutex<Option<CaptureBinding>>,
    available: AtomicBool,
    fail_start: AtomicBool,
    events: Arc<Mutex<Vec<String>>>,
}

pub struct MockProvider {
    shared: Arc<ProviderShared>,
}

/// Test-side handle that plays the capture system.
#[derive(Clone)]
pub struct MockProviderController {
    shared: Arc<ProviderShared>,
}

impl MockProvider {
    pub fn new() -> (Self, MockProviderController) {
        let shared = Arc::new(ProviderShared {
            binding: Mutex::new(None),
            available: AtomicBool::new(true),
            fail_start: AtomicBool::new(false),
            events: Arc::new(Mutex::new(Vec::new())),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockProviderController { shared },
        )
    }
}

impl CaptureProvider for MockProvider {
    fn is_available(&self) -> bool {
        self.shared.available.load(Ordering::Acquire)
    }

    fn start(&mut self, binding: CaptureBinding) -> Result<(), RecordError> {
        if self.shared.fail_start.load(Ordering::Acquire) {
            return Err(RecordError::PermissionDenied);
        }
        self.shared.events.lock().push("provider.start".into());
        *self.shared.binding.lock() = Some(binding);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecordError> {
        self.shared.events.lock().push("provider.stop".into());
        self.shared.binding.lock().take();
        Ok(())
    }

    fn name(&self) -> String {
        "mock display".into()
    }
}

impl MockProviderController {
    fn binding(&self) -> Option<CaptureBinding> {
        self.shared.binding.lock().clone()
    }

    pub fn deliver(&self, frame: CapturedFrame) {
        if let Some(binding) = self.binding() {
            (binding.on_frame)(frame);
        }
    }

    pub fn set_visible(&self, visible: bool) {
        if let Some(binding) = self.binding() {
            (binding.on_visibility_changed)(visible);
        }
    }

    pub fn revoke(&self) {
        if let Some(binding) = self.binding() {
            (binding.on_stopped)();
        }
    }

    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::Release);
    }

    pub fn fail_start(&self) {
        self.shared.fail_start.store(true, Ordering::Release);
    }

    pub fn is_bound(&self) -> bool {
        self.shared.binding.lock().is_some()
    }

    pub fn event_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.shared.events)
    }
}

// --- Backend ---

#[derive(Default)]
struct Faults {
    draw_on: Option<u64>,
    configure: bool,
    device: bool,
    upload: bool,
    stop: bool,
    stop_delay: Option<Duration>,
}

pub struct MockBackend {
    encoder_log: EncoderLog,
    device_log: DeviceLog,
    faults: Mutex<Faults>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            encoder_log: EncoderLog::default(),
            device_log: DeviceLog::default(),
            faults: Mutex::new(Faults::default()),
        })
    }

    pub fn encoder_log(&self) -> EncoderLog {
        self.encoder_log.clone()
    }

    pub fn device_log(&self) -> DeviceLog {
        self.device_log.clone()
    }

    pub fn fail_draw_on(&self, n: u64) {
        self.faults.lock().draw_on = Some(n);
    }

    pub fn fail_configure(&self) {
        self.faults.lock().configure = true;
    }

    pub fn fail_device(&self) {
        self.faults.lock().device = true;
    }

    pub fn fail_upload(&self) {
        self.faults.lock().upload = true;
    }

    pub fn fail_stop(&self) {
        self.faults.lock().stop = true;
    }

    pub fn slow_stop(&self, delay: Duration) {
        self.faults.lock().stop_delay = Some(delay);
    }

    pub fn reset_failures(&self) {
        *self.faults.lock() = Faults::default();
    }
}

impl RecorderBackend for MockBackend {
    type Device = MockDevice;
    type Encoder = MockEncoder;

    fn create_encoder(&self) -> Result<MockEncoder, RecordError> {
        let faults = self.faults.lock();
        let mut encoder = MockEncoder::with_log(self.encoder_log.clone());
        encoder.fail_configure = faults.configure;
        encoder.fail_stop = faults.stop;
        encoder.stop_delay = faults.stop_delay;
        Ok(encoder)
    }

    fn create_device(&self) -> Result<MockDevice, RecordError> {
        let faults = self.faults.lock();
        if faults.device {
            return Err(RecordError::GpuError("no GPU available".into()));
        }
        let mut device = MockDevice::with_log(self.device_log.clone());
        device.fail_upload = faults.upload;
        device.fail_draw_on = faults.draw_on;
        Ok(device)
    }
}

// --- Delegate ---

#[derive(Default)]
pub struct RecordingDelegate {
    states: Mutex<Vec<String>>,
    visibility: Mutex<Vec<bool>>,
    errors: AtomicUsize,
    finished: AtomicUsize,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state_names(&self) -> Vec<String> {
        self.states.lock().clone()
    }

    pub fn visibility_changes(&self) -> Vec<bool> {
        self.visibility.lock().clone()
    }

    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Acquire)
    }

    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::Acquire)
    }
}

impl SessionDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: &SessionState) {
        self.states.lock().push(state.name().to_owned());
    }

    fn on_content_visibility_changed(&self, visible: bool) {
        self.visibility.lock().push(visible);
    }

    fn on_error(&self, _error: &RecordError) {
        self.errors.fetch_add(1, Ordering::AcqRel);
    }

    fn on_recording_finished(&self, _result: &RecordingResult) {
        self.finished.fetch_add(1, Ordering::AcqRel);
    }
}
