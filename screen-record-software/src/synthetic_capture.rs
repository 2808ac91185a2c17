//! Synthetic capture provider.
//!
//! Stands in for a platform screen capture grant. Frames are either pushed by
//! hand through a [`SyntheticCaptureController`] or produced on a timer by a
//! `synthetic-capture` thread drawing a moving test pattern. The controller
//! also plays the capture system's other events: content hidden or shown,
//! the grant being revoked and the captured display being resized.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use screen_record_core::models::error::RecordError;
use screen_record_core::models::frame::{rgba_len, CapturedFrame};
use screen_record_core::traits::capture_provider::{CaptureBinding, CaptureProvider};

/// Vertical bar sweeping across a horizontal gradient.
///
/// `index` moves the bar, so consecutive frames differ.
pub fn test_pattern(width: u32, height: u32, index: u64, timestamp_ns: u64) -> CapturedFrame {
    let (w, h) = (width as usize, height as usize);
    let bar_width = (w / 16).max(1);
    let bar_start = (index as usize * bar_width) % w.max(1);
    let mut rgba = Vec::with_capacity(rgba_len(width, height));
    for y in 0..h {
        for x in 0..w {
            if x >= bar_start && x < bar_start + bar_width {
                rgba.extend_from_slice(&[255, 255, 255, 255]);
            } else {
                let r = (x * 255 / w.max(1)) as u8;
                let g = (y * 255 / h.max(1)) as u8;
                rgba.extend_from_slice(&[r, g, 96, 255]);
            }
        }
    }
    CapturedFrame::new(width, height, rgba, timestamp_ns)
}

struct Shared {
    name: String,
    binding: Mutex<Option<CaptureBinding>>,
    available: AtomicBool,
    generating: AtomicBool,
    frames_delivered: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

impl Shared {
    fn binding(&self) -> Option<CaptureBinding> {
        self.binding.lock().clone()
    }

    fn elapsed_ns(&self) -> u64 {
        self.started_at
            .lock()
            .map(|t| t.elapsed().as_nanos() as u64)
            .unwrap_or(0)
    }

    /// Deliver the next test-pattern frame, sized to the bound output.
    fn deliver_pattern(&self) -> bool {
        let Some(binding) = self.binding() else {
            return false;
        };
        let index = self.frames_delivered.fetch_add(1, Ordering::AcqRel);
        (binding.on_frame)(test_pattern(binding.width, binding.height, index, self.elapsed_ns()));
        true
    }
}

/// [`CaptureProvider`] fed by test patterns or hand-made frames.
pub struct SyntheticCapture {
    shared: Arc<Shared>,
    interval: Option<Duration>,
    generator: Option<thread::JoinHandle<()>>,
}

/// Test-side handle driving a [`SyntheticCapture`] from any thread.
#[derive(Clone)]
pub struct SyntheticCaptureController {
    shared: Arc<Shared>,
}

impl SyntheticCapture {
    pub fn new(name: &str) -> (Self, SyntheticCaptureController) {
        let shared = Arc::new(Shared {
            name: name.to_owned(),
            binding: Mutex::new(None),
            available: AtomicBool::new(true),
            generating: AtomicBool::new(false),
            frames_delivered: AtomicU64::new(0),
            started_at: Mutex::new(None),
        });
        (
            Self {
                shared: Arc::clone(&shared),
                interval: None,
                generator: None,
            },
            SyntheticCaptureController { shared },
        )
    }

    /// Produce a test-pattern frame every `interval` while started.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    fn spawn_generator(&mut self, interval: Duration) -> Result<(), RecordError> {
        let shared = Arc::clone(&self.shared);
        shared.generating.store(true, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name("synthetic-capture".into())
            .spawn(move || {
                while shared.generating.load(Ordering::SeqCst) {
                    if !shared.deliver_pattern() {
                        break;
                    }
                    thread::sleep(interval);
                }
            })
            .map_err(|e| RecordError::Unknown(format!("failed to spawn capture thread: {}", e)))?;
        self.generator = Some(handle);
        Ok(())
    }
}

impl CaptureProvider for SyntheticCapture {
    fn is_available(&self) -> bool {
        self.shared.available.load(Ordering::SeqCst)
    }

    fn start(&mut self, binding: CaptureBinding) -> Result<(), RecordError> {
        if !self.is_available() {
            return Err(RecordError::CaptureRevoked);
        }
        if self.shared.binding.lock().is_some() {
            return Err(RecordError::ConfigurationFailed("synthetic capture already bound".into()));
        }

        log::info!(
            "synthetic capture '{}' bound at {}x{}",
            self.shared.name,
            binding.width,
            binding.height
        );
        *self.shared.started_at.lock() = Some(Instant::now());
        *self.shared.binding.lock() = Some(binding);

        if let Some(interval) = self.interval {
            if let Err(e) = self.spawn_generator(interval) {
                self.shared.binding.lock().take();
                return Err(e);
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecordError> {
        self.shared.generating.store(false, Ordering::SeqCst);
        if let Some(handle) = self.generator.take() {
            let _ = handle.join();
        }
        self.shared.binding.lock().take();
        log::debug!(
            "synthetic capture '{}' released after {} frames",
            self.shared.name,
            self.shared.frames_delivered.load(Ordering::SeqCst)
        );
        Ok(())
    }

    fn name(&self) -> String {
        self.shared.name.clone()
    }
}

impl Drop for SyntheticCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl SyntheticCaptureController {
    /// Push a hand-made frame. Returns `false` while not bound.
    pub fn deliver_frame(&self, frame: CapturedFrame) -> bool {
        let Some(binding) = self.shared.binding() else {
            return false;
        };
        self.shared.frames_delivered.fetch_add(1, Ordering::AcqRel);
        (binding.on_frame)(frame);
        true
    }

    /// Push the next test-pattern frame. Returns `false` while not bound.
    pub fn deliver_pattern(&self) -> bool {
        self.shared.deliver_pattern()
    }

    pub fn set_content_visible(&self, visible: bool) {
        if let Some(binding) = self.shared.binding() {
            (binding.on_visibility_changed)(visible);
        }
    }

    /// The captured display changed size. Output size is fixed per session,
    /// so this is only logged.
    pub fn resize(&self, width: u32, height: u32) {
        log::info!(
            "captured content resized to {}x{}; output size unchanged",
            width,
            height
        );
    }

    /// Revoke the capture grant, as the system does when the user withdraws it.
    pub fn revoke(&self) {
        self.shared.available.store(false, Ordering::SeqCst);
        self.shared.generating.store(false, Ordering::SeqCst);
        if let Some(binding) = self.shared.binding() {
            (binding.on_stopped)();
        }
    }

    pub fn is_bound(&self) -> bool {
        self.shared.binding.lock().is_some()
    }

    pub fn frames_delivered(&self) -> u64 {
        self.shared.frames_delivered.load(Ordering::SeqCst)
    }
}
