//! YUV4MPEG2 file encoder.
//!
//! Writes uncompressed 4:2:0 video, one `FRAME` record per presented frame.
//! The stream header is written when the encoder is configured, so the output
//! file exists from then on. Frames queued on the input surface are converted
//! and written by a dedicated `y4m-encoder` thread fed through a bounded
//! channel; a full channel blocks the render thread, which is the same
//! backpressure a hardware encoder applies.
//!
//! ## Stream layout
//!
//! ```text
//! YUV4MPEG2 W{w} H{h} F{fps}:1 Ip A1:1 C420jpeg XBITRATE={bps}\n
//! FRAME\n  Y plane (w*h)  Cb plane (w/2*h/2)  Cr plane (w/2*h/2)
//! FRAME\n  ...
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use screen_record_core::models::config::VideoFormat;
use screen_record_core::models::error::RecordError;
use screen_record_core::models::frame::{rgba_len, RenderedFrame};
use screen_record_core::traits::hardware_encoder::{HardwareEncoder, InputSurface};

/// Frames buffered between the render thread and the writer.
const QUEUE_DEPTH: usize = 4;

pub const Y4M_MIME_TYPE: &str = "video/x-yuv4mpeg";

/// Stream header for `format`.
pub fn stream_header(format: &VideoFormat) -> String {
    format!(
        "YUV4MPEG2 W{} H{} F{}:1 Ip A1:1 C420jpeg XBITRATE={}\n",
        format.width, format.height, format.frame_rate, format.bitrate
    )
}

/// Size in bytes of one `FRAME` record, marker included.
pub fn frame_record_len(width: u32, height: u32) -> usize {
    let luma = width as usize * height as usize;
    b"FRAME\n".len() + luma + luma / 2
}

/// Convert packed RGBA to planar I420 using full-range BT.601 coefficients.
///
/// Chroma is the average of each 2x2 block. `width` and `height` must be even.
pub fn rgba_to_i420(rgba: &[u8], width: u32, height: u32, out: &mut Vec<u8>) {
    let (w, h) = (width as usize, height as usize);
    let luma = w * h;
    out.clear();
    out.resize(luma + luma / 2, 0);
    let (y_plane, chroma) = out.split_at_mut(luma);
    let (cb_plane, cr_plane) = chroma.split_at_mut(luma / 4);

    for (i, px) in rgba.chunks_exact(4).take(luma).enumerate() {
        let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
        y_plane[i] = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
    }

    let half_w = w / 2;
    for cy in 0..h / 2 {
        for cx in 0..half_w {
            let (mut r, mut g, mut b) = (0.0f32, 0.0f32, 0.0f32);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let i = ((cy * 2 + dy) * w + cx * 2 + dx) * 4;
                r += rgba[i] as f32;
                g += rgba[i + 1] as f32;
                b += rgba[i + 2] as f32;
            }
            let (r, g, b) = (r / 4.0, g / 4.0, b / 4.0);
            let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
            let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
            cb_plane[cy * half_w + cx] = cb.round().clamp(0.0, 255.0) as u8;
            cr_plane[cy * half_w + cx] = cr.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Input surface handed to the GPU device.
///
/// Accepts frames only between `start` and `stop`; once the encoder is
/// released it rejects everything.
pub struct Y4mSurface {
    width: u32,
    height: u32,
    sender: Mutex<Option<SyncSender<RenderedFrame>>>,
}

impl Y4mSurface {
    fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            sender: Mutex::new(None),
        })
    }

    fn open(&self, sender: SyncSender<RenderedFrame>) {
        *self.sender.lock() = Some(sender);
    }

    fn close(&self) {
        self.sender.lock().take();
    }
}

impl InputSurface for Y4mSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn queue_frame(&self, frame: RenderedFrame) -> Result<(), RecordError> {
        if frame.width != self.width || frame.height != self.height || frame.rgba.len() != rgba_len(self.width, self.height)
        {
            return Err(RecordError::EncoderError(format!(
                "frame is {}x{}, surface is {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        // Clone out of the lock so a blocking send never holds it.
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| RecordError::EncoderError("surface is not accepting frames".into()))?;
        sender
            .send(frame)
            .map_err(|_| RecordError::EncoderError("encoder writer has stopped".into()))
    }
}

type WriterHandle = thread::JoinHandle<Result<BufWriter<File>, RecordError>>;

/// [`HardwareEncoder`] producing `.y4m` files.
pub struct Y4mEncoder {
    surface: Option<Arc<Y4mSurface>>,
    output: Option<BufWriter<File>>,
    output_path: Option<PathBuf>,
    writer: Option<WriterHandle>,
    frames_written: Arc<AtomicU64>,
}

impl Y4mEncoder {
    pub fn new() -> Self {
        Self {
            surface: None,
            output: None,
            output_path: None,
            writer: None,
            frames_written: Arc::new(AtomicU64::new(0)),
        }
    }

    fn write_loop(
        mut out: BufWriter<File>,
        frames: Receiver<RenderedFrame>,
        written: Arc<AtomicU64>,
    ) -> Result<BufWriter<File>, RecordError> {
        let mut planes = Vec::new();
        for frame in frames {
            rgba_to_i420(&frame.rgba, frame.width, frame.height, &mut planes);
            out.write_all(b"FRAME\n")
                .and_then(|_| out.write_all(&planes))
                .map_err(|e| RecordError::EncoderError(format!("failed to write frame: {}", e)))?;
            let count = written.fetch_add(1, Ordering::AcqRel) + 1;
            log::trace!("encoded frame {} (pts {} ns)", count, frame.presentation_time_ns);
        }
        Ok(out)
    }

    fn join_writer(&mut self) -> Result<Option<BufWriter<File>>, RecordError> {
        let Some(handle) = self.writer.take() else {
            return Ok(None);
        };
        handle
            .join()
            .map_err(|_| RecordError::EncoderError("encoder writer thread panicked".into()))?
            .map(Some)
    }
}

impl Default for Y4mEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareEncoder for Y4mEncoder {
    fn container_extension(&self) -> &str {
        "y4m"
    }

    fn mime_type(&self) -> &str {
        Y4M_MIME_TYPE
    }

    fn configure(&mut self, format: &VideoFormat, output_path: &Path) -> Result<Arc<dyn InputSurface>, RecordError> {
        if self.surface.is_some() {
            return Err(RecordError::InvalidTransition("encoder is already configured".into()));
        }
        if format.width == 0 || format.height == 0 || format.width % 2 != 0 || format.height % 2 != 0 {
            return Err(RecordError::EncoderError(format!(
                "4:2:0 output needs non-zero even dimensions, got {}x{}",
                format.width, format.height
            )));
        }

        let file = File::create(output_path)
            .map_err(|e| RecordError::StorageError(format!("failed to create {}: {}", output_path.display(), e)))?;
        let mut out = BufWriter::new(file);
        out.write_all(stream_header(format).as_bytes())
            .map_err(|e| RecordError::StorageError(format!("failed to write stream header: {}", e)))?;

        let surface = Y4mSurface::new(format.width, format.height);
        self.surface = Some(Arc::clone(&surface));
        self.output = Some(out);
        self.output_path = Some(output_path.to_path_buf());
        log::debug!("y4m encoder configured for {}", output_path.display());
        Ok(surface)
    }

    fn start(&mut self) -> Result<(), RecordError> {
        let (Some(surface), Some(out)) = (self.surface.as_ref(), self.output.take()) else {
            return Err(RecordError::InvalidTransition("encoder started before configure".into()));
        };

        let (tx, rx) = mpsc::sync_channel(QUEUE_DEPTH);
        let written = Arc::clone(&self.frames_written);
        let handle = thread::Builder::new()
            .name("y4m-encoder".into())
            .spawn(move || Self::write_loop(out, rx, written))
            .map_err(|e| RecordError::EncoderError(format!("failed to spawn encoder thread: {}", e)))?;

        surface.open(tx);
        self.writer = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecordError> {
        if let Some(ref surface) = self.surface {
            surface.close();
        }
        let Some(mut out) = self.join_writer()? else {
            return Err(RecordError::InvalidTransition("encoder stopped before start".into()));
        };

        out.flush()
            .and_then(|_| out.get_ref().sync_all())
            .map_err(|e| RecordError::StorageError(format!("failed to seal output: {}", e)))?;
        log::info!(
            "y4m stream sealed: {} frames -> {}",
            self.frames_written.load(Ordering::Acquire),
            self.output_path.as_deref().map(Path::display).map(|d| d.to_string()).unwrap_or_default()
        );
        Ok(())
    }

    fn release(&mut self) {
        if let Some(surface) = self.surface.take() {
            surface.close();
        }
        if let Err(e) = self.join_writer() {
            log::warn!("encoder writer failed during release: {}", e);
        }
        self.output = None;
    }

    fn frames_encoded(&self) -> u64 {
        self.frames_written.load(Ordering::Acquire)
    }
}
