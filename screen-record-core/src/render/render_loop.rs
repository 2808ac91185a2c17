use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::capture::frame_source::FrameSource;
use crate::gpu::context::{GpuContext, GpuContextManager, GpuTask};
use crate::gpu::renderer::TextureRenderer;
use crate::models::error::RecordError;
use crate::models::recording_result::RenderDiagnostics;
use crate::traits::gpu_device::GpuDevice;

/// Cancels a render loop by closing its frame source.
///
/// Clonable and usable from any thread, including capture callbacks.
#[derive(Clone)]
pub struct CancelToken {
    source: Arc<FrameSource>,
}

impl CancelToken {
    pub fn new(source: Arc<FrameSource>) -> Self {
        Self { source }
    }

    pub fn cancel(&self) {
        self.source.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.source.is_closed()
    }
}

/// Steady-state wait → latch → bind → draw → present cycle.
///
/// Runs as a single long task on the render thread and occupies it until
/// cancelled. A failing cycle is logged and skipped; only cancellation ends
/// the loop.
pub struct RenderLoop;

impl RenderLoop {
    pub fn start<D: GpuDevice + 'static>(
        gpu: &GpuContextManager<D>,
        source: Arc<FrameSource>,
        renderer: TextureRenderer,
        draw_placeholder: Arc<AtomicBool>,
        diagnostics: Arc<Mutex<RenderDiagnostics>>,
    ) -> RenderLoopHandle {
        let token = CancelToken::new(Arc::clone(&source));
        let task = gpu.spawn(move |ctx| Self::run(ctx, &source, renderer, &draw_placeholder, &diagnostics));
        RenderLoopHandle { token, task }
    }

    fn run<D: GpuDevice>(
        ctx: &mut GpuContext<D>,
        source: &FrameSource,
        renderer: TextureRenderer,
        draw_placeholder: &AtomicBool,
        diagnostics: &Mutex<RenderDiagnostics>,
    ) -> TextureRenderer {
        log::debug!("render loop started");
        let clock = Instant::now();

        while source.await_next_frame() {
            let use_placeholder = draw_placeholder.load(Ordering::Acquire);
            let outcome = Self::draw_cycle(ctx, source, &renderer, use_placeholder, &clock);

            let mut d = diagnostics.lock();
            d.frames_signaled += 1;
            match outcome {
                Ok(()) => {
                    d.frames_drawn += 1;
                    if use_placeholder {
                        d.placeholder_frames += 1;
                    }
                }
                Err(e) => {
                    d.failed_cycles += 1;
                    drop(d);
                    log::warn!("draw cycle failed, skipping frame: {}", e);
                }
            }
        }

        log::debug!(
            "render loop cancelled after {} frames",
            diagnostics.lock().frames_drawn
        );
        renderer
    }

    fn draw_cycle<D: GpuDevice>(
        ctx: &mut GpuContext<D>,
        source: &FrameSource,
        renderer: &TextureRenderer,
        use_placeholder: bool,
        clock: &Instant,
    ) -> Result<(), RecordError> {
        let (width, height) = renderer.size();
        source.consume_into_texture(ctx, renderer.external_texture())?;
        ctx.bind_for_drawing(width, height)?;
        renderer.draw(ctx, use_placeholder)?;
        ctx.present(clock.elapsed().as_nanos() as u64)
    }
}

/// Handle to a running render loop.
pub struct RenderLoopHandle {
    token: CancelToken,
    task: GpuTask<TextureRenderer>,
}

impl RenderLoopHandle {
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Wait until the loop exits; it only exits once cancelled.
    ///
    /// Returns the renderer so its GPU objects can be destroyed.
    pub fn join(self) -> Result<TextureRenderer, RecordError> {
        self.task.join()
    }

    /// Cancel the loop and wait until it no longer submits frames.
    pub fn cancel_and_join(self) -> Result<TextureRenderer, RecordError> {
        self.token.cancel();
        self.join()
    }
}
