//! Dedicated render thread owning the GPU context.
//!
//! GPU contexts are bound to the thread that made them current, so every GPU
//! call of a session is funneled through one thread with one FIFO task queue.
//! Callers submit closures and wait for their results; the context itself
//! never leaves the render thread.

use std::marker::PhantomData;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::models::error::RecordError;
use crate::models::frame::{CapturedFrame, PlaceholderImage};
use crate::traits::gpu_device::{GpuDevice, ProgramHandle, TextureHandle, TextureKind};
use crate::traits::hardware_encoder::InputSurface;

type Task<D> = Box<dyn FnOnce(&mut GpuContext<D>) + Send>;

enum Command<D: GpuDevice> {
    Run(Task<D>),
    Shutdown,
}

/// Owns the render thread and its task queue.
pub struct GpuContextManager<D: GpuDevice + 'static> {
    commands: mpsc::Sender<Command<D>>,
    handle: Option<thread::JoinHandle<()>>,
    render_thread: ThreadId,
}

impl<D: GpuDevice + 'static> GpuContextManager<D> {
    /// Spawn the render thread, build the device on it and bind it to `surface`.
    ///
    /// Returns once the context is current, or with the creation error after
    /// the thread has exited.
    pub fn create<F>(factory: F, surface: Arc<dyn InputSurface>) -> Result<Self, RecordError>
    where
        F: FnOnce() -> Result<D, RecordError> + Send + 'static,
    {
        let (commands, queue) = mpsc::channel::<Command<D>>();
        let (init_tx, init_rx) = mpsc::channel::<Result<ThreadId, RecordError>>();

        let handle = thread::Builder::new()
            .name("gpu-render".into())
            .spawn(move || {
                let mut context = match GpuContext::create(factory, surface) {
                    Ok(context) => context,
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(thread::current().id()));

                for command in queue {
                    match command {
                        Command::Run(task) => task(&mut context),
                        Command::Shutdown => break,
                    }
                }
                context.release();
                log::debug!("render thread exiting");
            })
            .map_err(|e| RecordError::GpuError(format!("failed to spawn render thread: {}", e)))?;

        match init_rx.recv() {
            Ok(Ok(render_thread)) => Ok(Self {
                commands,
                handle: Some(handle),
                render_thread,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(RecordError::RenderThreadTerminated)
            }
        }
    }

    /// Run `f` on the render thread and wait for its result.
    ///
    /// # Panics
    /// When called from the render thread itself, which would deadlock.
    pub fn run<R, F>(&self, f: F) -> Result<R, RecordError>
    where
        F: FnOnce(&mut GpuContext<D>) -> R + Send + 'static,
        R: Send + 'static,
    {
        assert_ne!(
            thread::current().id(),
            self.render_thread,
            "GpuContextManager::run called from the render thread"
        );
        self.spawn(f).join()
    }

    /// Queue `f` on the render thread without waiting.
    pub fn spawn<R, F>(&self, f: F) -> GpuTask<R>
    where
        F: FnOnce(&mut GpuContext<D>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let task: Task<D> = Box::new(move |context| {
            let _ = tx.send(f(context));
        });
        // On failure the task (and its sender) is dropped, so `join` reports termination.
        let _ = self.commands.send(Command::Run(task));
        GpuTask { result: rx }
    }

    pub fn render_thread(&self) -> ThreadId {
        self.render_thread
    }

    /// Release the context on the render thread and join it.
    ///
    /// Tasks queued before this call still run first.
    pub fn shutdown(mut self) -> Result<(), RecordError> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<(), RecordError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let _ = self.commands.send(Command::Shutdown);
        handle.join().map_err(|_| RecordError::RenderThreadTerminated)
    }
}

impl<D: GpuDevice + 'static> Drop for GpuContextManager<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_inner() {
            log::warn!("render thread did not shut down cleanly: {}", e);
        }
    }
}

/// Pending result of a task queued with [`GpuContextManager::spawn`].
pub struct GpuTask<R> {
    result: mpsc::Receiver<R>,
}

impl<R> GpuTask<R> {
    /// Block until the task has run.
    pub fn join(self) -> Result<R, RecordError> {
        self.result.recv().map_err(|_| RecordError::RenderThreadTerminated)
    }
}

/// GPU context pinned to the render thread.
///
/// Every call asserts that it runs on the thread that created the context.
/// The type is neither `Send` nor `Sync`.
pub struct GpuContext<D: GpuDevice> {
    device: D,
    surface: Arc<dyn InputSurface>,
    owner: ThreadId,
    released: bool,
    _pinned: PhantomData<*const ()>,
}

impl<D: GpuDevice> GpuContext<D> {
    fn create<F>(factory: F, surface: Arc<dyn InputSurface>) -> Result<Self, RecordError>
    where
        F: FnOnce() -> Result<D, RecordError>,
    {
        let mut device = factory()?;
        if let Err(e) = device.make_current(&surface) {
            device.release();
            return Err(e);
        }
        Ok(Self {
            device,
            surface,
            owner: thread::current().id(),
            released: false,
            _pinned: PhantomData,
        })
    }

    fn assert_render_thread(&self) {
        assert_eq!(
            thread::current().id(),
            self.owner,
            "GPU call issued off the render thread"
        );
    }

    /// Output size of the bound encoder surface.
    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface.width(), self.surface.height())
    }

    /// Make the context current on the encoder surface and set the viewport.
    pub fn bind_for_drawing(&mut self, width: u32, height: u32) -> Result<(), RecordError> {
        self.assert_render_thread();
        self.device.make_current(&self.surface)?;
        self.device.set_viewport(width, height)
    }

    /// Submit the drawn frame to the encoder surface.
    pub fn present(&mut self, presentation_time_ns: u64) -> Result<(), RecordError> {
        self.assert_render_thread();
        self.device.swap_buffers(presentation_time_ns)
    }

    pub fn create_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramHandle, RecordError> {
        self.assert_render_thread();
        self.device.create_program(vertex_src, fragment_src)
    }

    pub fn create_texture(&mut self, kind: TextureKind) -> Result<TextureHandle, RecordError> {
        self.assert_render_thread();
        self.device.create_texture(kind)
    }

    pub fn upload_image(&mut self, texture: TextureHandle, image: &PlaceholderImage) -> Result<(), RecordError> {
        self.assert_render_thread();
        self.device.upload_image(texture, image)
    }

    pub fn update_external_texture(&mut self, texture: TextureHandle, frame: &CapturedFrame) -> Result<(), RecordError> {
        self.assert_render_thread();
        self.device.update_external_texture(texture, frame)
    }

    pub fn clear(&mut self, color: [f32; 4]) -> Result<(), RecordError> {
        self.assert_render_thread();
        self.device.clear(color)
    }

    pub fn draw_quad(
        &mut self,
        program: ProgramHandle,
        texture: TextureHandle,
        vertices: &[f32],
    ) -> Result<(), RecordError> {
        self.assert_render_thread();
        self.device.draw_quad(program, texture, vertices)
    }

    pub fn delete_program(&mut self, program: ProgramHandle) {
        self.assert_render_thread();
        self.device.delete_program(program);
    }

    pub fn delete_texture(&mut self, texture: TextureHandle) {
        self.assert_render_thread();
        self.device.delete_texture(texture);
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.assert_render_thread();
        self.device.release();
        self.released = true;
    }
}

impl<D: GpuDevice> Drop for GpuContext<D> {
    fn drop(&mut self) {
        // Reached without `release` only when a task panicked on the render thread.
        if !self.released && thread::current().id() == self.owner {
            self.device.release();
            self.released = true;
        }
    }
}
