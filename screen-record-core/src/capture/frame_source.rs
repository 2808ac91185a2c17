use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::gpu::context::GpuContext;
use crate::models::error::RecordError;
use crate::models::frame::CapturedFrame;
use crate::traits::capture_provider::FrameCallback;
use crate::traits::gpu_device::{GpuDevice, TextureHandle};

#[derive(Default)]
struct Slot {
    latest: Option<CapturedFrame>,
    available: bool,
    closed: bool,
    signaled: u64,
    coalesced: u64,
}

/// Single-slot handoff between the capture provider and the render loop.
///
/// The provider's callback thread stores the newest frame and raises the
/// frame-available flag; the render thread waits for the flag and latches the
/// frame into the external texture. Only the latest frame is kept: a frame
/// that is superseded before the render thread gets to it is dropped.
///
/// Closing wins over a pending frame, so a closed source never blocks.
#[derive(Default)]
pub struct FrameSource {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl FrameSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Callback to hand to the capture provider.
    pub fn attach(self: &Arc<Self>) -> FrameCallback {
        let source = Arc::clone(self);
        Arc::new(move |frame| source.signal(frame))
    }

    /// Store `frame` as the latest one and wake the render loop.
    pub fn signal(&self, frame: CapturedFrame) {
        if !frame.is_well_formed() {
            log::warn!(
                "dropping malformed {}x{} frame ({} bytes)",
                frame.width,
                frame.height,
                frame.rgba.len()
            );
            return;
        }

        let mut slot = self.slot.lock();
        if slot.closed {
            log::trace!("frame delivered after close; dropped");
            return;
        }
        if slot.latest.is_some() {
            slot.coalesced += 1;
        }
        slot.latest = Some(frame);
        slot.available = true;
        slot.signaled += 1;
        drop(slot);
        self.ready.notify_one();
    }

    /// Block until a frame is available (`true`) or the source is closed (`false`).
    pub fn await_next_frame(&self) -> bool {
        let mut slot = self.slot.lock();
        loop {
            if slot.closed {
                return false;
            }
            if slot.available {
                return true;
            }
            self.ready.wait(&mut slot);
        }
    }

    /// Latch the latest frame into `texture` and clear the available flag.
    ///
    /// Returns `false` when there was no new frame; the texture then keeps
    /// its previous content and drawing it again is harmless.
    pub fn consume_into_texture<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        texture: TextureHandle,
    ) -> Result<bool, RecordError> {
        let frame = {
            let mut slot = self.slot.lock();
            slot.available = false;
            slot.latest.take()
        };
        match frame {
            Some(frame) => {
                ctx.update_external_texture(texture, &frame)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop accepting frames and release any waiter. Idempotent.
    pub fn close(&self) {
        let mut slot = self.slot.lock();
        if slot.closed {
            return;
        }
        slot.closed = true;
        slot.latest = None;
        drop(slot);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    /// Frames accepted from the provider so far.
    pub fn frames_signaled(&self) -> u64 {
        self.slot.lock().signaled
    }

    /// Frames replaced by a newer one before they were consumed.
    pub fn frames_coalesced(&self) -> u64 {
        self.slot.lock().coalesced
    }
}
