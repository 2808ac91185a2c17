use std::sync::Arc;

use crate::models::error::RecordError;
use crate::models::frame::{CapturedFrame, PlaceholderImage};
use crate::traits::hardware_encoder::InputSurface;

/// Opaque shader program name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Opaque texture name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// Aliases the most recent capture frame; updated by `update_external_texture`.
    External,
    /// Ordinary 2D image texture.
    Image,
}

/// Low-level GPU API used by the render thread.
///
/// A device is created on the render thread and never leaves it, so it does
/// not need to be `Send`. All calls go through `GpuContext`, which asserts
/// thread ownership before forwarding.
pub trait GpuDevice {
    /// Bind the device's drawing surface to the encoder input surface.
    fn make_current(&mut self, surface: &Arc<dyn InputSurface>) -> Result<(), RecordError>;

    fn create_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramHandle, RecordError>;

    fn create_texture(&mut self, kind: TextureKind) -> Result<TextureHandle, RecordError>;

    fn upload_image(&mut self, texture: TextureHandle, image: &PlaceholderImage) -> Result<(), RecordError>;

    /// Latch `frame` into an external texture.
    fn update_external_texture(&mut self, texture: TextureHandle, frame: &CapturedFrame) -> Result<(), RecordError>;

    fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), RecordError>;

    fn clear(&mut self, color: [f32; 4]) -> Result<(), RecordError>;

    /// Draw a triangle-strip quad. `vertices` is interleaved `x, y, z, u, v`.
    fn draw_quad(
        &mut self,
        program: ProgramHandle,
        texture: TextureHandle,
        vertices: &[f32],
    ) -> Result<(), RecordError>;

    /// Submit the drawn frame to the bound surface.
    fn swap_buffers(&mut self, presentation_time_ns: u64) -> Result<(), RecordError>;

    fn delete_program(&mut self, program: ProgramHandle);

    fn delete_texture(&mut self, texture: TextureHandle);

    /// Destroy the context and unbind the surface.
    fn release(&mut self);
}
