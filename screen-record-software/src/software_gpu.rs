//! CPU rasterizer standing in for a GPU device.
//!
//! Keeps one RGBA framebuffer the size of the viewport. Programs are
//! "compiled" by checking the shader sources and remembering which sampler
//! the fragment stage uses; `draw_quad` samples the bound texture with
//! nearest-neighbour filtering over the quad's axis-aligned bounds.
//!
//! Presenting copies the framebuffer to the encoder surface the device was
//! made current on.

use std::collections::HashMap;
use std::sync::Arc;

use screen_record_core::models::error::RecordError;
use screen_record_core::models::frame::{rgba_len, CapturedFrame, PlaceholderImage, RenderedFrame};
use screen_record_core::traits::gpu_device::{GpuDevice, ProgramHandle, TextureHandle, TextureKind};
use screen_record_core::traits::hardware_encoder::InputSurface;

const FLOATS_PER_VERTEX: usize = 5;

struct Program {
    sampler: TextureKind,
}

struct Texture {
    kind: TextureKind,
    width: u32,
    height: u32,
    rgba: Option<Arc<[u8]>>,
}

/// Headless implementation of [`GpuDevice`].
pub struct SoftwareGpu {
    surface: Option<Arc<dyn InputSurface>>,
    framebuffer: Vec<u8>,
    viewport: (u32, u32),
    programs: HashMap<u32, Program>,
    textures: HashMap<u32, Texture>,
    next_name: u32,
}

impl SoftwareGpu {
    pub fn new() -> Self {
        Self {
            surface: None,
            framebuffer: Vec::new(),
            viewport: (0, 0),
            programs: HashMap::new(),
            textures: HashMap::new(),
            next_name: 1,
        }
    }

    /// Current framebuffer contents, row-major from the top row.
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn allocate_name(&mut self) -> u32 {
        let name = self.next_name;
        self.next_name += 1;
        name
    }

    fn texture_mut(&mut self, texture: TextureHandle, kind: TextureKind) -> Result<&mut Texture, RecordError> {
        let found = self
            .textures
            .get_mut(&texture.0)
            .ok_or_else(|| RecordError::GpuError(format!("unknown texture {}", texture.0)))?;
        if found.kind != kind {
            return Err(RecordError::GpuError(format!(
                "texture {} is {:?}, expected {:?}",
                texture.0, found.kind, kind
            )));
        }
        Ok(found)
    }
}

impl Default for SoftwareGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for SoftwareGpu {
    fn make_current(&mut self, surface: &Arc<dyn InputSurface>) -> Result<(), RecordError> {
        if surface.width() == 0 || surface.height() == 0 {
            return Err(RecordError::GpuError("cannot bind a zero-sized surface".into()));
        }
        self.surface = Some(Arc::clone(surface));
        Ok(())
    }

    fn create_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramHandle, RecordError> {
        for (stage, source) in [("vertex", vertex_src), ("fragment", fragment_src)] {
            if !source.contains("void main") {
                return Err(RecordError::GpuError(format!("{} shader has no entry point", stage)));
            }
        }
        let sampler = if fragment_src.contains("samplerExternalOES") {
            TextureKind::External
        } else if fragment_src.contains("sampler2D") {
            TextureKind::Image
        } else {
            return Err(RecordError::GpuError("fragment shader declares no sampler".into()));
        };

        let name = self.allocate_name();
        self.programs.insert(name, Program { sampler });
        log::trace!("program {} compiled for {:?} textures", name, sampler);
        Ok(ProgramHandle(name))
    }

    fn create_texture(&mut self, kind: TextureKind) -> Result<TextureHandle, RecordError> {
        let name = self.allocate_name();
        self.textures.insert(
            name,
            Texture {
                kind,
                width: 0,
                height: 0,
                rgba: None,
            },
        );
        Ok(TextureHandle(name))
    }

    fn upload_image(&mut self, texture: TextureHandle, image: &PlaceholderImage) -> Result<(), RecordError> {
        image.validate().map_err(RecordError::GpuError)?;
        let target = self.texture_mut(texture, TextureKind::Image)?;
        target.width = image.width;
        target.height = image.height;
        target.rgba = Some(Arc::from(image.rgba.as_slice()));
        Ok(())
    }

    fn update_external_texture(&mut self, texture: TextureHandle, frame: &CapturedFrame) -> Result<(), RecordError> {
        if !frame.is_well_formed() {
            return Err(RecordError::GpuError(format!(
                "cannot latch {}x{} frame with {} bytes",
                frame.width,
                frame.height,
                frame.rgba.len()
            )));
        }
        let target = self.texture_mut(texture, TextureKind::External)?;
        target.width = frame.width;
        target.height = frame.height;
        target.rgba = Some(Arc::clone(&frame.rgba));
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), RecordError> {
        if width == 0 || height == 0 {
            return Err(RecordError::GpuError("viewport must not be empty".into()));
        }
        if self.viewport != (width, height) {
            self.viewport = (width, height);
            self.framebuffer = vec![0; rgba_len(width, height)];
        }
        Ok(())
    }

    fn clear(&mut self, color: [f32; 4]) -> Result<(), RecordError> {
        let pixel = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        for chunk in self.framebuffer.chunks_exact_mut(4) {
            chunk.copy_from_slice(&pixel);
        }
        Ok(())
    }

    fn draw_quad(
        &mut self,
        program: ProgramHandle,
        texture: TextureHandle,
        vertices: &[f32],
    ) -> Result<(), RecordError> {
        let sampler = self
            .programs
            .get(&program.0)
            .map(|p| p.sampler)
            .ok_or_else(|| RecordError::GpuError(format!("unknown program {}", program.0)))?;
        let source = self.texture_mut(texture, sampler)?;
        let Some(texels) = source.rgba.clone() else {
            // Nothing latched yet: the cleared framebuffer stays as is.
            return Ok(());
        };
        let (tex_w, tex_h) = (source.width as usize, source.height as usize);
        if tex_w == 0 || tex_h == 0 || texels.len() < tex_w * tex_h * 4 {
            return Err(RecordError::GpuError(format!(
                "texture {} has no usable {}x{} content",
                texture.0, tex_w, tex_h
            )));
        }

        let quad = QuadBounds::from_vertices(vertices)?;
        let (fb_w, fb_h) = (self.viewport.0 as usize, self.viewport.1 as usize);
        if fb_w == 0 || fb_h == 0 {
            return Err(RecordError::GpuError("draw before viewport was set".into()));
        }

        // NDC to pixel space: x right, y up; framebuffer row 0 is the top.
        let left = (quad.x_min + 1.0) * 0.5 * fb_w as f32;
        let right = (quad.x_max + 1.0) * 0.5 * fb_w as f32;
        let top = (1.0 - quad.y_max) * 0.5 * fb_h as f32;
        let bottom = (1.0 - quad.y_min) * 0.5 * fb_h as f32;

        let col_start = left.max(0.0).floor() as usize;
        let col_end = (right.ceil().max(0.0) as usize).min(fb_w);
        let row_start = top.max(0.0).floor() as usize;
        let row_end = (bottom.ceil().max(0.0) as usize).min(fb_h);

        for row in row_start..row_end {
            let cy = row as f32 + 0.5;
            if cy < top || cy > bottom {
                continue;
            }
            let t = (cy - top) / (bottom - top);
            let v = quad.v_top + t * (quad.v_bottom - quad.v_top);
            let ty = ((v * tex_h as f32).floor() as isize).clamp(0, tex_h as isize - 1) as usize;

            for col in col_start..col_end {
                let cx = col as f32 + 0.5;
                if cx < left || cx > right {
                    continue;
                }
                let s = (cx - left) / (right - left);
                let u = quad.u_left + s * (quad.u_right - quad.u_left);
                let tx = ((u * tex_w as f32).floor() as isize).clamp(0, tex_w as isize - 1) as usize;

                let src = (ty * tex_w + tx) * 4;
                let dst = (row * fb_w + col) * 4;
                self.framebuffer[dst..dst + 4].copy_from_slice(&texels[src..src + 4]);
            }
        }
        Ok(())
    }

    fn swap_buffers(&mut self, presentation_time_ns: u64) -> Result<(), RecordError> {
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| RecordError::GpuError("no surface is current".into()))?;
        let (width, height) = self.viewport;
        surface.queue_frame(RenderedFrame {
            width,
            height,
            rgba: self.framebuffer.clone(),
            presentation_time_ns,
        })
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn release(&mut self) {
        if !self.programs.is_empty() || !self.textures.is_empty() {
            log::warn!(
                "releasing device with {} programs and {} textures still alive",
                self.programs.len(),
                self.textures.len()
            );
        }
        self.programs.clear();
        self.textures.clear();
        self.framebuffer = Vec::new();
        self.viewport = (0, 0);
        self.surface = None;
    }
}

/// Screen-space extent and texture coordinates of an axis-aligned quad.
struct QuadBounds {
    x_min: f32,
    x_max: f32,
    y_min: f32,
    y_max: f32,
    u_left: f32,
    u_right: f32,
    v_top: f32,
    v_bottom: f32,
}

impl QuadBounds {
    fn from_vertices(vertices: &[f32]) -> Result<Self, RecordError> {
        if vertices.len() < 4 * FLOATS_PER_VERTEX || vertices.len() % FLOATS_PER_VERTEX != 0 {
            return Err(RecordError::GpuError(format!(
                "quad needs at least 4 vertices of {} floats, got {} floats",
                FLOATS_PER_VERTEX,
                vertices.len()
            )));
        }
        let mut bounds = Self {
            x_min: f32::MAX,
            x_max: f32::MIN,
            y_min: f32::MAX,
            y_max: f32::MIN,
            u_left: 0.0,
            u_right: 0.0,
            v_top: 0.0,
            v_bottom: 0.0,
        };
        for vertex in vertices.chunks_exact(FLOATS_PER_VERTEX) {
            let (x, y, u, v) = (vertex[0], vertex[1], vertex[3], vertex[4]);
            if x < bounds.x_min {
                bounds.x_min = x;
                bounds.u_left = u;
            }
            if x > bounds.x_max {
                bounds.x_max = x;
                bounds.u_right = u;
            }
            if y < bounds.y_min {
                bounds.y_min = y;
                bounds.v_bottom = v;
            }
            if y > bounds.y_max {
                bounds.y_max = y;
                bounds.v_top = v;
            }
        }
        if bounds.x_max <= bounds.x_min || bounds.y_max <= bounds.y_min {
            return Err(RecordError::GpuError("degenerate quad".into()));
        }
        Ok(bounds)
    }
}
