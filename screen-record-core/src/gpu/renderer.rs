use crate::gpu::context::GpuContext;
use crate::models::error::RecordError;
use crate::models::frame::PlaceholderImage;
use crate::traits::gpu_device::{GpuDevice, ProgramHandle, TextureHandle, TextureKind};

pub const VERTEX_SHADER: &str = "\
uniform mat4 uMVPMatrix;
attribute vec4 aPosition;
attribute vec2 aTextureCoord;
varying vec2 vTextureCoord;
void main() {
    gl_Position = uMVPMatrix * aPosition;
    vTextureCoord = aTextureCoord;
}
";

pub const EXTERNAL_FRAGMENT_SHADER: &str = "\
#extension GL_OES_EGL_image_external : require
precision mediump float;
varying vec2 vTextureCoord;
uniform samplerExternalOES sTexture;
void main() {
    gl_FragColor = texture2D(sTexture, vTextureCoord);
}
";

pub const IMAGE_FRAGMENT_SHADER: &str = "\
precision mediump float;
varying vec2 vTextureCoord;
uniform sampler2D sTexture;
void main() {
    gl_FragColor = texture2D(sTexture, vTextureCoord);
}
";

/// Full-frame triangle strip, interleaved `x, y, z, u, v`.
/// Texture `v` grows downwards so row 0 of an image lands at the top.
pub const FULL_FRAME_QUAD: [f32; 20] = [
    -1.0, -1.0, 0.0, 0.0, 1.0, //
    1.0, -1.0, 0.0, 1.0, 1.0, //
    -1.0, 1.0, 0.0, 0.0, 0.0, //
    1.0, 1.0, 0.0, 1.0, 0.0, //
];

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Fixed draw pipeline sized to the output resolution.
///
/// Holds only GPU object names, so it can be handed between the session and
/// render threads; every operation still requires the render-thread `GpuContext`.
#[derive(Debug)]
pub struct TextureRenderer {
    width: u32,
    height: u32,
    external_program: ProgramHandle,
    image_program: ProgramHandle,
    external_texture: TextureHandle,
    placeholder_texture: TextureHandle,
}

impl TextureRenderer {
    /// Compile both programs and create the external and placeholder textures.
    ///
    /// On failure every object created so far is deleted again.
    pub fn create_pipeline<D: GpuDevice>(
        ctx: &mut GpuContext<D>,
        width: u32,
        height: u32,
        placeholder: &PlaceholderImage,
    ) -> Result<Self, RecordError> {
        if width == 0 || height == 0 {
            return Err(RecordError::ConfigurationFailed(format!(
                "invalid pipeline size {}x{}",
                width, height
            )));
        }

        let mut programs = Vec::with_capacity(2);
        let mut textures = Vec::with_capacity(2);
        match Self::build(ctx, placeholder, &mut programs, &mut textures) {
            Ok((external_program, image_program, external_texture, placeholder_texture)) => {
                log::debug!("render pipeline created at {}x{}", width, height);
                Ok(Self {
                    width,
                    height,
                    external_program,
                    image_program,
                    external_texture,
                    placeholder_texture,
                })
            }
            Err(e) => {
                for texture in textures.into_iter().rev() {
                    ctx.delete_texture(texture);
                }
                for program in programs.into_iter().rev() {
                    ctx.delete_program(program);
                }
                Err(e)
            }
        }
    }

    fn build<D: GpuDevice>(
        ctx: &mut GpuContext<D>,
        placeholder: &PlaceholderImage,
        programs: &mut Vec<ProgramHandle>,
        textures: &mut Vec<TextureHandle>,
    ) -> Result<(ProgramHandle, ProgramHandle, TextureHandle, TextureHandle), RecordError> {
        let external_program = ctx.create_program(VERTEX_SHADER, EXTERNAL_FRAGMENT_SHADER)?;
        programs.push(external_program);
        let image_program = ctx.create_program(VERTEX_SHADER, IMAGE_FRAGMENT_SHADER)?;
        programs.push(image_program);

        let external_texture = ctx.create_texture(TextureKind::External)?;
        textures.push(external_texture);
        let placeholder_texture = ctx.create_texture(TextureKind::Image)?;
        textures.push(placeholder_texture);
        ctx.upload_image(placeholder_texture, placeholder)?;

        Ok((external_program, image_program, external_texture, placeholder_texture))
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Texture the frame source latches captured frames into.
    pub fn external_texture(&self) -> TextureHandle {
        self.external_texture
    }

    /// Draw the full frame from the captured texture, or from the placeholder.
    pub fn draw<D: GpuDevice>(&self, ctx: &mut GpuContext<D>, use_placeholder: bool) -> Result<(), RecordError> {
        let (program, texture) = if use_placeholder {
            (self.image_program, self.placeholder_texture)
        } else {
            (self.external_program, self.external_texture)
        };
        ctx.clear(CLEAR_COLOR)?;
        ctx.draw_quad(program, texture, &FULL_FRAME_QUAD)
    }

    pub fn destroy<D: GpuDevice>(self, ctx: &mut GpuContext<D>) {
        ctx.delete_texture(self.placeholder_texture);
        ctx.delete_texture(self.external_texture);
        ctx.delete_program(self.image_program);
        ctx.delete_program(self.external_program);
    }
}
