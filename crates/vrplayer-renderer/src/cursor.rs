use glow::HasContext;
use tracing::debug;
use vrplayer_core::{CursorImage, RenderError, Resolution};

/// GPU copy of the current cursor shape.
///
/// The texture object lives as long as the sprite; each [`upload`](Self::upload)
/// replaces its contents. Until the first upload it holds a single
/// transparent texel so sampling stays defined.
pub struct CursorSprite {
    texture: glow::Texture,
    size: Resolution,
    hotspot: (u32, u32),
}

impl CursorSprite {
    pub fn new(gl: &glow::Context) -> Result<Self, RenderError> {
        let texture = unsafe { gl.create_texture() }
            .map_err(|reason| RenderError::allocation("cursor texture", reason))?;
        let sprite = Self { texture, size: Resolution::new(0, 0), hotspot: (0, 0) };
        sprite.write(gl, Resolution::new(1, 1), &[0, 0, 0, 0]);
        Ok(sprite)
    }

    pub fn upload(&mut self, gl: &glow::Context, image: &CursorImage) {
        let size = image.size();
        if size.is_empty() {
            return;
        }
        self.write(gl, size, &image.pixels);
        self.size = size;
        self.hotspot = (image.hotspot_x, image.hotspot_y);
        debug!("Cursor sprite updated: {} hotspot {:?}", size, self.hotspot);
    }

    fn write(&self, gl: &glow::Context, size: Resolution, rgba: &[u8]) {
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(self.texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_BORDER as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_BORDER as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                size.width as i32,
                size.height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                Some(rgba),
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    pub fn texture(&self) -> glow::Texture {
        self.texture
    }

    /// Size of the last uploaded shape, zero before the first upload.
    pub fn size(&self) -> Resolution {
        self.size
    }

    pub fn hotspot(&self) -> (u32, u32) {
        self.hotspot
    }

    pub fn destroy(self, gl: &glow::Context) {
        unsafe { gl.delete_texture(self.texture) };
    }
}
