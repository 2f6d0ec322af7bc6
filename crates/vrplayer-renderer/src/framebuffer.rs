use glow::HasContext;
use tracing::{debug, warn};
use vrplayer_core::{Eye, RenderError, Resolution};

/// MSAA sample count of every eye target.
pub const SAMPLES: i32 = 4;

// MARK: - EyeFramebuffer

/// Multisampled color+depth render target with a single-sample resolve
/// texture next to it.
///
/// Draw into it after [`bind_for_render`](Self::bind_for_render), then call
/// [`resolve`](Self::resolve) before anything samples [`texture`](Self::texture).
#[derive(Debug)]
pub struct EyeFramebuffer {
    size: Resolution,
    render_fbo: glow::Framebuffer,
    color: glow::Texture,
    depth: glow::Renderbuffer,
    resolve_fbo: glow::Framebuffer,
    resolved: glow::Texture,
}

impl EyeFramebuffer {
    pub fn create(gl: &glow::Context, size: Resolution) -> Result<Self, RenderError> {
        let size = size.at_least_one();
        let (w, h) = (size.width as i32, size.height as i32);
        let alloc = |what: &'static str| move |reason: String| RenderError::allocation(what, reason);

        let mut made = Rollback::default();
        let objects = unsafe {
            (|| -> Result<_, RenderError> {
                Ok((
                    made.track(gl.create_framebuffer(), GlObject::Framebuffer).map_err(alloc("framebuffer"))?,
                    made.track(gl.create_renderbuffer(), GlObject::Renderbuffer)
                        .map_err(alloc("depth renderbuffer"))?,
                    made.track(gl.create_texture(), GlObject::Texture).map_err(alloc("multisample texture"))?,
                    made.track(gl.create_framebuffer(), GlObject::Framebuffer)
                        .map_err(alloc("resolve framebuffer"))?,
                    made.track(gl.create_texture(), GlObject::Texture).map_err(alloc("resolve texture"))?,
                ))
            })()
        };
        let (render_fbo, depth, color, resolve_fbo, resolved) = match objects {
            Ok(objects) => objects,
            Err(e) => {
                warn!("Framebuffer[{}] allocation failed: {}", size, e);
                made.unwind(|object| unsafe { object.delete(gl) });
                return Err(e);
            }
        };
        let target = Self { size, render_fbo, color, depth, resolve_fbo, resolved };

        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(render_fbo));

            gl.bind_renderbuffer(glow::RENDERBUFFER, Some(depth));
            gl.renderbuffer_storage_multisample(glow::RENDERBUFFER, SAMPLES, glow::DEPTH_COMPONENT24, w, h);
            gl.framebuffer_renderbuffer(glow::FRAMEBUFFER, glow::DEPTH_ATTACHMENT, glow::RENDERBUFFER, Some(depth));

            gl.bind_texture(glow::TEXTURE_2D_MULTISAMPLE, Some(color));
            gl.tex_image_2d_multisample(glow::TEXTURE_2D_MULTISAMPLE, SAMPLES, glow::RGBA8 as i32, w, h, true);
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D_MULTISAMPLE,
                Some(color),
                0,
            );
            let render_status = gl.check_framebuffer_status(glow::FRAMEBUFFER);

            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(resolve_fbo));
            gl.bind_texture(glow::TEXTURE_2D, Some(resolved));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAX_LEVEL, 0);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                w,
                h,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                None,
            );
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(resolved),
                0,
            );
            let resolve_status = gl.check_framebuffer_status(glow::FRAMEBUFFER);

            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.bind_texture(glow::TEXTURE_2D_MULTISAMPLE, None);
            gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);

            for status in [render_status, resolve_status] {
                if status != glow::FRAMEBUFFER_COMPLETE {
                    warn!("Framebuffer[{}] incomplete: {:#x}", size, status);
                    target.destroy(gl);
                    return Err(RenderError::FramebufferIncomplete { status });
                }
            }
            debug!("Framebuffer[{}] created ({}x MSAA)", size, SAMPLES);
            Ok(target)
        }
    }

    pub fn size(&self) -> Resolution {
        self.size
    }

    /// Resolved single-sample color texture.
    pub fn texture(&self) -> glow::Texture {
        self.resolved
    }

    /// Raw name of the multisampled framebuffer, for renderers that take a
    /// plain FBO id.
    pub fn render_target_id(&self) -> u32 {
        self.render_fbo.0.get()
    }

    pub fn bind_for_render(&self, gl: &glow::Context) {
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.render_fbo));
            gl.viewport(0, 0, self.size.width as i32, self.size.height as i32);
        }
    }

    /// Blit the multisampled color into the resolve texture.
    pub fn resolve(&self, gl: &glow::Context) {
        let (w, h) = (self.size.width as i32, self.size.height as i32);
        unsafe {
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(self.render_fbo));
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(self.resolve_fbo));
            gl.blit_framebuffer(0, 0, w, h, 0, 0, w, h, glow::COLOR_BUFFER_BIT, glow::LINEAR);
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
        }
    }

    pub fn destroy(self, gl: &glow::Context) {
        unsafe {
            gl.delete_framebuffer(self.render_fbo);
            gl.delete_framebuffer(self.resolve_fbo);
            gl.delete_renderbuffer(self.depth);
            gl.delete_texture(self.color);
            gl.delete_texture(self.resolved);
        }
    }
}

// MARK: - Creation rollback

/// A GL object made while building a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlObject {
    Framebuffer(glow::Framebuffer),
    Renderbuffer(glow::Renderbuffer),
    Texture(glow::Texture),
}

impl GlObject {
    unsafe fn delete(self, gl: &glow::Context) {
        match self {
            Self::Framebuffer(fbo) => gl.delete_framebuffer(fbo),
            Self::Renderbuffer(rbo) => gl.delete_renderbuffer(rbo),
            Self::Texture(texture) => gl.delete_texture(texture),
        }
    }
}

/// Objects created so far by a constructor that may still fail.
#[derive(Debug, Default)]
struct Rollback {
    created: Vec<GlObject>,
}

impl Rollback {
    fn track<T: Copy>(&mut self, result: Result<T, String>, wrap: fn(T) -> GlObject) -> Result<T, String> {
        let object = result?;
        self.created.push(wrap(object));
        Ok(object)
    }

    /// Hand every tracked object to `delete`, newest first.
    fn unwind(self, mut delete: impl FnMut(GlObject)) {
        for object in self.created.into_iter().rev() {
            delete(object);
        }
    }
}

// MARK: - StereoFramebufferSet

/// One [`EyeFramebuffer`] per eye at the compositor's recommended size.
#[derive(Debug)]
pub struct StereoFramebufferSet {
    eyes: [EyeFramebuffer; 2],
}

impl StereoFramebufferSet {
    pub fn create(gl: &glow::Context, size: Resolution) -> Result<Self, RenderError> {
        let left = EyeFramebuffer::create(gl, size)?;
        let right = match EyeFramebuffer::create(gl, size) {
            Ok(right) => right,
            Err(e) => {
                left.destroy(gl);
                return Err(e);
            }
        };
        Ok(Self { eyes: [left, right] })
    }

    pub fn eye(&self, eye: Eye) -> &EyeFramebuffer {
        &self.eyes[eye.index()]
    }

    pub fn size(&self) -> Resolution {
        self.eyes[0].size()
    }

    /// Replace the set with one at `size`, releasing the current one first.
    pub fn recreate(self, gl: &glow::Context, size: Resolution) -> Result<Self, RenderError> {
        self.destroy(gl);
        Self::create(gl, size)
    }

    pub fn destroy(self, gl: &glow::Context) {
        let [left, right] = self.eyes;
        left.destroy(gl);
        right.destroy(gl);
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;

    fn id(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).expect("non-zero")
    }

    #[test]
    fn failed_allocation_unwinds_earlier_objects_newest_first() {
        let fbo = glow::NativeFramebuffer(id(1));
        let rbo = glow::NativeRenderbuffer(id(2));
        let texture = glow::NativeTexture(id(3));

        let mut made = Rollback::default();
        assert_eq!(made.track(Ok(fbo), GlObject::Framebuffer), Ok(fbo));
        assert_eq!(made.track(Ok(rbo), GlObject::Renderbuffer), Ok(rbo));
        assert_eq!(made.track(Ok(texture), GlObject::Texture), Ok(texture));
        assert!(made
            .track::<glow::Framebuffer>(Err("out of memory".into()), GlObject::Framebuffer)
            .is_err());

        let mut deleted = Vec::new();
        made.unwind(|object| deleted.push(object));
        assert_eq!(
            deleted,
            vec![GlObject::Texture(texture), GlObject::Renderbuffer(rbo), GlObject::Framebuffer(fbo)]
        );
    }

    #[test]
    fn nothing_to_unwind_when_first_allocation_fails() {
        let mut made = Rollback::default();
        assert!(made.track::<glow::Texture>(Err("no context".into()), GlObject::Texture).is_err());
        let mut deleted = 0;
        made.unwind(|_| deleted += 1);
        assert_eq!(deleted, 0);
    }
}
