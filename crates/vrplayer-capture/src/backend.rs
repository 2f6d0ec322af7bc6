use std::os::raw::c_int;
use std::rc::Rc;
use std::sync::Arc;

use glow::HasContext;
use tracing::{debug, warn};
use vrplayer_core::{CaptureError, WindowId};
use x11::{glx, xlib};

use crate::display::{WindowGeometry, X11Display};
use crate::ffi;

/// Window-system and GPU operations a [`crate::CaptureSurface`] sequences.
///
/// Implemented by [`GlxPixmapBackend`] for real X11 windows and by recording
/// fakes in tests.
pub trait CaptureBackend {
    type Texture: Copy + PartialEq + std::fmt::Debug;
    type Config: Copy;

    /// Fails when the server cannot redirect windows offscreen.
    fn check_supported(&mut self) -> Result<(), CaptureError>;
    fn redirect(&mut self, window: WindowId);
    fn unredirect(&mut self, window: WindowId);
    fn geometry(&mut self, window: WindowId) -> Result<WindowGeometry, CaptureError>;
    fn choose_config(&mut self, depth: i32) -> Result<Self::Config, CaptureError>;
    fn create_texture(&mut self) -> Result<Self::Texture, CaptureError>;
    fn delete_texture(&mut self, texture: Self::Texture);
    fn name_pixmap(&mut self, window: WindowId) -> Result<u64, CaptureError>;
    fn free_pixmap(&mut self, pixmap: u64);
    /// Create a GL-bindable pixmap for `pixmap` and attach it to `texture`.
    fn bind_pixmap(
        &mut self,
        pixmap: u64,
        config: Self::Config,
        texture: Self::Texture,
    ) -> Result<u64, CaptureError>;
    /// Detach and destroy a pixmap created by [`Self::bind_pixmap`].
    fn release_pixmap(&mut self, bound: u64);
    /// Apply sampling state to the freshly bound texture.
    fn configure_texture(&mut self, texture: Self::Texture);
}

// ── GLX ───────────────────────────────────────────────────────────────────────

/// Texture-from-pixmap on the main GLX context.
///
/// Every call must happen while that context is current on this thread.
pub struct GlxPixmapBackend {
    display: Arc<X11Display>,
    gl: Rc<glow::Context>,
    bind_tex_image: ffi::GlxBindTexImageExt,
    release_tex_image: ffi::GlxReleaseTexImageExt,
    max_anisotropy: f32,
}

impl GlxPixmapBackend {
    pub fn new(display: Arc<X11Display>, gl: Rc<glow::Context>) -> Result<Self, CaptureError> {
        let missing = || CaptureError::ExtensionMissing { name: "GLX_EXT_texture_from_pixmap".into() };
        let bind = load_proc(c"glXBindTexImageEXT").ok_or_else(missing)?;
        let release = load_proc(c"glXReleaseTexImageEXT").ok_or_else(missing)?;

        // SAFETY: both symbols come from GLX_EXT_texture_from_pixmap and have
        // exactly these signatures.
        let (bind_tex_image, release_tex_image) = unsafe {
            (
                std::mem::transmute::<unsafe extern "C" fn(), ffi::GlxBindTexImageExt>(bind),
                std::mem::transmute::<unsafe extern "C" fn(), ffi::GlxReleaseTexImageExt>(release),
            )
        };

        let max_anisotropy = unsafe { gl.get_parameter_f32(ffi::MAX_TEXTURE_MAX_ANISOTROPY) };
        debug!("GLX pixmap backend ready (max anisotropy {})", max_anisotropy);
        Ok(Self { display, gl, bind_tex_image, release_tex_image, max_anisotropy })
    }

    fn dpy(&self) -> *mut xlib::Display {
        self.display.raw()
    }
}

fn load_proc(name: &std::ffi::CStr) -> Option<unsafe extern "C" fn()> {
    unsafe { glx::glXGetProcAddress(name.as_ptr().cast()) }
}

impl CaptureBackend for GlxPixmapBackend {
    type Texture = glow::Texture;
    type Config = glx::GLXFBConfig;

    fn check_supported(&mut self) -> Result<(), CaptureError> {
        self.display.check_composite()
    }

    fn redirect(&mut self, window: WindowId) {
        unsafe { ffi::XCompositeRedirectWindow(self.dpy(), window.raw(), ffi::CompositeRedirectAutomatic) };
    }

    fn unredirect(&mut self, window: WindowId) {
        unsafe { ffi::XCompositeUnredirectWindow(self.dpy(), window.raw(), ffi::CompositeRedirectAutomatic) };
    }

    fn geometry(&mut self, window: WindowId) -> Result<WindowGeometry, CaptureError> {
        self.display.window_geometry(window)
    }

    fn choose_config(&mut self, depth: i32) -> Result<Self::Config, CaptureError> {
        let attrs: [c_int; 13] = [
            ffi::GLX_BIND_TO_TEXTURE_RGBA_EXT,
            1,
            glx::GLX_DRAWABLE_TYPE,
            glx::GLX_PIXMAP_BIT,
            ffi::GLX_BIND_TO_TEXTURE_TARGETS_EXT,
            ffi::GLX_TEXTURE_2D_BIT_EXT,
            glx::GLX_DOUBLEBUFFER,
            0,
            glx::GLX_BUFFER_SIZE,
            32,
            glx::GLX_ALPHA_SIZE,
            8,
            0,
        ];
        let mut count: c_int = 0;
        unsafe {
            let configs = glx::glXChooseFBConfig(self.dpy(), self.display.screen(), attrs.as_ptr(), &mut count);
            if configs.is_null() || count <= 0 {
                return Err(CaptureError::NoFramebufferConfig);
            }
            let list = std::slice::from_raw_parts(configs, count as usize);
            let matching = list.iter().copied().find(|&config| {
                let visual = glx::glXGetVisualFromFBConfig(self.dpy(), config);
                if visual.is_null() {
                    return false;
                }
                let visual_depth = (*visual).depth;
                xlib::XFree(visual.cast());
                visual_depth == depth
            });
            let chosen = matching.unwrap_or(list[0]);
            xlib::XFree(configs.cast());
            if matching.is_none() {
                debug!("No framebuffer config at depth {}, using first of {}", depth, count);
            }
            Ok(chosen)
        }
    }

    fn create_texture(&mut self) -> Result<Self::Texture, CaptureError> {
        unsafe { self.gl.create_texture() }.map_err(|reason| CaptureError::BindFailed { reason })
    }

    fn delete_texture(&mut self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) };
    }

    fn name_pixmap(&mut self, window: WindowId) -> Result<u64, CaptureError> {
        let pixmap = unsafe { ffi::XCompositeNameWindowPixmap(self.dpy(), window.raw()) };
        if let Some(code) = self.display.sync_errors() {
            warn!("Capture[{}] naming pixmap raised X error {}", window, code);
            if pixmap != 0 {
                self.free_pixmap(pixmap);
            }
            return Err(CaptureError::PixmapUnavailable { window: window.raw() });
        }
        if pixmap == 0 {
            return Err(CaptureError::PixmapUnavailable { window: window.raw() });
        }
        Ok(pixmap)
    }

    fn free_pixmap(&mut self, pixmap: u64) {
        unsafe { xlib::XFreePixmap(self.dpy(), pixmap) };
    }

    fn bind_pixmap(
        &mut self,
        pixmap: u64,
        config: Self::Config,
        texture: Self::Texture,
    ) -> Result<u64, CaptureError> {
        let attrs: [c_int; 5] = [
            ffi::GLX_TEXTURE_TARGET_EXT,
            ffi::GLX_TEXTURE_2D_EXT,
            ffi::GLX_TEXTURE_FORMAT_EXT,
            ffi::GLX_TEXTURE_FORMAT_RGB_EXT,
            0,
        ];
        unsafe {
            let bound = glx::glXCreatePixmap(self.dpy(), config, pixmap, attrs.as_ptr());
            if bound == 0 {
                return Err(CaptureError::BindFailed { reason: "glXCreatePixmap returned None".into() });
            }
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            (self.bind_tex_image)(self.dpy(), bound, ffi::GLX_FRONT_EXT, std::ptr::null());
            self.gl.bind_texture(glow::TEXTURE_2D, None);

            if let Some(code) = self.display.sync_errors() {
                self.release_pixmap(bound);
                return Err(CaptureError::BindFailed { reason: format!("X error {code}") });
            }
            Ok(bound)
        }
    }

    fn release_pixmap(&mut self, bound: u64) {
        unsafe {
            (self.release_tex_image)(self.dpy(), bound, ffi::GLX_FRONT_EXT);
            glx::glXDestroyPixmap(self.dpy(), bound);
        }
    }

    fn configure_texture(&mut self, texture: Self::Texture) {
        let gl = &self.gl;
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            if self.max_anisotropy > 1.0 {
                gl.tex_parameter_f32(glow::TEXTURE_2D, ffi::TEXTURE_MAX_ANISOTROPY, self.max_anisotropy);
            }
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }
}
