//! GLX device: companion window, main context and the decode context.
//!
//! ```text
//!   main thread                    decode thread
//!   ───────────                    ─────────────
//!   make_current(Main) ─┐      ┌─ make_current(Decode)
//!                       ├─lock─┤        (switch call only)
//!   ... frame ...       │      │   ... render video ...
//!   drop(token) ────────┘      └─ drop(token)
//! ```
//!
//! The two contexts share objects, so textures rendered on the decode
//! context are sampled directly by the main one.

use std::ffi::{c_void, CString};
use std::marker::PhantomData;
use std::os::raw::c_int;
use std::ptr;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};
use vrplayer_capture::X11Display;
use vrplayer_core::{RenderError, Resolution, WindowId};
use x11::{glx, xlib};

pub const COMPANION_TITLE: &str = "vr-video-player";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Renders eyes and the companion window.
    Main,
    /// Owned by the video decode thread.
    Decode,
}

/// Raw handles an OpenXR OpenGL/Xlib session is created from.
#[derive(Debug, Clone, Copy)]
pub struct XlibHandles {
    pub display: *mut xlib::Display,
    pub visual_id: u32,
    pub fb_config: glx::GLXFBConfig,
    pub drawable: glx::GLXDrawable,
    pub context: glx::GLXContext,
}

// MARK: - GlDevice

pub struct GlDevice {
    display: Arc<X11Display>,
    fb_config: glx::GLXFBConfig,
    visual_id: u64,
    colormap: xlib::Colormap,
    window: xlib::Window,
    main_context: glx::GLXContext,
    decode_context: glx::GLXContext,
    pbuffer: glx::GLXPbuffer,
    switch: Mutex<()>,
}

// SAFETY: GLX handles are plain identifiers on a thread-safe connection;
// making a context current goes through `switch`.
unsafe impl Send for GlDevice {}
unsafe impl Sync for GlDevice {}

impl GlDevice {
    /// Create the companion window and both contexts on `display`.
    pub fn new(display: Arc<X11Display>) -> Result<Arc<Self>, RenderError> {
        let dpy = display.raw();
        let attrs: [c_int; 23] = [
            glx::GLX_X_RENDERABLE,
            1,
            glx::GLX_DRAWABLE_TYPE,
            glx::GLX_WINDOW_BIT | glx::GLX_PBUFFER_BIT,
            glx::GLX_RENDER_TYPE,
            glx::GLX_RGBA_BIT,
            glx::GLX_X_VISUAL_TYPE,
            glx::GLX_TRUE_COLOR,
            glx::GLX_RED_SIZE,
            8,
            glx::GLX_GREEN_SIZE,
            8,
            glx::GLX_BLUE_SIZE,
            8,
            glx::GLX_ALPHA_SIZE,
            8,
            glx::GLX_DEPTH_SIZE,
            24,
            glx::GLX_STENCIL_SIZE,
            8,
            glx::GLX_DOUBLEBUFFER,
            1,
            0,
        ];

        unsafe {
            let mut count = 0;
            let configs = glx::glXChooseFBConfig(dpy, display.screen(), attrs.as_ptr(), &mut count);
            if configs.is_null() || count == 0 {
                return Err(RenderError::ContextUnavailable {
                    reason: "no GLX framebuffer config for window and pbuffer".into(),
                });
            }
            let fb_config = *configs;
            xlib::XFree(configs.cast());

            let visual = glx::glXGetVisualFromFBConfig(dpy, fb_config);
            if visual.is_null() {
                return Err(RenderError::ContextUnavailable { reason: "glXGetVisualFromFBConfig failed".into() });
            }
            let visual_id = (*visual).visualid;
            let root = display.root().raw();
            let colormap = xlib::XCreateColormap(dpy, root, (*visual).visual, xlib::AllocNone);

            let mut swa: xlib::XSetWindowAttributes = std::mem::zeroed();
            swa.colormap = colormap;
            swa.event_mask = xlib::KeyPressMask | xlib::KeyReleaseMask | xlib::StructureNotifyMask;
            let size = Resolution::COMPANION;
            let window = xlib::XCreateWindow(
                dpy,
                root,
                0,
                0,
                size.width,
                size.height,
                0,
                (*visual).depth,
                xlib::InputOutput as u32,
                (*visual).visual,
                xlib::CWColormap | xlib::CWEventMask,
                &mut swa,
            );
            xlib::XFree(visual.cast());

            if let Ok(title) = CString::new(COMPANION_TITLE) {
                xlib::XStoreName(dpy, window, title.as_ptr());
            }
            display.set_close_protocol(WindowId(window));
            xlib::XMapWindow(dpy, window);

            let main_context = glx::glXCreateNewContext(dpy, fb_config, glx::GLX_RGBA_TYPE, ptr::null_mut(), 1);
            if main_context.is_null() {
                xlib::XDestroyWindow(dpy, window);
                xlib::XFreeColormap(dpy, colormap);
                return Err(RenderError::ContextUnavailable { reason: "glXCreateNewContext failed".into() });
            }
            let decode_context = glx::glXCreateNewContext(dpy, fb_config, glx::GLX_RGBA_TYPE, main_context, 1);
            if decode_context.is_null() {
                glx::glXDestroyContext(dpy, main_context);
                xlib::XDestroyWindow(dpy, window);
                xlib::XFreeColormap(dpy, colormap);
                return Err(RenderError::ContextUnavailable {
                    reason: "failed to create shared decode context".into(),
                });
            }

            let pbuffer_attrs: [c_int; 5] = [glx::GLX_PBUFFER_WIDTH, 1, glx::GLX_PBUFFER_HEIGHT, 1, 0];
            let pbuffer = match decode_drawable(glx::glXCreatePbuffer(dpy, fb_config, pbuffer_attrs.as_ptr())) {
                Ok(pbuffer) => pbuffer,
                Err(e) => {
                    glx::glXDestroyContext(dpy, decode_context);
                    glx::glXDestroyContext(dpy, main_context);
                    xlib::XDestroyWindow(dpy, window);
                    xlib::XFreeColormap(dpy, colormap);
                    return Err(e);
                }
            };
            display.flush();

            info!("GlDevice ready: companion window {:#x} ({})", window, size);
            Ok(Arc::new(Self {
                display,
                fb_config,
                visual_id,
                colormap,
                window,
                main_context,
                decode_context,
                pbuffer,
                switch: Mutex::new(()),
            }))
        }
    }

    pub fn display(&self) -> &Arc<X11Display> {
        &self.display
    }

    pub fn companion_window(&self) -> WindowId {
        WindowId(self.window)
    }

    /// Make `kind` current on the calling thread.
    pub fn make_current(&self, kind: ContextKind) -> Result<ContextToken<'_>, RenderError> {
        let (drawable, context) = self.target(kind);
        let ok = {
            let _switch = self.lock_switch();
            unsafe { glx::glXMakeContextCurrent(self.display.raw(), drawable, drawable, context) != 0 }
        };
        if !ok {
            return Err(RenderError::ContextUnavailable {
                reason: format!("glXMakeContextCurrent({kind:?}) failed"),
            });
        }
        Ok(ContextToken { device: self, kind, _not_send: PhantomData })
    }

    pub fn xlib_handles(&self) -> XlibHandles {
        XlibHandles {
            display: self.display.raw(),
            visual_id: self.visual_id as u32,
            fb_config: self.fb_config,
            drawable: self.window,
            context: self.main_context,
        }
    }

    fn target(&self, kind: ContextKind) -> (glx::GLXDrawable, glx::GLXContext) {
        match kind {
            ContextKind::Main => (self.window, self.main_context),
            ContextKind::Decode => (self.pbuffer, self.decode_context),
        }
    }

    fn lock_switch(&self) -> MutexGuard<'_, ()> {
        self.switch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The decode context's 1×1 pbuffer, or the error for a server that refused it.
fn decode_drawable(pbuffer: glx::GLXPbuffer) -> Result<glx::GLXPbuffer, RenderError> {
    if pbuffer == 0 {
        return Err(RenderError::ContextUnavailable { reason: "glXCreatePbuffer failed".into() });
    }
    Ok(pbuffer)
}

impl Drop for GlDevice {
    fn drop(&mut self) {
        let dpy = self.display.raw();
        unsafe {
            glx::glXMakeContextCurrent(dpy, 0, 0, ptr::null_mut());
            glx::glXDestroyPbuffer(dpy, self.pbuffer);
            glx::glXDestroyContext(dpy, self.decode_context);
            glx::glXDestroyContext(dpy, self.main_context);
            xlib::XDestroyWindow(dpy, self.window);
            xlib::XFreeColormap(dpy, self.colormap);
        }
        self.display.flush();
        debug!("GlDevice released");
    }
}

/// GL entry point by name, null when the driver does not export it.
pub fn gl_proc_address(name: &str) -> *const c_void {
    CString::new(name).map_or(ptr::null(), |name| unsafe {
        glx::glXGetProcAddress(name.as_ptr().cast()).map_or(ptr::null(), |f| f as *const c_void)
    })
}

// MARK: - ContextToken

/// Proof that a context of the device is current on this thread.
///
/// Not `Send`: a context is current per thread. Dropping the token releases
/// the context.
pub struct ContextToken<'a> {
    device: &'a GlDevice,
    kind: ContextKind,
    _not_send: PhantomData<*const ()>,
}

impl ContextToken<'_> {
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Load GL entry points for the current context.
    pub fn load_gl(&self) -> Rc<glow::Context> {
        Rc::new(unsafe { glow::Context::from_loader_function(gl_proc_address) })
    }

    /// Present the companion window. Only meaningful on the main context.
    pub fn swap_buffers(&self) {
        if self.kind == ContextKind::Main {
            unsafe { glx::glXSwapBuffers(self.device.display.raw(), self.device.window) };
        }
    }
}

impl Drop for ContextToken<'_> {
    fn drop(&mut self) {
        let _switch = self.device.lock_switch();
        unsafe { glx::glXMakeContextCurrent(self.device.display.raw(), 0, 0, ptr::null_mut()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrplayer_core::ErrorClass;

    #[test]
    fn missing_pbuffer_is_a_resource_failure() {
        let err = decode_drawable(0).expect_err("null pbuffer");
        assert_eq!(err.class(), ErrorClass::ResourceAcquisitionFailure);
        assert_eq!(decode_drawable(0x2a00001), Ok(0x2a00001));
    }
}
