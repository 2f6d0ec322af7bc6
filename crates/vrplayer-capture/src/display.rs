//! Shared X11 connection.
//!
//! One `X11Display` is opened per process and shared by the capture surface,
//! the GLX contexts and input injection. `XInitThreads` is called before the
//! connection is opened so the decode thread may use it too.

use std::ffi::CString;
use std::os::raw::{c_int, c_uchar, c_uint, c_ulong};
use std::ptr;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::{debug, info, warn};
use vrplayer_core::{CaptureError, CursorImage, Resolution, WindowId};
use x11::xlib;

use crate::ffi;

/// Last X protocol error code seen by [`on_x_error`], 0 when none.
static LAST_X_ERROR: AtomicU8 = AtomicU8::new(0);

unsafe extern "C" fn on_x_error(_display: *mut xlib::Display, event: *mut xlib::XErrorEvent) -> c_int {
    if let Some(event) = event.as_ref() {
        debug!(
            "X error {} (request {}.{}, resource {:#x})",
            event.error_code, event.request_code, event.minor_code, event.resourceid
        );
        LAST_X_ERROR.store(event.error_code, Ordering::SeqCst);
    }
    0
}

// ── WindowGeometry ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub width: u32,
    pub height: u32,
    pub border: u32,
    pub depth: i32,
    pub viewable: bool,
}

impl WindowGeometry {
    pub fn size(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Size of the composite pixmap, which includes the border on each side.
    pub fn pixmap_size(&self) -> Resolution {
        Resolution::new(self.width + self.border * 2, self.height + self.border * 2)
    }
}

// ── PointerQuery ──────────────────────────────────────────────────────────────

/// Pointer location as reported by `XQueryPointer`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerQuery {
    pub root: xlib::Window,
    /// Child of the queried window under the pointer, or 0.
    pub child: xlib::Window,
    pub root_x: c_int,
    pub root_y: c_int,
    pub x: c_int,
    pub y: c_int,
    /// Modifier and button mask.
    pub state: c_uint,
}

// ── WindowEvent ───────────────────────────────────────────────────────────────

/// X events translated into what the player reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    Configure { window: WindowId, size: Resolution },
    Visibility { window: WindowId, visible: bool },
    Key { window: WindowId, keysym: u64, modifiers: u32, pressed: bool },
    Destroyed { window: WindowId },
    /// The window manager asked `window` to close.
    CloseRequested { window: WindowId },
    CursorChanged,
    ActiveWindowChanged,
}

// ── X11Display ────────────────────────────────────────────────────────────────

pub struct X11Display {
    raw: *mut xlib::Display,
    root: xlib::Window,
    screen: c_int,
    net_active_window: xlib::Atom,
    wm_delete_window: xlib::Atom,
    xfixes_event_base: Option<c_int>,
}

// SAFETY: XInitThreads runs before XOpenDisplay, so Xlib locks the
// connection internally for every call.
unsafe impl Send for X11Display {}
unsafe impl Sync for X11Display {}

impl X11Display {
    /// Open the display named by `name`, or `$DISPLAY` when `None`.
    pub fn open(name: Option<&str>) -> Result<Self, CaptureError> {
        let label = name
            .map(str::to_owned)
            .or_else(|| std::env::var("DISPLAY").ok())
            .unwrap_or_default();
        let c_name = name
            .map(|n| CString::new(n).map_err(|_| CaptureError::DisplayUnavailable { name: label.clone() }))
            .transpose()?;

        unsafe {
            xlib::XInitThreads();
            let raw = xlib::XOpenDisplay(c_name.as_ref().map_or(ptr::null(), |n| n.as_ptr()));
            if raw.is_null() {
                return Err(CaptureError::DisplayUnavailable { name: label });
            }
            xlib::XSetErrorHandler(Some(on_x_error));

            let root = xlib::XDefaultRootWindow(raw);
            let screen = xlib::XDefaultScreen(raw);
            let net_active_window = xlib::XInternAtom(raw, c"_NET_ACTIVE_WINDOW".as_ptr(), xlib::False);
            let wm_delete_window = xlib::XInternAtom(raw, c"WM_DELETE_WINDOW".as_ptr(), xlib::False);

            let (mut event_base, mut error_base) = (0, 0);
            let xfixes_event_base =
                if ffi::XFixesQueryExtension(raw, &mut event_base, &mut error_base) != 0 {
                    Some(event_base)
                } else {
                    warn!("XFixes unavailable, cursor shape will not be captured");
                    None
                };

            info!("Display[{}] opened (screen {})", label, screen);
            Ok(Self {
                raw,
                root,
                screen,
                net_active_window,
                wm_delete_window,
                xfixes_event_base,
            })
        }
    }

    pub fn raw(&self) -> *mut xlib::Display {
        self.raw
    }

    pub fn root(&self) -> WindowId {
        WindowId(self.root)
    }

    pub fn screen(&self) -> c_int {
        self.screen
    }

    /// Ask the window manager to deliver close requests for `window` as
    /// [`WindowEvent::CloseRequested`] instead of killing the connection.
    pub fn set_close_protocol(&self, window: WindowId) {
        let mut atom = self.wm_delete_window;
        unsafe { xlib::XSetWMProtocols(self.raw, window.raw(), &mut atom, 1) };
    }

    /// Fails with `CaptureUnsupported` below XComposite 0.2.
    pub fn check_composite(&self) -> Result<(), CaptureError> {
        let (mut event_base, mut error_base) = (0, 0);
        let (mut major, mut minor) = (0, 0);
        unsafe {
            if ffi::XCompositeQueryExtension(self.raw, &mut event_base, &mut error_base) == 0 {
                return Err(CaptureError::ExtensionMissing { name: "Composite".into() });
            }
            ffi::XCompositeQueryVersion(self.raw, &mut major, &mut minor);
        }
        if major > 0 || minor >= 2 {
            debug!("XComposite {}.{}", major, minor);
            Ok(())
        } else {
            Err(CaptureError::CaptureUnsupported { major, minor })
        }
    }

    pub fn window_geometry(&self, window: WindowId) -> Result<WindowGeometry, CaptureError> {
        let mut attrs: xlib::XWindowAttributes = unsafe { std::mem::zeroed() };
        let status = unsafe { xlib::XGetWindowAttributes(self.raw, window.raw(), &mut attrs) };
        if status == 0 {
            return Err(CaptureError::WindowGone { window: window.raw() });
        }
        Ok(WindowGeometry {
            width: attrs.width.max(0) as u32,
            height: attrs.height.max(0) as u32,
            border: attrs.border_width.max(0) as u32,
            depth: attrs.depth,
            viewable: attrs.map_state == xlib::IsViewable,
        })
    }

    /// Subscribe to structure, visibility, key and cursor-shape changes of `window`.
    pub fn watch_window(&self, window: WindowId) {
        let mask = xlib::StructureNotifyMask
            | xlib::VisibilityChangeMask
            | xlib::KeyPressMask
            | xlib::KeyReleaseMask;
        unsafe {
            xlib::XSelectInput(self.raw, window.raw(), mask);
            if self.xfixes_event_base.is_some() {
                ffi::XFixesSelectCursorInput(self.raw, window.raw(), ffi::XFixesDisplayCursorNotifyMask);
            }
        }
    }

    /// Subscribe to root property changes so focus switches are reported.
    pub fn watch_focus(&self) {
        unsafe {
            xlib::XSelectInput(self.raw, self.root, xlib::PropertyChangeMask);
        }
    }

    /// Window named by `_NET_ACTIVE_WINDOW` on the root, if any.
    pub fn focused_window(&self) -> Option<WindowId> {
        let mut actual_type: xlib::Atom = 0;
        let mut actual_format: c_int = 0;
        let mut items: c_ulong = 0;
        let mut bytes_after: c_ulong = 0;
        let mut data: *mut c_uchar = ptr::null_mut();

        let status = unsafe {
            xlib::XGetWindowProperty(
                self.raw,
                self.root,
                self.net_active_window,
                0,
                1,
                xlib::False,
                xlib::XA_WINDOW,
                &mut actual_type,
                &mut actual_format,
                &mut items,
                &mut bytes_after,
                &mut data,
            )
        };
        if status != xlib::Success as c_int || data.is_null() {
            return None;
        }
        let window = if items >= 1 && actual_format == 32 {
            unsafe { *(data as *const xlib::Window) }
        } else {
            0
        };
        unsafe { xlib::XFree(data.cast()) };
        (window != 0).then_some(WindowId(window))
    }

    /// Pointer location and modifier/button state relative to `window`.
    /// `None` when the pointer is on another screen.
    pub fn query_pointer(&self, window: WindowId) -> Option<PointerQuery> {
        let mut query = PointerQuery::default();
        let same_screen = unsafe {
            xlib::XQueryPointer(
                self.raw,
                window.raw(),
                &mut query.root,
                &mut query.child,
                &mut query.root_x,
                &mut query.root_y,
                &mut query.x,
                &mut query.y,
                &mut query.state,
            )
        };
        (same_screen != 0).then_some(query)
    }

    /// Pointer position relative to `window`'s origin.
    pub fn pointer_position(&self, window: WindowId) -> Option<(i32, i32)> {
        self.query_pointer(window).map(|q| (q.x, q.y))
    }

    /// Current cursor shape, converted to straight-alpha RGBA.
    pub fn cursor_image(&self) -> Option<CursorImage> {
        self.xfixes_event_base?;
        unsafe {
            let image = ffi::XFixesGetCursorImage(self.raw);
            if image.is_null() {
                return None;
            }
            let img = &*image;
            let count = img.width as usize * img.height as usize;
            let argb: Vec<u32> = if img.pixels.is_null() {
                Vec::new()
            } else {
                std::slice::from_raw_parts(img.pixels, count)
                    .iter()
                    .map(|&p| p as u32)
                    .collect()
            };
            let cursor = CursorImage::from_premultiplied_argb(
                img.width as u32,
                img.height as u32,
                img.xhot as u32,
                img.yhot as u32,
                &argb,
            );
            xlib::XFree(image.cast());
            Some(cursor)
        }
    }

    /// Drain every queued event without blocking.
    pub fn poll_events(&self) -> Vec<WindowEvent> {
        let mut out = Vec::new();
        unsafe {
            while xlib::XPending(self.raw) > 0 {
                let mut event: xlib::XEvent = std::mem::zeroed();
                xlib::XNextEvent(self.raw, &mut event);
                if let Some(translated) = self.translate(&event) {
                    out.push(translated);
                }
            }
        }
        out
    }

    fn translate(&self, event: &xlib::XEvent) -> Option<WindowEvent> {
        let kind = event.get_type();
        match kind {
            xlib::ConfigureNotify => {
                let e = xlib::XConfigureEvent::from(*event);
                Some(WindowEvent::Configure {
                    window: WindowId(e.window),
                    size: Resolution::new(e.width.max(0) as u32, e.height.max(0) as u32),
                })
            }
            xlib::VisibilityNotify => {
                let e = xlib::XVisibilityEvent::from(*event);
                Some(WindowEvent::Visibility {
                    window: WindowId(e.window),
                    visible: e.state != xlib::VisibilityFullyObscured,
                })
            }
            xlib::KeyPress | xlib::KeyRelease => {
                let mut e = xlib::XKeyEvent::from(*event);
                let keysym = unsafe { xlib::XLookupKeysym(&mut e, 0) };
                Some(WindowEvent::Key {
                    window: WindowId(e.window),
                    keysym: keysym as u64,
                    modifiers: e.state,
                    pressed: kind == xlib::KeyPress,
                })
            }
            xlib::DestroyNotify => {
                let e = xlib::XDestroyWindowEvent::from(*event);
                Some(WindowEvent::Destroyed { window: WindowId(e.window) })
            }
            xlib::ClientMessage => {
                let e = xlib::XClientMessageEvent::from(*event);
                (e.data.get_long(0) as xlib::Atom == self.wm_delete_window)
                    .then_some(WindowEvent::CloseRequested { window: WindowId(e.window) })
            }
            xlib::PropertyNotify => {
                let e = xlib::XPropertyEvent::from(*event);
                (e.atom == self.net_active_window).then_some(WindowEvent::ActiveWindowChanged)
            }
            other => match self.xfixes_event_base {
                Some(base) if other == base + ffi::XFixesCursorNotify => Some(WindowEvent::CursorChanged),
                _ => None,
            },
        }
    }

    /// Round-trip to the server and report the first X error raised since
    /// the previous call.
    pub fn sync_errors(&self) -> Option<u8> {
        unsafe { xlib::XSync(self.raw, xlib::False) };
        match LAST_X_ERROR.swap(0, Ordering::SeqCst) {
            0 => None,
            code => Some(code),
        }
    }

    pub fn flush(&self) {
        unsafe { xlib::XFlush(self.raw) };
    }
}

impl Drop for X11Display {
    fn drop(&mut self) {
        unsafe { xlib::XCloseDisplay(self.raw) };
        debug!("Display closed");
    }
}
