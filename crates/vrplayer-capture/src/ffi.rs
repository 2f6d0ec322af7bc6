//! Raw bindings the `x11` crate does not ship: XComposite, XFixes and the
//! GLX_EXT_texture_from_pixmap tokens.

#![allow(non_snake_case, non_upper_case_globals, dead_code)]

use std::os::raw::{c_char, c_int, c_short, c_ulong, c_ushort};

use x11::glx::GLXDrawable;
use x11::xlib::{Atom, Bool, Display, Pixmap, Status, Time, Window};

// ── XComposite ────────────────────────────────────────────────────────────────

pub const CompositeRedirectAutomatic: c_int = 0;

#[link(name = "Xcomposite")]
extern "C" {
    pub fn XCompositeQueryExtension(
        dpy: *mut Display,
        event_base: *mut c_int,
        error_base: *mut c_int,
    ) -> Bool;
    pub fn XCompositeQueryVersion(
        dpy: *mut Display,
        major: *mut c_int,
        minor: *mut c_int,
    ) -> Status;
    pub fn XCompositeRedirectWindow(dpy: *mut Display, window: Window, update: c_int);
    pub fn XCompositeUnredirectWindow(dpy: *mut Display, window: Window, update: c_int);
    pub fn XCompositeNameWindowPixmap(dpy: *mut Display, window: Window) -> Pixmap;
}

// ── XFixes ────────────────────────────────────────────────────────────────────

pub const XFixesDisplayCursorNotifyMask: c_ulong = 1;
pub const XFixesCursorNotify: c_int = 1;

#[repr(C)]
pub struct XFixesCursorImage {
    pub x: c_short,
    pub y: c_short,
    pub width: c_ushort,
    pub height: c_ushort,
    pub xhot: c_ushort,
    pub yhot: c_ushort,
    pub cursor_serial: c_ulong,
    /// One premultiplied ARGB pixel per `unsigned long`.
    pub pixels: *mut c_ulong,
    pub atom: Atom,
    pub name: *const c_char,
}

#[repr(C)]
pub struct XFixesCursorNotifyEvent {
    pub type_: c_int,
    pub serial: c_ulong,
    pub send_event: Bool,
    pub display: *mut Display,
    pub window: Window,
    pub subtype: c_int,
    pub cursor_serial: c_ulong,
    pub timestamp: Time,
    pub cursor_name: Atom,
}

#[link(name = "Xfixes")]
extern "C" {
    pub fn XFixesQueryExtension(
        dpy: *mut Display,
        event_base: *mut c_int,
        error_base: *mut c_int,
    ) -> Bool;
    pub fn XFixesSelectCursorInput(dpy: *mut Display, window: Window, event_mask: c_ulong);
    pub fn XFixesGetCursorImage(dpy: *mut Display) -> *mut XFixesCursorImage;
}

// ── GLX_EXT_texture_from_pixmap ──────────────────────────────────────────────

pub const GLX_BIND_TO_TEXTURE_RGBA_EXT: c_int = 0x20D1;
pub const GLX_BIND_TO_TEXTURE_TARGETS_EXT: c_int = 0x20D3;
pub const GLX_TEXTURE_2D_BIT_EXT: c_int = 0x0000_0002;
pub const GLX_TEXTURE_TARGET_EXT: c_int = 0x20D6;
pub const GLX_TEXTURE_2D_EXT: c_int = 0x20DC;
pub const GLX_TEXTURE_FORMAT_EXT: c_int = 0x20D5;
pub const GLX_TEXTURE_FORMAT_RGB_EXT: c_int = 0x20D9;
pub const GLX_FRONT_EXT: c_int = 0x20DE;

pub type GlxBindTexImageExt =
    unsafe extern "C" fn(dpy: *mut Display, drawable: GLXDrawable, buffer: c_int, attribs: *const c_int);
pub type GlxReleaseTexImageExt =
    unsafe extern "C" fn(dpy: *mut Display, drawable: GLXDrawable, buffer: c_int);

// ── Anisotropic filtering ────────────────────────────────────────────────────

pub const TEXTURE_MAX_ANISOTROPY: u32 = 0x84FE;
pub const MAX_TEXTURE_MAX_ANISOTROPY: u32 = 0x84FF;
