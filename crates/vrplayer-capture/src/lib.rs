//! vrplayer-capture — live X11 window contents as a GL texture.
//!
//! # Pipeline
//!
//! ```text
//! X window ──XCompositeRedirectWindow──► offscreen backing pixmap
//!                                               │
//!                             XCompositeNameWindowPixmap
//!                                               │
//!                                   glXCreatePixmap + glXBindTexImageEXT
//!                                               │
//!                                          GL_TEXTURE_2D ──► renderer
//! ```
//!
//! The binding is torn down and rebuilt whenever the window is resized or
//! remapped. [`ResizeDebouncer`] collapses event bursts so that happens once
//! per settled size.

mod backend;
mod debounce;
mod display;
mod ffi;
mod surface;

pub use backend::{CaptureBackend, GlxPixmapBackend};
pub use debounce::{ResizeDebouncer, RESIZE_SETTLE};
pub use display::{PointerQuery, WindowEvent, WindowGeometry, X11Display};
pub use surface::CaptureSurface;
