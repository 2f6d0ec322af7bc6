//! vrplayer-input — keyboard and pointer plumbing between the desktop and
//! the player.
//!
//! ## 1. Companion window keys
//! [`companion_action`] maps keysyms pressed while the companion window has
//! focus to [`PlayerAction`]s.
//!
//! ## 2. Global hotkeys
//! [`HotkeyGrabs`] grabs Alt+F1 / Alt+Q / Alt+E on the root window so the
//! view can be reset and zoomed while another window has focus.
//! [`global_action`] decodes the resulting root key presses.
//!
//! ## 3. Pointer injection
//! [`PointerInjector`] warps the pointer and sends button events to the
//! captured window.

mod hotkeys;
mod inject;
mod keys;

pub use hotkeys::{global_action, grab_list, Hotkey, HotkeyGrabs, GLOBAL_HOTKEYS, LOCK_COMBINATIONS};
pub use inject::{button_event, to_pixels, PointerInjector};
pub use keys::{apply_zoom, companion_action, SEEK_STEP_SECONDS};

pub use vrplayer_core::{MouseButton, PlayerAction};
