use std::os::raw::{c_int, c_uint};
use std::sync::Arc;

use tracing::{debug, info};
use vrplayer_capture::X11Display;
use vrplayer_core::PlayerAction;
use x11::{keysym, xlib};

/// A key combination grabbed on the root window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hotkey {
    pub keysym: u32,
    pub modifiers: c_uint,
    pub action: PlayerAction,
}

pub const GLOBAL_HOTKEYS: [Hotkey; 3] = [
    Hotkey { keysym: keysym::XK_F1, modifiers: xlib::Mod1Mask, action: PlayerAction::ResetRotation },
    Hotkey { keysym: keysym::XK_q, modifiers: xlib::Mod1Mask, action: PlayerAction::ZoomIn },
    Hotkey { keysym: keysym::XK_e, modifiers: xlib::Mod1Mask, action: PlayerAction::ZoomOut },
];

/// NumLock and CapsLock states a grab must be registered under to fire
/// regardless of lock state.
pub const LOCK_COMBINATIONS: [c_uint; 4] = [
    0,
    xlib::LockMask,
    xlib::Mod2Mask,
    xlib::Mod2Mask | xlib::LockMask,
];

const LOCK_BITS: c_uint = xlib::LockMask | xlib::Mod2Mask;

/// Match a root-window key press against [`GLOBAL_HOTKEYS`], ignoring lock
/// modifiers.
pub fn global_action(keysym: u64, state: c_uint) -> Option<PlayerAction> {
    let state = state & !LOCK_BITS;
    GLOBAL_HOTKEYS
        .iter()
        .find(|hk| hk.keysym as u64 == keysym && hk.modifiers == state)
        .map(|hk| hk.action)
}

/// Every `(keysym, modifiers)` pair registered with the server.
pub fn grab_list() -> impl Iterator<Item = (u32, c_uint)> {
    GLOBAL_HOTKEYS.iter().flat_map(|hk| {
        LOCK_COMBINATIONS
            .iter()
            .map(move |lock| (hk.keysym, hk.modifiers | lock))
    })
}

/// Holds the root-window grabs for its lifetime.
pub struct HotkeyGrabs {
    display: Arc<X11Display>,
    grabbed: Vec<(c_int, c_uint)>,
}

impl HotkeyGrabs {
    pub fn grab(display: Arc<X11Display>) -> Self {
        let dpy = display.raw();
        let root = display.root().raw();
        let mut grabbed = Vec::new();
        for (sym, modifiers) in grab_list() {
            let keycode = unsafe { xlib::XKeysymToKeycode(dpy, sym as xlib::KeySym) } as c_int;
            if keycode == 0 {
                debug!("Hotkey keysym {:#x} has no keycode, skipping", sym);
                continue;
            }
            unsafe {
                xlib::XGrabKey(
                    dpy,
                    keycode,
                    modifiers,
                    root,
                    xlib::True,
                    xlib::GrabModeAsync,
                    xlib::GrabModeAsync,
                );
            }
            grabbed.push((keycode, modifiers));
        }
        display.flush();
        info!("Registered {} global hotkey grabs", grabbed.len());
        Self { display, grabbed }
    }
}

impl Drop for HotkeyGrabs {
    fn drop(&mut self) {
        let dpy = self.display.raw();
        let root = self.display.root().raw();
        for &(keycode, modifiers) in &self.grabbed {
            unsafe { xlib::XUngrabKey(dpy, keycode, modifiers, root) };
        }
        self.display.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_hotkey_is_grabbed_under_each_lock_state() {
        let grabs: Vec<_> = grab_list().collect();
        assert_eq!(grabs.len(), GLOBAL_HOTKEYS.len() * LOCK_COMBINATIONS.len());
        assert!(grabs.contains(&(keysym::XK_F1, xlib::Mod1Mask)));
        assert!(grabs.contains(&(keysym::XK_q, xlib::Mod1Mask | xlib::Mod2Mask | xlib::LockMask)));
    }

    #[test]
    fn lock_modifiers_are_ignored_when_matching() {
        let alt_numlock = xlib::Mod1Mask | xlib::Mod2Mask;
        assert_eq!(
            global_action(keysym::XK_F1 as u64, alt_numlock),
            Some(PlayerAction::ResetRotation)
        );
        assert_eq!(
            global_action(keysym::XK_e as u64, xlib::Mod1Mask | xlib::LockMask),
            Some(PlayerAction::ZoomOut)
        );
    }

    #[test]
    fn other_modifiers_do_not_match() {
        assert_eq!(global_action(keysym::XK_q as u64, 0), None);
        assert_eq!(global_action(keysym::XK_q as u64, xlib::Mod1Mask | xlib::ControlMask), None);
    }
}
