use std::sync::Arc;

use tracing::trace;
use vrplayer_capture::{PointerQuery, X11Display};
use vrplayer_core::{MouseButton, Resolution, WindowId};
use x11::xlib;

/// Pixel position for a normalised point inside a window of `size`.
pub fn to_pixels(x: f32, y: f32, size: Resolution) -> (i32, i32) {
    let px = (x.clamp(0.0, 1.0) * size.width as f32) as i32;
    let py = (y.clamp(0.0, 1.0) * size.height as f32) as i32;
    (px, py)
}

/// Synthesises pointer input on the captured window.
pub struct PointerInjector {
    display: Arc<X11Display>,
    window: WindowId,
}

impl PointerInjector {
    pub fn new(display: Arc<X11Display>, window: WindowId) -> Self {
        Self { display, window }
    }

    pub fn set_window(&mut self, window: WindowId) {
        self.window = window;
    }

    /// Warp the pointer to the normalised `(x, y)` inside the window.
    pub fn move_to(&self, x: f32, y: f32, size: Resolution) {
        let (px, py) = to_pixels(x, y, size);
        unsafe {
            xlib::XWarpPointer(self.display.raw(), 0, self.window.raw(), 0, 0, 0, 0, px, py);
        }
        self.display.flush();
        trace!("Pointer[{}] warped to {},{}", self.window, px, py);
    }

    /// Deliver a button press or release to the window at the current
    /// pointer position, carrying the live modifier and button state.
    pub fn button(&self, button: MouseButton, pressed: bool) {
        let dpy = self.display.raw();
        let query = self.display.query_pointer(self.window).unwrap_or_default();
        let mut event: xlib::XEvent = unsafe { std::mem::zeroed() };
        event.button = button_event(dpy, self.window, &query, button, pressed);
        let mask = if pressed { xlib::ButtonPressMask } else { xlib::ButtonReleaseMask };
        unsafe {
            xlib::XSendEvent(dpy, self.window.raw(), xlib::True, mask, &mut event);
        }
        self.display.flush();
        let direction = if pressed { "down" } else { "up" };
        trace!("Pointer[{}] {:?} {} (state {:#x})", self.window, button, direction, query.state);
    }
}

/// Synthetic button event for `window` at the queried pointer position.
pub fn button_event(
    dpy: *mut xlib::Display,
    window: WindowId,
    query: &PointerQuery,
    button: MouseButton,
    pressed: bool,
) -> xlib::XButtonEvent {
    xlib::XButtonEvent {
        type_: if pressed { xlib::ButtonPress } else { xlib::ButtonRelease },
        serial: 0,
        send_event: xlib::True,
        display: dpy,
        window: window.raw(),
        root: query.root,
        subwindow: query.child,
        time: xlib::CurrentTime,
        x: query.x,
        y: query.y,
        x_root: query.root_x,
        y_root: query.root_y,
        state: query.state,
        button: button.x11_button(),
        same_screen: xlib::True,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalised_points_scale_to_window() {
        let size = Resolution::new(1920, 1080);
        assert_eq!(to_pixels(0.5, 0.5, size), (960, 540));
        assert_eq!(to_pixels(0.0, 1.0, size), (0, 1080));
    }

    #[test]
    fn out_of_range_points_are_clamped() {
        let size = Resolution::new(800, 600);
        assert_eq!(to_pixels(-0.2, 1.7, size), (0, 600));
    }

    #[test]
    fn button_event_carries_pointer_state() {
        let query = PointerQuery {
            root: 0x1e1,
            child: 0x3a00010,
            root_x: 1100,
            root_y: 620,
            x: 140,
            y: 60,
            state: xlib::ShiftMask | xlib::Button1Mask,
        };
        let window = WindowId(0x3a00007);

        let press = button_event(std::ptr::null_mut(), window, &query, MouseButton::Left, true);
        assert_eq!(press.type_, xlib::ButtonPress);
        assert_eq!(press.window, 0x3a00007);
        assert_eq!(press.subwindow, 0x3a00010);
        assert_eq!((press.x, press.y, press.x_root, press.y_root), (140, 60, 1100, 620));
        assert_eq!(press.state, xlib::ShiftMask | xlib::Button1Mask);
        assert_eq!(press.button, MouseButton::Left.x11_button());
        assert_eq!(press.send_event, xlib::True);

        let release = button_event(std::ptr::null_mut(), window, &query, MouseButton::Left, false);
        assert_eq!(release.type_, xlib::ButtonRelease);
    }

    #[test]
    fn pointer_on_other_screen_sends_at_origin() {
        let release = button_event(
            std::ptr::null_mut(),
            WindowId(5),
            &PointerQuery::default(),
            MouseButton::Left,
            false,
        );
        assert_eq!((release.x, release.y, release.state), (0, 0, 0));
        assert_eq!(release.root, 0);
    }
}
