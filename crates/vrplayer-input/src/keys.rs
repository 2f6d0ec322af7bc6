use vrplayer_core::{PlayerAction, Topology};
use x11::keysym;

/// Seconds jumped by the arrow keys.
pub const SEEK_STEP_SECONDS: f64 = 5.0;

/// Map a key pressed in the companion window to its action.
///
/// Seek and pause are returned regardless of source; callers drop them
/// when no video is playing (see [`PlayerAction::requires_video`]).
pub fn companion_action(keysym: u64) -> Option<PlayerAction> {
    let keysym = u32::try_from(keysym).ok()?;
    let action = match keysym {
        keysym::XK_w | keysym::XK_W => PlayerAction::ResetRotation,
        keysym::XK_Escape => PlayerAction::Quit,
        keysym::XK_q | keysym::XK_Q => PlayerAction::ZoomIn,
        keysym::XK_e | keysym::XK_E => PlayerAction::ZoomOut,
        keysym::XK_Left => PlayerAction::Seek { offset_seconds: -SEEK_STEP_SECONDS },
        keysym::XK_Right => PlayerAction::Seek { offset_seconds: SEEK_STEP_SECONDS },
        keysym::XK_space => PlayerAction::TogglePause,
        _ => return None,
    };
    Some(action)
}

/// New zoom after a zoom action, or `None` for any other action.
///
/// Zooming in moves the surface closer, which lowers the value.
pub fn apply_zoom(action: PlayerAction, topology: Topology, zoom: f32) -> Option<f32> {
    let step = topology.zoom_step();
    match action {
        PlayerAction::ZoomIn => Some(zoom - step),
        PlayerAction::ZoomOut => Some(zoom + step),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn companion_keys() {
        assert_eq!(companion_action(keysym::XK_w as u64), Some(PlayerAction::ResetRotation));
        assert_eq!(companion_action(keysym::XK_Escape as u64), Some(PlayerAction::Quit));
        assert_eq!(companion_action(keysym::XK_q as u64), Some(PlayerAction::ZoomIn));
        assert_eq!(companion_action(keysym::XK_e as u64), Some(PlayerAction::ZoomOut));
        assert_eq!(
            companion_action(keysym::XK_Left as u64),
            Some(PlayerAction::Seek { offset_seconds: -5.0 })
        );
        assert_eq!(
            companion_action(keysym::XK_Right as u64),
            Some(PlayerAction::Seek { offset_seconds: 5.0 })
        );
        assert_eq!(companion_action(keysym::XK_space as u64), Some(PlayerAction::TogglePause));
        assert_eq!(companion_action(keysym::XK_a as u64), None);
        assert_eq!(companion_action(u64::MAX), None);
    }

    #[test]
    fn zoom_step_depends_on_topology() {
        let zoomed = apply_zoom(PlayerAction::ZoomIn, Topology::HemisphereSphere, 0.5).unwrap();
        assert!((zoomed - 0.49).abs() < 1e-6);

        assert_eq!(apply_zoom(PlayerAction::ZoomOut, Topology::CubemapSphere360, 0.0), Some(1.0));
        assert_eq!(apply_zoom(PlayerAction::ZoomIn, Topology::CubemapSphere360, 0.0), Some(-1.0));
        assert_eq!(apply_zoom(PlayerAction::Quit, Topology::FlatQuad, 1.0), None);
    }
}
