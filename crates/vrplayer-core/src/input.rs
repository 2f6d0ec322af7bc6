//! Player actions.
//!
//! Key presses, global hotkeys, signals and VR controller buttons all end up
//! as a [`PlayerAction`] that the main loop applies in one place.

use serde::{Deserialize, Serialize};

// MARK: - PlayerAction

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayerAction {
    /// Make the current head orientation the new forward direction.
    ResetRotation,

    /// Leave the main loop and shut down cleanly.
    Quit,

    /// Bring the surface closer.
    ZoomIn,

    /// Push the surface further away.
    ZoomOut,

    /// Relative seek in seconds (video only).
    Seek { offset_seconds: f64 },

    /// Pause / resume (video only).
    TogglePause,

    /// Move the pointer to a normalised position inside the source window.
    PointerMove { x: f32, y: f32 },

    /// Press or release a pointer button over the source window.
    PointerButton { button: MouseButton, pressed: bool },
}

impl PlayerAction {
    /// Actions that only make sense while playing a video.
    pub fn requires_video(&self) -> bool {
        matches!(self, Self::Seek { .. } | Self::TogglePause)
    }

    /// Actions that change the mesh.
    pub fn changes_zoom(&self) -> bool {
        matches!(self, Self::ZoomIn | Self::ZoomOut)
    }
}

// MARK: - MouseButton

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// Core protocol button number.
    pub fn x11_button(self) -> u32 {
        match self {
            Self::Left => 1,
            Self::Middle => 2,
            Self::Right => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_actions() {
        let seek: PlayerAction =
            serde_json::from_str(r#"{"kind":"seek","offset_seconds":-5.0}"#).unwrap();
        assert_eq!(seek, PlayerAction::Seek { offset_seconds: -5.0 });
        assert!(seek.requires_video());

        let click: PlayerAction =
            serde_json::from_str(r#"{"kind":"pointer_button","button":"right","pressed":true}"#)
                .unwrap();
        assert_eq!(
            click,
            PlayerAction::PointerButton { button: MouseButton::Right, pressed: true }
        );
    }

    #[test]
    fn classifies_actions() {
        assert!(PlayerAction::ZoomIn.changes_zoom());
        assert!(!PlayerAction::ResetRotation.changes_zoom());
        assert!(!PlayerAction::Quit.requires_video());
        assert_eq!(MouseButton::Middle.x11_button(), 2);
    }
}
