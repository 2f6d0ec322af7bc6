use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PlayerError;
use crate::types::{StereoLayout, Topology, WindowId};

/// Cursor scales below this are treated as "no cursor".
pub const MIN_CURSOR_SCALE: f32 = 0.001;

const DEFAULT_CURSOR_SCALE: f32 = 2.0;

// MARK: - SourceSelection

/// What the player shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSelection {
    /// A fixed X11 window.
    Window { id: WindowId },
    /// Whatever window currently has focus.
    FollowFocused,
    /// A video file played through the decode bridge.
    Video { path: PathBuf },
}

impl SourceSelection {
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video { .. })
    }
}

// MARK: - PlayerConfig

/// Effective runtime configuration after defaults are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub source: SourceSelection,
    pub topology: Topology,
    pub layout: StereoLayout,
    pub stretch: bool,
    pub zoom: f32,
    /// Cursor sprite scale; `0.0` disables cursor compositing.
    pub cursor_scale: f32,
    pub cursor_wrap: bool,
    pub reduce_flicker: bool,
    pub free_camera: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            source: SourceSelection::FollowFocused,
            topology: Topology::HemisphereSphere,
            layout: StereoLayout::LeftRight,
            stretch: true,
            zoom: 0.0,
            cursor_scale: 0.0,
            cursor_wrap: true,
            reduce_flicker: false,
            free_camera: false,
        }
    }
}

impl PlayerConfig {
    pub fn cursor_enabled(&self) -> bool {
        self.cursor_scale >= MIN_CURSOR_SCALE && !self.source.is_video()
    }

    /// Apply the defaulting rules to raw command-line options.
    pub fn resolve(raw: RawOptions) -> Result<Self, PlayerError> {
        let source = match (raw.window, raw.follow_focused, raw.video) {
            (Some(id), false, None) => SourceSelection::Window { id },
            (None, true, None) => SourceSelection::FollowFocused,
            (None, false, Some(path)) => SourceSelection::Video { path },
            (None, false, None) => {
                return Err(PlayerError::usage(
                    "a window id, --follow-focused or --video is required",
                ))
            }
            _ => {
                return Err(PlayerError::usage(
                    "window id, --follow-focused and --video are mutually exclusive",
                ))
            }
        };

        let topology = raw.topology.unwrap_or(Topology::HemisphereSphere);
        let layout = if topology.forces_mono() {
            StereoLayout::Mono
        } else {
            raw.layout.unwrap_or(StereoLayout::LeftRight)
        };

        if let Some(zoom) = raw.zoom {
            if !zoom.is_finite() {
                return Err(PlayerError::usage(format!("invalid zoom {zoom}")));
            }
        }
        let zoom = match (topology, raw.zoom) {
            (Topology::CubemapSphere360, _) => 0.0,
            (_, Some(zoom)) => zoom,
            (Topology::HemisphereSphere, None) => 0.0,
            (_, None) => 1.0,
        };

        let cursor_scale = match (topology, raw.cursor_scale) {
            (Topology::CubemapSphere360, _) => 0.0,
            (Topology::HemisphereSphere, None) => 0.0,
            (_, None) => DEFAULT_CURSOR_SCALE,
            (_, Some(scale)) if !(scale >= MIN_CURSOR_SCALE) => {
                debug!("Cursor scale {} below {}, cursor hidden", scale, MIN_CURSOR_SCALE);
                0.0
            }
            (_, Some(scale)) => scale,
        };

        let cursor_wrap = raw
            .cursor_wrap
            .unwrap_or(topology != Topology::FlatQuad);

        Ok(Self {
            source,
            topology,
            layout,
            stretch: raw.stretch.unwrap_or(true),
            zoom,
            cursor_scale,
            cursor_wrap,
            reduce_flicker: raw.reduce_flicker,
            free_camera: raw.free_camera,
        })
    }
}

// MARK: - RawOptions

/// Options exactly as the user gave them; `None` means "not specified".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOptions {
    pub window: Option<WindowId>,
    pub follow_focused: bool,
    pub video: Option<PathBuf>,
    pub topology: Option<Topology>,
    pub layout: Option<StereoLayout>,
    pub stretch: Option<bool>,
    pub zoom: Option<f32>,
    pub cursor_scale: Option<f32>,
    pub cursor_wrap: Option<bool>,
    pub reduce_flicker: bool,
    pub free_camera: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorClass;

    fn window_opts() -> RawOptions {
        RawOptions {
            window: Some(WindowId(0x3a00007)),
            ..RawOptions::default()
        }
    }

    #[test]
    fn sphere_defaults() {
        let cfg = PlayerConfig::resolve(window_opts()).expect("valid options");
        assert_eq!(cfg.topology, Topology::HemisphereSphere);
        assert_eq!(cfg.layout, StereoLayout::LeftRight);
        assert_eq!(cfg.zoom, 0.0);
        assert!(!cfg.cursor_enabled());
        assert!(cfg.cursor_wrap);
        assert!(cfg.stretch);
    }

    #[test]
    fn flat_defaults_disable_cursor_wrap() {
        let cfg = PlayerConfig::resolve(RawOptions {
            topology: Some(Topology::FlatQuad),
            ..window_opts()
        })
        .expect("valid options");
        assert_eq!(cfg.zoom, 1.0);
        assert_eq!(cfg.cursor_scale, 2.0);
        assert!(!cfg.cursor_wrap);

        let wrapped = PlayerConfig::resolve(RawOptions {
            topology: Some(Topology::FlatQuad),
            cursor_wrap: Some(true),
            ..window_opts()
        })
        .expect("valid options");
        assert!(wrapped.cursor_wrap);
    }

    #[test]
    fn sphere360_forces_mono_and_hides_cursor() {
        let cfg = PlayerConfig::resolve(RawOptions {
            topology: Some(Topology::CubemapSphere360),
            layout: Some(StereoLayout::RightLeft),
            zoom: Some(3.0),
            cursor_scale: Some(4.0),
            ..window_opts()
        })
        .expect("valid options");
        assert_eq!(cfg.layout, StereoLayout::Mono);
        assert_eq!(cfg.zoom, 0.0);
        assert!(!cfg.cursor_enabled());
    }

    #[test]
    fn tiny_cursor_scale_disables_cursor() {
        let cfg = PlayerConfig::resolve(RawOptions {
            topology: Some(Topology::Cylinder),
            cursor_scale: Some(0.0001),
            ..window_opts()
        })
        .expect("valid options");
        assert_eq!(cfg.cursor_scale, 0.0);
        assert_eq!(cfg.layout, StereoLayout::Mono);
    }

    #[test]
    fn source_must_be_unique() {
        let err = PlayerConfig::resolve(RawOptions {
            follow_focused: true,
            ..window_opts()
        })
        .expect_err("two sources");
        assert_eq!(err.class(), ErrorClass::Usage);

        let err = PlayerConfig::resolve(RawOptions::default()).expect_err("no source");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let json = r#"{
            "source": {"kind": "video", "path": "/tmp/movie.mkv"},
            "topology": "flat_quad",
            "zoom": 0.5
        }"#;

        let cfg: PlayerConfig = serde_json::from_str(json).expect("valid config json");
        assert!(cfg.source.is_video());
        assert_eq!(cfg.topology, Topology::FlatQuad);
        assert_eq!(cfg.zoom, 0.5);
        assert_eq!(cfg.layout, StereoLayout::LeftRight);
        assert!(!cfg.cursor_enabled());
    }
}
