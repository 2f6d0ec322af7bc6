use serde::{Deserialize, Serialize};

// MARK: - Resolution

/// Pixel size of a window, texture, or render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Default size of the desktop mirror window.
    pub const COMPANION: Self = Self { width: 800, height: 600 };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Same size with both axes clamped to at least one pixel.
    pub fn at_least_one(self) -> Self {
        Self {
            width: self.width.max(1),
            height: self.height.max(1),
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width.max(1) as f64 / self.height.max(1) as f64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

// MARK: - Eye

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

// MARK: - Topology

/// The fixed set of surfaces captured content can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Half sphere wrapped around the viewer (`--sphere`).
    HemisphereSphere,
    /// Cubemap-unwrapped 360° sphere (`--sphere360`).
    CubemapSphere360,
    /// Curved plane in front of the viewer (`--plane`).
    Cylinder,
    /// Flat rectangle (`--flat`).
    FlatQuad,
}

impl Topology {
    pub fn label(self) -> &'static str {
        match self {
            Self::HemisphereSphere => "sphere",
            Self::CubemapSphere360 => "sphere360",
            Self::Cylinder => "plane",
            Self::FlatQuad => "flat",
        }
    }

    /// Amount one zoom key press moves the zoom value by.
    ///
    /// 360° content zooms in texels of the per-face UV window, every other
    /// topology zooms in scene units along the view axis.
    pub fn zoom_step(self) -> f32 {
        match self {
            Self::CubemapSphere360 => 1.0,
            _ => 0.01,
        }
    }

    /// Topologies that show the whole source to both eyes.
    pub fn forces_mono(self) -> bool {
        matches!(self, Self::Cylinder | Self::CubemapSphere360)
    }
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// MARK: - StereoLayout

/// How the horizontal halves of the source map to the two eyes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoLayout {
    /// Left half → left eye, right half → right eye.
    LeftRight,
    /// Left half → right eye, right half → left eye.
    RightLeft,
    /// Full source to both eyes.
    Mono,
}

/// Horizontal sampling window of the source texture for one eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvWindow {
    pub offset: f32,
    pub scale: f32,
}

impl StereoLayout {
    pub fn uv_window(self, eye: Eye) -> UvWindow {
        match (self, eye) {
            (Self::Mono, _) => UvWindow { offset: 0.0, scale: 1.0 },
            (Self::LeftRight, Eye::Left) | (Self::RightLeft, Eye::Right) => {
                UvWindow { offset: 0.0, scale: 0.5 }
            }
            (Self::LeftRight, Eye::Right) | (Self::RightLeft, Eye::Left) => {
                UvWindow { offset: 0.5, scale: 0.5 }
            }
        }
    }

    pub fn is_split(self) -> bool {
        !matches!(self, Self::Mono)
    }
}

// MARK: - WindowId

/// X11 window id as given on the command line or read from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl WindowId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl std::str::FromStr for WindowId {
    type Err = String;

    /// Accepts decimal, `0x` hex and leading-zero octal, optionally prefixed
    /// with `window:` as printed by some window pickers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed.strip_prefix("window:").unwrap_or(trimmed);
        let parsed = if let Some(hex) = body
            .strip_prefix("0x")
            .or_else(|| body.strip_prefix("0X"))
        {
            u64::from_str_radix(hex, 16)
        } else if body.len() > 1 && body.starts_with('0') {
            u64::from_str_radix(&body[1..], 8)
        } else {
            body.parse::<u64>()
        };
        match parsed {
            Ok(0) => Err(format!("window id must be non-zero: {s}")),
            Ok(id) => Ok(Self(id)),
            Err(e) => Err(format!("invalid window id '{s}': {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_windows_per_eye() {
        let lr = StereoLayout::LeftRight;
        assert_eq!(lr.uv_window(Eye::Left), UvWindow { offset: 0.0, scale: 0.5 });
        assert_eq!(lr.uv_window(Eye::Right), UvWindow { offset: 0.5, scale: 0.5 });

        let rl = StereoLayout::RightLeft;
        assert_eq!(rl.uv_window(Eye::Left), UvWindow { offset: 0.5, scale: 0.5 });
        assert_eq!(rl.uv_window(Eye::Right), UvWindow { offset: 0.0, scale: 0.5 });

        for eye in Eye::BOTH {
            assert_eq!(StereoLayout::Mono.uv_window(eye), UvWindow { offset: 0.0, scale: 1.0 });
        }
    }

    #[test]
    fn window_id_accepts_common_spellings() {
        assert_eq!("123".parse::<WindowId>(), Ok(WindowId(123)));
        assert_eq!("0x3a00007".parse::<WindowId>(), Ok(WindowId(0x3a00007)));
        assert_eq!("window:0x10".parse::<WindowId>(), Ok(WindowId(16)));
        assert_eq!("017".parse::<WindowId>(), Ok(WindowId(15)));
        assert!("0".parse::<WindowId>().is_err());
        assert!("firefox".parse::<WindowId>().is_err());
    }

    #[test]
    fn aspect_ratio_never_divides_by_zero() {
        assert_eq!(Resolution::new(1920, 0).aspect_ratio(), 1920.0);
        assert_eq!(Resolution::new(0, 0).at_least_one(), Resolution::new(1, 1));
    }
}
