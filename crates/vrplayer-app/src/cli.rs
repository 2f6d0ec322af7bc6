use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use vrplayer_core::{RawOptions, StereoLayout, Topology, WindowId};

/// Project a window or a video onto a surface in VR.
#[derive(Parser, Debug)]
#[command(name = "vr-video-player", version)]
#[command(group(ArgGroup::new("topology").args(["sphere", "sphere360", "flat", "plane"])))]
#[command(group(ArgGroup::new("layout").args(["left_right", "right_left"])))]
#[command(group(ArgGroup::new("stretching").args(["stretch", "no_stretch"])))]
#[command(group(ArgGroup::new("wrapping").args(["cursor_wrap", "no_cursor_wrap"])))]
pub struct Cli {
    /// X11 id of the window to view (decimal, 0x hex or window:0x...)
    pub window_id: Option<WindowId>,

    /// Half sphere around the viewer (default)
    #[arg(long)]
    pub sphere: bool,

    /// 360° cubemap sphere; forces mono, zoom 0 and no cursor
    #[arg(long)]
    pub sphere360: bool,

    /// Flat rectangle
    #[arg(long)]
    pub flat: bool,

    /// Curved plane showing the whole source to both eyes
    #[arg(long)]
    pub plane: bool,

    /// Left half to the left eye (default)
    #[arg(long)]
    pub left_right: bool,

    /// Left half to the right eye
    #[arg(long)]
    pub right_left: bool,

    /// Stretch the flat surface to the full source width (default)
    #[arg(long)]
    pub stretch: bool,

    #[arg(long)]
    pub no_stretch: bool,

    /// Distance offset of the surface; lower is closer
    #[arg(long, value_name = "ZOOM", allow_negative_numbers = true)]
    pub zoom: Option<f32>,

    /// Cursor sprite scale; below 0.001 hides the cursor
    #[arg(long, value_name = "SCALE")]
    pub cursor_scale: Option<f32>,

    /// Fold the pointer into each eye's half of the source
    #[arg(long)]
    pub cursor_wrap: bool,

    #[arg(long)]
    pub no_cursor_wrap: bool,

    /// Jitter the view slightly every frame to hide scan-out flicker
    #[arg(long)]
    pub reduce_flicker: bool,

    /// Let head movement translate the view
    #[arg(long)]
    pub free_camera: bool,

    /// Follow the focused window
    #[arg(long)]
    pub follow_focused: bool,

    /// Play a video file instead of capturing a window
    #[arg(long, value_name = "VIDEO")]
    pub video: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,
}

fn either(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl Cli {
    pub fn raw_options(&self) -> RawOptions {
        let topology = if self.sphere360 {
            Some(Topology::CubemapSphere360)
        } else if self.flat {
            Some(Topology::FlatQuad)
        } else if self.plane {
            Some(Topology::Cylinder)
        } else if self.sphere {
            Some(Topology::HemisphereSphere)
        } else {
            None
        };
        let layout = if self.right_left {
            Some(StereoLayout::RightLeft)
        } else if self.left_right {
            Some(StereoLayout::LeftRight)
        } else {
            None
        };

        RawOptions {
            window: self.window_id,
            follow_focused: self.follow_focused,
            video: self.video.clone(),
            topology,
            layout,
            stretch: either(self.stretch, self.no_stretch),
            zoom: self.zoom,
            cursor_scale: self.cursor_scale,
            cursor_wrap: either(self.cursor_wrap, self.no_cursor_wrap),
            reduce_flicker: self.reduce_flicker,
            free_camera: self.free_camera,
        }
    }
}
