//! Per-frame layout state handed to mesh building and rendering.

use glam::Vec2;

use crate::config::MIN_CURSOR_SCALE;
use crate::types::{Eye, Resolution, StereoLayout};

/// Everything about the current frame's source and cursor that the renderer
/// needs, captured once per frame by the main loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Size of the captured window (or video) in pixels.
    pub source_size: Resolution,
    /// Pointer position relative to the source's top-left corner, in pixels.
    pub pointer: Vec2,
    /// Size of the current cursor sprite in pixels.
    pub cursor_size: Resolution,
    /// Cursor hotspot inside the sprite, in pixels.
    pub cursor_hotspot: Vec2,
    pub cursor_scale: f32,
    /// Horizontal stretch of the active mesh, from the mesh builder.
    pub cursor_aspect: f32,
    pub cursor_wrap: bool,
    pub layout: StereoLayout,
    /// False while showing video or when no cursor image is known.
    pub show_cursor: bool,
}

impl FrameContext {
    pub fn cursor_visible(&self) -> bool {
        self.show_cursor && self.cursor_scale >= MIN_CURSOR_SCALE && !self.cursor_size.is_empty()
    }

    /// Sprite size in source UV units.
    pub fn cursor_size_uniform(&self) -> Vec2 {
        if !self.cursor_visible() {
            return Vec2::ZERO;
        }
        let x = 0.01 * self.cursor_scale;
        let sprite = self.cursor_size.at_least_one();
        let y = x * self.cursor_aspect * (sprite.height as f32 / sprite.width as f32);
        Vec2::new(x, y)
    }

    /// Top-left corner of the cursor sprite in the eye's UV space.
    pub fn cursor_location(&self, eye: Eye) -> Vec2 {
        let window = self.source_size.at_least_one();
        let window = Vec2::new(window.width as f32, window.height as f32);
        let mut m = self.pointer / window;

        if self.layout.is_split() {
            if self.cursor_wrap {
                if m.x >= 0.5 {
                    m.x -= 0.5;
                }
            } else {
                m.x *= 0.5;
            }
            m.x += self.layout.uv_window(eye).offset;
        }

        let size = self.cursor_size_uniform();
        let sprite = self.cursor_size.at_least_one();
        let drawn_scale = size * window / Vec2::new(sprite.width as f32, sprite.height as f32);
        m - self.cursor_hotspot * drawn_scale / window
    }
}
