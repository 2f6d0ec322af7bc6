use crate::types::Resolution;

/// A cursor bitmap ready for texture upload.
///
/// Pixels are straight (non-premultiplied) RGBA8, row-major, no padding.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorImage {
    pub width: u32,
    pub height: u32,
    pub hotspot_x: u32,
    pub hotspot_y: u32,
    pub pixels: Vec<u8>,
}

impl CursorImage {
    /// Convert premultiplied ARGB32 words (as delivered by XFixes) to
    /// straight RGBA bytes.
    ///
    /// A zero alpha is treated as one before dividing, so fully transparent
    /// pixels stay finite. Channels that exceed their alpha are clamped.
    pub fn from_premultiplied_argb(
        width: u32,
        height: u32,
        hotspot_x: u32,
        hotspot_y: u32,
        argb: &[u32],
    ) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for &word in argb.iter().take(count) {
            let alpha = (word >> 24) & 0xff;
            let divisor = alpha.max(1);
            let unpremultiply = |shift: u32| {
                let channel = (word >> shift) & 0xff;
                (channel * 255 / divisor).min(255) as u8
            };
            pixels.push(unpremultiply(16));
            pixels.push(unpremultiply(8));
            pixels.push(unpremultiply(0));
            pixels.push(alpha as u8);
        }
        // Short input: pad with transparent pixels rather than upload garbage.
        pixels.resize(count * 4, 0);

        Self {
            width,
            height,
            hotspot_x,
            hotspot_y,
            pixels,
        }
    }

    pub fn size(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}
