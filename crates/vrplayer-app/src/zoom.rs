//! Zoom side channel: the current zoom as plain text under `/tmp`, rewritten
//! on every change so external scripts can follow it.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use vrplayer_core::SourceSelection;

const PREFIX: &str = "vr-video-player_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoomFile {
    path: PathBuf,
}

impl ZoomFile {
    /// File for `source` in `/tmp`. A video has no window and uses id 0.
    pub fn for_source(source: &SourceSelection) -> Self {
        Self::in_dir(Path::new("/tmp"), source)
    }

    pub fn in_dir(dir: &Path, source: &SourceSelection) -> Self {
        let name = match source {
            SourceSelection::Window { id } => format!("{PREFIX}{}", id.raw()),
            SourceSelection::FollowFocused => format!("{PREFIX}focused"),
            SourceSelection::Video { .. } => format!("{PREFIX}0"),
        };
        Self { path: dir.join(name) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with `zoom`. Failures are logged only.
    pub fn write(&self, zoom: f32) {
        match fs::write(&self.path, format_zoom(zoom)) {
            Ok(()) => debug!("Zoom {} written to {}", zoom, self.path.display()),
            Err(e) => warn!("Cannot write zoom to {}: {}", self.path.display(), e),
        }
    }
}

/// Six decimals with trailing zeros trimmed, so `0.049999997` reads `0.05`.
pub fn format_zoom(zoom: f32) -> String {
    let text = format!("{zoom:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrplayer_core::WindowId;

    #[test]
    fn names_follow_source() {
        let dir = Path::new("/tmp");
        let window = ZoomFile::in_dir(dir, &SourceSelection::Window { id: WindowId(0x3a00007) });
        assert_eq!(window.path(), Path::new("/tmp/vr-video-player_60817415"));

        let focused = ZoomFile::in_dir(dir, &SourceSelection::FollowFocused);
        assert_eq!(focused.path(), Path::new("/tmp/vr-video-player_focused"));

        let video = SourceSelection::Video { path: "/tmp/a.mkv".into() };
        assert_eq!(ZoomFile::in_dir(dir, &video).path(), Path::new("/tmp/vr-video-player_0"));
    }

    #[test]
    fn formats_like_a_human_would() {
        assert_eq!(format_zoom(0.0), "0");
        assert_eq!(format_zoom(-0.0), "0");
        assert_eq!(format_zoom(3.0), "3");
        assert_eq!(format_zoom(0.0 + 0.01 * 5.0), "0.05");
        assert_eq!(format_zoom(-0.25), "-0.25");
    }

    #[test]
    fn write_overwrites_previous_value() {
        let dir = std::env::temp_dir().join(format!("vrplayer-zoom-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("temp dir");
        let file = ZoomFile::in_dir(&dir, &SourceSelection::FollowFocused);

        file.write(1.5);
        file.write(0.99);
        assert_eq!(fs::read_to_string(file.path()).expect("zoom file"), "0.99");

        fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[test]
    fn unwritable_location_is_not_fatal() {
        let file = ZoomFile::in_dir(Path::new("/nonexistent/dir"), &SourceSelection::FollowFocused);
        file.write(1.0);
    }
}
