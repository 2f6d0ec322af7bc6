use std::process::Command;

use tracing::{debug, warn};

const TITLE: &str = "vr video player";
const TIMEOUT_MS: &str = "10000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Critical,
}

impl Urgency {
    fn as_arg(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Critical => "critical",
        }
    }
}

fn notify_args(urgency: Urgency, title: &str, body: &str) -> Vec<String> {
    ["-t", TIMEOUT_MS, "-u", urgency.as_arg(), "--", title, body]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Desktop notification through `notify-send`. Never fails the caller.
pub fn notify(urgency: Urgency, title: &str, body: &str) {
    match Command::new("notify-send").args(notify_args(urgency, title, body)).spawn() {
        Ok(_) => debug!("Notification sent: {}", body),
        Err(e) => warn!("notify-send unavailable: {}", e),
    }
}

pub fn video_ended() {
    notify(Urgency::Low, TITLE, "the video ended");
}

pub fn playback_error(reason: &str) {
    notify(Urgency::Critical, "vr video player mpv video error", reason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_end_options_before_text() {
        let args = notify_args(Urgency::Critical, "title", "-rf looks like a flag");
        assert_eq!(args, ["-t", "10000", "-u", "critical", "--", "title", "-rf looks like a flag"]);
        assert_eq!(notify_args(Urgency::Low, TITLE, "x")[3], "low");
    }
}
