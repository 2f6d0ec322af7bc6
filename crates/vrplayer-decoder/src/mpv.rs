//! libmpv render-API collaborator.

use std::os::raw::c_void;
use std::path::Path;
use std::sync::Arc;

use libc::{setlocale, LC_NUMERIC};
use libmpv2::events::Event;
use libmpv2::render::{OpenGLInitParams, RenderContext, RenderParam, RenderParamApiType};
use libmpv2::Mpv;
use tracing::{debug, info, warn};
use vrplayer_core::{DecodeError, Resolution};
use vrplayer_renderer::{gl_proc_address, ContextToken};

use crate::bridge::{DecodeCollaborator, DecodeEvent, EndReason};
use crate::update_flag::RenderUpdateFlag;

const OPTIONS: [(&str, &str); 5] = [
    ("vd-lavc-dr", "yes"),
    ("vo", "libmpv"),
    ("hwdec", "auto"),
    ("profile", "gpu-hq"),
    ("gpu-api", "opengl"),
];

/// Flips mpv's own `pause` property rather than a cached copy.
const PAUSE_TOGGLE: [&str; 2] = ["cycle", "pause"];

fn get_proc_address(_ctx: &(), name: &str) -> *mut c_void {
    gl_proc_address(name) as *mut c_void
}

fn init_error(e: libmpv2::Error) -> DecodeError {
    DecodeError::InitFailed { reason: e.to_string() }
}

/// mpv instance drawing into the decode context.
pub struct MpvCollaborator {
    // Declared first: the render context must be freed before the handle.
    render: RenderContext,
    mpv: Mpv,
}

impl MpvCollaborator {
    /// Create mpv and its OpenGL render context. The decode context must be
    /// current, which `_token` proves.
    pub fn new(_token: &ContextToken<'_>, flag: Arc<RenderUpdateFlag>) -> Result<Self, DecodeError> {
        // mpv refuses to start under a locale with a non-'.' decimal point.
        unsafe {
            setlocale(LC_NUMERIC, c"C".as_ptr());
        }

        let mut mpv = Mpv::with_initializer(|init| {
            for (name, value) in OPTIONS {
                init.set_property(name, value)?;
            }
            Ok(())
        })
        .map_err(init_error)?;
        mpv.event_context().disable_deprecated_events().ok();

        let mut render = RenderContext::new(
            unsafe { mpv.ctx.as_mut() },
            vec![
                RenderParam::ApiType(RenderParamApiType::OpenGl),
                RenderParam::InitParams(OpenGLInitParams { get_proc_address, ctx: () }),
            ],
        )
        .map_err(init_error)?;
        render.set_update_callback(move || flag.set());

        info!("mpv render context ready");
        Ok(Self { render, mpv })
    }

    fn video_size(&self) -> Option<(u32, u32)> {
        let width = self.mpv.get_property::<i64>("width").ok()?;
        let height = self.mpv.get_property::<i64>("height").ok()?;
        Some((u32::try_from(width).ok()?, u32::try_from(height).ok()?))
    }
}

impl DecodeCollaborator for MpvCollaborator {
    fn load(&mut self, path: &Path) -> Result<(), DecodeError> {
        let load_error = |reason: String| DecodeError::LoadFailed { path: path.display().to_string(), reason };
        let path = path.to_str().ok_or_else(|| load_error("path is not valid UTF-8".into()))?;
        self.mpv.command("loadfile", &[path]).map_err(|e| load_error(e.to_string()))
    }

    fn render_into(&mut self, fbo: u32, size: Resolution) -> Result<(), DecodeError> {
        self.render
            .render::<()>(fbo as i32, size.width as i32, size.height as i32, false)
            .map_err(|e| DecodeError::RenderFailed { reason: e.to_string() })
    }

    fn seek(&mut self, offset_seconds: f64) -> Result<(), DecodeError> {
        debug!("mpv: seek {:+}s", offset_seconds);
        self.mpv
            .command("seek", &[&format!("{offset_seconds}"), "relative"])
            .map_err(|e| DecodeError::Playback { reason: e.to_string() })
    }

    fn toggle_pause(&mut self) -> Result<(), DecodeError> {
        debug!("mpv: cycle pause");
        self.mpv
            .command(PAUSE_TOGGLE[0], &PAUSE_TOGGLE[1..])
            .map_err(|e| DecodeError::Playback { reason: e.to_string() })
    }

    fn poll_event(&mut self) -> Option<DecodeEvent> {
        loop {
            match self.mpv.event_context_mut().wait_event(0.0)? {
                Ok(Event::EndFile(_)) | Ok(Event::Shutdown) => {
                    return Some(DecodeEvent::EndOfStream(EndReason::Finished));
                }
                Ok(Event::VideoReconfig) => match self.video_size() {
                    Some((width, height)) => return Some(DecodeEvent::DimensionsChanged { width, height }),
                    None => debug!("mpv: reconfigured without video size"),
                },
                Ok(_) => {}
                // End-of-file with an error status surfaces here.
                Err(e) => {
                    warn!("mpv: {}", e);
                    return Some(DecodeEvent::EndOfStream(EndReason::Error(e.to_string())));
                }
            }
        }
    }
}
