//! vrplayer-decoder — video playback on a second GL context
//!
//! The decode thread owns mpv and a multisampled framebuffer on the decode
//! context. The main thread samples the resolved texture through the shared
//! object namespace.
//!
//! ```text
//!   mpv ──update callback──► RenderUpdateFlag
//!                                  │ take_and_clear
//!   decode thread ── render_into(fbo) ── resolve ──► texture ──► main context
//!        ▲                                                │
//!        └──── DecodeCommand (seek, pause) ◄──────────────┘ BridgeEvent
//! ```

pub mod bridge;
pub mod mpv;
pub mod update_flag;

pub use bridge::{
    BridgeCore, BridgeEvent, BridgeState, CollaboratorFactory, DecodeCollaborator, DecodeCommand, DecodeEvent,
    DecodeRenderBridge, DecodeSurface, DecodeTarget, EndReason, StepOutcome,
};
pub use mpv::MpvCollaborator;
pub use update_flag::RenderUpdateFlag;

use std::path::PathBuf;
use std::sync::Arc;

use vrplayer_core::DecodeError;
use vrplayer_renderer::GlDevice;

/// Start playing `path` through mpv on the decode context of `device`.
pub fn spawn_mpv(device: Arc<GlDevice>, path: PathBuf) -> Result<DecodeRenderBridge, DecodeError> {
    DecodeRenderBridge::spawn::<MpvCollaborator>(device, path, Box::new(MpvCollaborator::new))
}
