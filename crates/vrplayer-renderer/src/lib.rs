//! vrplayer-renderer — stereo rendering of a texture mapped onto a mesh.
//!
//! # Frame
//!
//! ```text
//!            PoseSource::wait_get_poses
//!                       │ head pose
//!                   ViewState ── reset / free camera / flicker
//!                       │ view
//!   ┌───────────────────┴───────────────────┐
//!   left eye: mvp, uv window, cursor        right eye
//!   draw mesh into 4x MSAA target           draw mesh
//!   resolve                                 resolve
//!   └───────────────────┬───────────────────┘
//!            PoseSource::submit (both eyes)
//!                       │
//!            CompanionView side by side ──► glXSwapBuffers
//! ```
//!
//! All GL work takes a [`ContextToken`] proving a context of the
//! [`GlDevice`] is current on the calling thread.

mod companion;
mod context;
mod cursor;
mod framebuffer;
mod mesh;
mod pipeline;
mod pose;
mod shader;
mod xr_source;

pub use companion::CompanionView;
pub use context::{gl_proc_address, ContextKind, ContextToken, GlDevice, XlibHandles, COMPANION_TITLE};
pub use cursor::CursorSprite;
pub use framebuffer::{EyeFramebuffer, StereoFramebufferSet, SAMPLES};
pub use mesh::MeshBuffer;
pub use pipeline::{eye_mvp, FrameOutcome, RenderPipeline, ViewState};
pub use pose::{projection_from_fov, FramePoses, HeadTracker, PoseEvent, PoseSource, FAR_CLIP, NEAR_CLIP};
pub use shader::Program;
pub use xr_source::OpenXrPoseSource;
