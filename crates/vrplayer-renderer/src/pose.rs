//! Head tracking and the VR runtime seam.

use glam::{Mat4, Quat, Vec3, Vec4};
use vrplayer_core::{Eye, PoseError, PoseMatrix, Resolution};

use crate::context::ContextToken;

pub const NEAR_CLIP: f32 = 0.01;
pub const FAR_CLIP: f32 = 30.0;

/// Per-frame jitter applied by reduce-flicker mode, in radians.
const FLICKER_AMPLITUDE: f32 = 0.0005;

// MARK: - PoseSource

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseEvent {
    /// The user asked to recentre from the controller.
    ResetRequested,
    /// The runtime is shutting the session down.
    Quit,
    /// The session is not visible; frames are skipped.
    SessionIdle,
    /// Controller trigger pressed or released.
    Click { pressed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePoses {
    pub head: PoseMatrix,
    /// False when tracking was lost for this frame.
    pub valid: bool,
    /// False when the compositor does not want this frame drawn.
    pub should_render: bool,
}

/// Source of head poses and sink of rendered eye images.
pub trait PoseSource {
    fn poll_event(&mut self) -> Result<Option<PoseEvent>, PoseError>;

    /// Block until the next frame and return the predicted head pose.
    fn wait_get_poses(&mut self) -> Result<FramePoses, PoseError>;

    fn eye_projection(&self, eye: Eye, near: f32, far: f32) -> Mat4;

    /// Transform from eye space to head space.
    fn eye_to_head(&self, eye: Eye) -> Mat4;

    /// Hand a resolved eye image to the compositor. The frame is presented
    /// once both eyes are submitted.
    fn submit(
        &mut self,
        token: &ContextToken<'_>,
        eye: Eye,
        texture: glow::Texture,
        size: Resolution,
    ) -> Result<(), PoseError>;

    /// Close a frame started by [`wait_get_poses`](Self::wait_get_poses)
    /// without presenting anything.
    fn skip_frame(&mut self) -> Result<(), PoseError>;

    fn recommended_render_size(&self) -> Resolution;
}

/// OpenGL projection for an asymmetric field of view given as tangent
/// half-angles in radians (left and down are negative).
pub fn projection_from_fov(left: f32, right: f32, up: f32, down: f32, near: f32, far: f32) -> Mat4 {
    let (tan_l, tan_r) = (left.tan(), right.tan());
    let (tan_u, tan_d) = (up.tan(), down.tan());
    let width = tan_r - tan_l;
    let height = tan_u - tan_d;
    Mat4::from_cols(
        Vec4::new(2.0 / width, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 / height, 0.0, 0.0),
        Vec4::new(
            (tan_r + tan_l) / width,
            (tan_u + tan_d) / height,
            -(far + near) / (far - near),
            -1.0,
        ),
        Vec4::new(0.0, 0.0, -(2.0 * far * near) / (far - near), 0.0),
    )
}

// MARK: - HeadTracker

/// Turns raw head poses into the view matrix shared by both eyes.
///
/// The content stays where it was when the view was last reset: rotation
/// relative to the reset orientation always applies, translation only in
/// free-camera mode.
#[derive(Debug, Clone)]
pub struct HeadTracker {
    anchor: Vec3,
    reset_rotation: Quat,
    free_camera: bool,
    reduce_flicker: bool,
    flicker_phase: u64,
}

impl HeadTracker {
    pub fn new(free_camera: bool, reduce_flicker: bool) -> Self {
        Self {
            anchor: Vec3::ZERO,
            reset_rotation: Quat::IDENTITY,
            free_camera,
            reduce_flicker,
            flicker_phase: 0,
        }
    }

    /// Make `head` the new forward direction and origin.
    pub fn reset(&mut self, head: &PoseMatrix) {
        self.anchor = head.translation();
        self.reset_rotation = head.rotation();
    }

    /// View matrix for this frame's head pose.
    pub fn view_matrix(&mut self, head: &PoseMatrix) -> Mat4 {
        if !self.free_camera {
            self.anchor = head.translation();
        }
        let mut view = head.to_mat4().inverse() * Mat4::from_translation(self.anchor);

        if self.reduce_flicker {
            let phase = self.flicker_phase as f32;
            view = view
                * Mat4::from_rotation_y(phase.cos() * FLICKER_AMPLITUDE)
                * Mat4::from_rotation_x(phase.sin() * FLICKER_AMPLITUDE);
            self.flicker_phase = self.flicker_phase.wrapping_add(1);
        }

        view * Mat4::from_quat(self.reset_rotation)
    }
}
