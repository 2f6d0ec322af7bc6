//! Per-frame orchestration: pose → view → two eyes → compositor → companion.

use std::rc::Rc;

use glam::Mat4;
use glow::HasContext;
use tracing::{debug, info};
use vrplayer_core::{CursorImage, Eye, FrameContext, PlayerError, RenderError, Resolution};
use vrplayer_projection::Mesh;

use crate::companion::CompanionView;
use crate::context::ContextToken;
use crate::cursor::CursorSprite;
use crate::framebuffer::StereoFramebufferSet;
use crate::mesh::MeshBuffer;
use crate::pose::{FramePoses, HeadTracker, PoseSource, FAR_CLIP, NEAR_CLIP};
use crate::shader::{Program, SCENE_FRAGMENT, SCENE_VERTEX};

const SOURCE_UNIT: u32 = 0;
const CURSOR_UNIT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Both eyes were drawn and handed to the compositor.
    Submitted,
    /// The compositor did not want this frame.
    Skipped,
}

/// Model-view-projection for one eye.
pub fn eye_mvp(projection: Mat4, eye_to_head: Mat4, view: Mat4) -> Mat4 {
    projection * eye_to_head.inverse() * view
}

// MARK: - ViewState

/// Head tracking state carried across frames.
///
/// A reset request waits for the next frame with a tracked pose. Frames
/// without tracking reuse the last good view.
#[derive(Debug, Clone)]
pub struct ViewState {
    tracker: HeadTracker,
    reset_pending: bool,
    last_view: Mat4,
}

impl ViewState {
    pub fn new(tracker: HeadTracker) -> Self {
        // First tracked frame defines forward.
        Self { tracker, reset_pending: true, last_view: Mat4::IDENTITY }
    }

    pub fn request_reset(&mut self) {
        self.reset_pending = true;
    }

    pub fn advance(&mut self, poses: &FramePoses) -> Mat4 {
        if !poses.valid {
            return self.last_view;
        }
        if self.reset_pending {
            self.tracker.reset(&poses.head);
            self.reset_pending = false;
            info!("View reset");
        }
        self.last_view = self.tracker.view_matrix(&poses.head);
        self.last_view
    }
}

// MARK: - RenderPipeline

struct SceneUniforms {
    mvp: glow::UniformLocation,
    uv_scale: glow::UniformLocation,
    uv_offset: glow::UniformLocation,
    cursor_location: glow::UniformLocation,
    cursor_size: glow::UniformLocation,
}

pub struct RenderPipeline {
    gl: Rc<glow::Context>,
    scene: Program,
    uniforms: SceneUniforms,
    mesh: MeshBuffer,
    cursor: CursorSprite,
    eyes: StereoFramebufferSet,
    companion: CompanionView,
    view: ViewState,
}

impl RenderPipeline {
    pub fn new(
        _token: &ContextToken<'_>,
        gl: Rc<glow::Context>,
        mesh: &Mesh,
        eye_size: Resolution,
        tracker: HeadTracker,
    ) -> Result<Self, RenderError> {
        let scene = Program::compile(&gl, "scene", SCENE_VERTEX, SCENE_FRAGMENT)?;
        let uniforms = SceneUniforms {
            mvp: scene.uniform(&gl, "mvp")?,
            uv_scale: scene.uniform(&gl, "uv_scale")?,
            uv_offset: scene.uniform(&gl, "uv_offset")?,
            cursor_location: scene.uniform(&gl, "cursor_location")?,
            cursor_size: scene.uniform(&gl, "cursor_size")?,
        };
        let source_sampler = scene.uniform(&gl, "source")?;
        let cursor_sampler = scene.uniform(&gl, "cursor")?;
        unsafe {
            gl.use_program(Some(scene.raw));
            gl.uniform_1_i32(Some(&source_sampler), SOURCE_UNIT as i32);
            gl.uniform_1_i32(Some(&cursor_sampler), CURSOR_UNIT as i32);
            gl.use_program(None);
        }

        let mesh = MeshBuffer::new(&gl, mesh)?;
        let cursor = CursorSprite::new(&gl)?;
        let eyes = StereoFramebufferSet::create(&gl, eye_size)?;
        let companion = CompanionView::new(&gl)?;
        info!("RenderPipeline ready: eyes {}", eyes.size());

        Ok(Self {
            gl,
            scene,
            uniforms,
            mesh,
            cursor,
            eyes,
            companion,
            view: ViewState::new(tracker),
        })
    }

    pub fn gl(&self) -> &Rc<glow::Context> {
        &self.gl
    }

    /// Replace the drawn mesh after a resize or zoom change.
    pub fn set_mesh(&mut self, _token: &ContextToken<'_>, mesh: &Mesh) {
        self.mesh.replace(&self.gl, mesh);
    }

    pub fn update_cursor(&mut self, _token: &ContextToken<'_>, image: &CursorImage) {
        self.cursor.upload(&self.gl, image);
    }

    pub fn cursor(&self) -> &CursorSprite {
        &self.cursor
    }

    pub fn request_reset(&mut self) {
        self.view.request_reset();
    }

    /// Draw one frame. `content` is the texture shown on the mesh; without
    /// one the eyes are cleared to black.
    pub fn render_frame<P: PoseSource>(
        &mut self,
        token: &ContextToken<'_>,
        pose: &mut P,
        content: Option<glow::Texture>,
        frame: &FrameContext,
        companion_size: Resolution,
    ) -> Result<FrameOutcome, PlayerError> {
        let poses = pose.wait_get_poses()?;
        if !poses.should_render {
            pose.skip_frame()?;
            self.companion.draw(&self.gl, &self.eyes, companion_size);
            token.swap_buffers();
            return Ok(FrameOutcome::Skipped);
        }

        let view = self.view.advance(&poses);
        for eye in Eye::BOTH {
            let mvp = eye_mvp(
                pose.eye_projection(eye, NEAR_CLIP, FAR_CLIP),
                pose.eye_to_head(eye),
                view,
            );
            self.draw_eye(eye, mvp, content, frame);
        }
        for eye in Eye::BOTH {
            let target = self.eyes.eye(eye);
            pose.submit(token, eye, target.texture(), target.size())?;
        }

        self.companion.draw(&self.gl, &self.eyes, companion_size);
        token.swap_buffers();
        Ok(FrameOutcome::Submitted)
    }

    fn draw_eye(&self, eye: Eye, mvp: Mat4, content: Option<glow::Texture>, frame: &FrameContext) {
        let gl = &self.gl;
        let target = self.eyes.eye(eye);
        target.bind_for_render(gl);
        unsafe {
            gl.enable(glow::DEPTH_TEST);
            gl.clear_color(0.0, 0.0, 0.0, 1.0);
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);

            if let Some(texture) = content {
                let window = frame.layout.uv_window(eye);
                let cursor_size = frame.cursor_size_uniform();
                let cursor_location = frame.cursor_location(eye);

                gl.use_program(Some(self.scene.raw));
                gl.uniform_matrix_4_f32_slice(Some(&self.uniforms.mvp), false, &mvp.to_cols_array());
                gl.uniform_1_f32(Some(&self.uniforms.uv_scale), window.scale);
                gl.uniform_1_f32(Some(&self.uniforms.uv_offset), window.offset);
                gl.uniform_2_f32(Some(&self.uniforms.cursor_size), cursor_size.x, cursor_size.y);
                gl.uniform_2_f32(Some(&self.uniforms.cursor_location), cursor_location.x, cursor_location.y);

                gl.active_texture(glow::TEXTURE0 + SOURCE_UNIT);
                gl.bind_texture(glow::TEXTURE_2D, Some(texture));
                gl.active_texture(glow::TEXTURE0 + CURSOR_UNIT);
                gl.bind_texture(glow::TEXTURE_2D, Some(self.cursor.texture()));

                self.mesh.draw(gl);

                gl.bind_texture(glow::TEXTURE_2D, None);
                gl.active_texture(glow::TEXTURE0 + SOURCE_UNIT);
                gl.bind_texture(glow::TEXTURE_2D, None);
                gl.use_program(None);
            }
            gl.disable(glow::DEPTH_TEST);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
        target.resolve(gl);
    }

    pub fn destroy(self, _token: &ContextToken<'_>) {
        let gl = &self.gl;
        self.scene.destroy(gl);
        self.mesh.destroy(gl);
        self.cursor.destroy(gl);
        self.eyes.destroy(gl);
        self.companion.destroy(gl);
        debug!("RenderPipeline released");
    }
}
