//! OpenXR pose source on the companion GLX context.
//!
//! ```text
//!   wait_get_poses ─► frame_waiter.wait ─► frame_stream.begin
//!                     locate VIEW in LOCAL        (head pose)
//!                     locate_views in VIEW        (eye-to-head, fov)
//!                     locate_views in LOCAL       (layer poses)
//!   submit(Left)   ─► blit resolved texture into swapchain[0]
//!   submit(Right)  ─► blit into swapchain[1] ─► frame_stream.end(layer)
//! ```

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use glam::{Mat4, Quat, Vec3};
use glow::HasContext;
use openxr as xr;
use tracing::{debug, info, warn};
use vrplayer_core::{Eye, PoseError, PoseMatrix, Resolution};

use crate::context::{ContextToken, GlDevice};
use crate::pose::{projection_from_fov, FramePoses, PoseEvent, PoseSource};

const VIEW_TYPE: xr::ViewConfigurationType = xr::ViewConfigurationType::PRIMARY_STEREO;
const IDLE_SLEEP: Duration = Duration::from_millis(5);

fn session_err(what: &str) -> impl FnOnce(xr::sys::Result) -> PoseError + '_ {
    move |e| PoseError::Session { reason: format!("{what}: {e}") }
}

fn frame_err(what: &str) -> impl FnOnce(xr::sys::Result) -> PoseError + '_ {
    move |e| PoseError::Frame { reason: format!("{what}: {e}") }
}

fn pose_to_mat4(pose: &xr::Posef) -> Mat4 {
    let o = pose.orientation;
    let p = pose.position;
    Mat4::from_rotation_translation(
        Quat::from_xyzw(o.x, o.y, o.z, o.w).normalize(),
        Vec3::new(p.x, p.y, p.z),
    )
}

fn choose_swapchain_format(formats: &[u32]) -> u32 {
    // Prefer linear RGBA8; eye images are already display-referred.
    [glow::RGBA8, glow::SRGB8_ALPHA8]
        .into_iter()
        .find(|f| formats.contains(f))
        .or_else(|| formats.first().copied())
        .unwrap_or(glow::RGBA8)
}

// MARK: - EyeSwapchain

struct EyeSwapchain {
    handle: xr::Swapchain<xr::OpenGL>,
    images: Vec<u32>,
}

struct PendingFrame {
    display_time: xr::Time,
    layer_views: [xr::View; 2],
    submitted: [bool; 2],
}

// MARK: - OpenXrPoseSource

pub struct OpenXrPoseSource {
    gl: Rc<glow::Context>,
    instance: xr::Instance,
    session: xr::Session<xr::OpenGL>,
    frame_waiter: xr::FrameWaiter,
    frame_stream: xr::FrameStream<xr::OpenGL>,
    local: xr::Space,
    view_space: xr::Space,
    action_set: xr::ActionSet,
    reset_action: xr::Action<bool>,
    click_action: xr::Action<bool>,
    queued: VecDeque<PoseEvent>,
    swapchains: [EyeSwapchain; 2],
    read_fbo: glow::Framebuffer,
    draw_fbo: glow::Framebuffer,
    render_size: Resolution,
    event_buffer: xr::EventDataBuffer,
    running: bool,
    focused: bool,
    actions_synced: bool,
    eye_to_head: [Mat4; 2],
    fov: [xr::Fovf; 2],
    frame: Option<PendingFrame>,
}

impl OpenXrPoseSource {
    /// Create an instance and a stereo session bound to the device's main
    /// context, which must be current.
    pub fn new(device: &GlDevice, _token: &ContextToken<'_>, gl: Rc<glow::Context>) -> Result<Self, PoseError> {
        let unavailable = |what: &str, e: &dyn std::fmt::Display| PoseError::RuntimeUnavailable {
            reason: format!("{what}: {e}"),
        };

        let entry = unsafe { xr::Entry::load() }.map_err(|e| unavailable("loading OpenXR loader", &e))?;
        let available = entry
            .enumerate_extensions()
            .map_err(|e| unavailable("enumerating extensions", &e))?;
        if !available.khr_opengl_enable {
            return Err(PoseError::RuntimeUnavailable {
                reason: "XR_KHR_opengl_enable not supported by the runtime".into(),
            });
        }
        let mut extensions = xr::ExtensionSet::default();
        extensions.khr_opengl_enable = true;

        let instance = entry
            .create_instance(
                &xr::ApplicationInfo {
                    application_name: "vr-video-player",
                    application_version: 1,
                    engine_name: "vr-video-player",
                    engine_version: 1,
                    api_version: xr::Version::new(1, 0, 0),
                },
                &extensions,
                &[],
            )
            .map_err(|e| unavailable("creating instance", &e))?;
        let props = instance.properties().map_err(|e| unavailable("instance properties", &e))?;
        info!("OpenXR runtime: {} {}", props.runtime_name, props.runtime_version);

        let system = instance
            .system(xr::FormFactor::HEAD_MOUNTED_DISPLAY)
            .map_err(|e| unavailable("no headset", &e))?;
        let requirements = instance
            .graphics_requirements::<xr::OpenGL>(system)
            .map_err(|e| unavailable("OpenGL requirements", &e))?;
        debug!(
            "OpenXR OpenGL requirements: {}..{}",
            requirements.min_api_version_supported, requirements.max_api_version_supported
        );

        let views = instance
            .enumerate_view_configuration_views(system, VIEW_TYPE)
            .map_err(session_err("view configuration"))?;
        let view = views.first().ok_or_else(|| PoseError::Session {
            reason: "runtime reported no stereo views".into(),
        })?;
        let render_size = Resolution::new(view.recommended_image_rect_width, view.recommended_image_rect_height);

        let handles = device.xlib_handles();
        let create_info = xr::opengl::SessionCreateInfo::Xlib {
            x_display: handles.display as *mut _,
            visualid: handles.visual_id,
            glx_fb_config: handles.fb_config as *mut _,
            glx_drawable: handles.drawable,
            glx_context: handles.context as *mut _,
        };
        let (session, frame_waiter, frame_stream) = unsafe { instance.create_session::<xr::OpenGL>(system, &create_info) }
            .map_err(session_err("creating session"))?;

        let local = session
            .create_reference_space(xr::ReferenceSpaceType::LOCAL, xr::Posef::IDENTITY)
            .map_err(session_err("LOCAL space"))?;
        let view_space = session
            .create_reference_space(xr::ReferenceSpaceType::VIEW, xr::Posef::IDENTITY)
            .map_err(session_err("VIEW space"))?;

        let (action_set, reset_action, click_action) = Self::create_actions(&instance, &session)?;

        let formats = session.enumerate_swapchain_formats().map_err(session_err("swapchain formats"))?;
        let format = choose_swapchain_format(&formats);
        let swapchain_info = xr::SwapchainCreateInfo {
            create_flags: xr::SwapchainCreateFlags::EMPTY,
            usage_flags: xr::SwapchainUsageFlags::COLOR_ATTACHMENT | xr::SwapchainUsageFlags::TRANSFER_DST,
            format,
            sample_count: 1,
            width: render_size.width,
            height: render_size.height,
            face_count: 1,
            array_size: 1,
            mip_count: 1,
        };
        let create_swapchain = || -> Result<EyeSwapchain, PoseError> {
            let handle = session.create_swapchain(&swapchain_info).map_err(session_err("swapchain"))?;
            let images = handle.enumerate_images().map_err(session_err("swapchain images"))?;
            Ok(EyeSwapchain { handle, images })
        };
        let swapchains = [create_swapchain()?, create_swapchain()?];

        let (read_fbo, draw_fbo) = unsafe {
            let read = gl.create_framebuffer().map_err(|reason| PoseError::Session { reason })?;
            let draw = gl.create_framebuffer().map_err(|reason| PoseError::Session { reason })?;
            (read, draw)
        };

        info!(
            "OpenXR session created: {} per eye, swapchain format {:#x}",
            render_size, format
        );

        let default_fov = xr::Fovf { angle_left: -0.8, angle_right: 0.8, angle_up: 0.8, angle_down: -0.8 };
        Ok(Self {
            gl,
            instance,
            session,
            frame_waiter,
            frame_stream,
            local,
            view_space,
            action_set,
            reset_action,
            click_action,
            queued: VecDeque::new(),
            swapchains,
            read_fbo,
            draw_fbo,
            render_size,
            event_buffer: xr::EventDataBuffer::new(),
            running: false,
            focused: false,
            actions_synced: false,
            eye_to_head: [Mat4::IDENTITY; 2],
            fov: [default_fov; 2],
            frame: None,
        })
    }

    fn create_actions(
        instance: &xr::Instance,
        session: &xr::Session<xr::OpenGL>,
    ) -> Result<(xr::ActionSet, xr::Action<bool>, xr::Action<bool>), PoseError> {
        let action_set = instance
            .create_action_set("player", "Player controls", 0)
            .map_err(session_err("action set"))?;
        let reset = action_set
            .create_action::<bool>("reset_view", "Reset view", &[])
            .map_err(session_err("reset action"))?;
        let click = action_set
            .create_action::<bool>("click", "Click", &[])
            .map_err(session_err("click action"))?;

        let profile = instance
            .string_to_path("/interaction_profiles/khr/simple_controller")
            .map_err(session_err("interaction profile"))?;
        let path = |p: &str| instance.string_to_path(p).map_err(session_err("binding path"));
        let bindings = [
            xr::Binding::new(&reset, path("/user/hand/left/input/select/click")?),
            xr::Binding::new(&reset, path("/user/hand/left/input/menu/click")?),
            xr::Binding::new(&reset, path("/user/hand/right/input/menu/click")?),
            xr::Binding::new(&click, path("/user/hand/right/input/select/click")?),
        ];
        if let Err(e) = instance.suggest_interaction_profile_bindings(profile, &bindings) {
            warn!("OpenXR: controller bindings rejected: {}", e);
        }
        session
            .attach_action_sets(&[&action_set])
            .map_err(session_err("attaching actions"))?;
        Ok((action_set, reset, click))
    }

    /// Sync controller actions once per frame and queue their transitions.
    fn sync_controls(&mut self) -> Result<(), PoseError> {
        if !self.focused || self.actions_synced {
            return Ok(());
        }
        self.actions_synced = true;
        self.session
            .sync_actions(&[xr::ActiveActionSet::new(&self.action_set)])
            .map_err(session_err("syncing actions"))?;

        let reset = self
            .reset_action
            .state(&self.session, xr::Path::NULL)
            .map_err(session_err("reset action state"))?;
        if reset.is_active && reset.changed_since_last_sync && reset.current_state {
            self.queued.push_back(PoseEvent::ResetRequested);
        }
        let click = self
            .click_action
            .state(&self.session, xr::Path::NULL)
            .map_err(session_err("click action state"))?;
        if click.is_active && click.changed_since_last_sync {
            self.queued.push_back(PoseEvent::Click { pressed: click.current_state });
        }
        Ok(())
    }

    fn finish_frame(&mut self, frame: PendingFrame) -> Result<(), PoseError> {
        let rect = xr::Rect2Di {
            offset: xr::Offset2Di { x: 0, y: 0 },
            extent: xr::Extent2Di {
                width: self.render_size.width as i32,
                height: self.render_size.height as i32,
            },
        };
        let projection_views: Vec<xr::CompositionLayerProjectionView<'_, xr::OpenGL>> = Eye::BOTH
            .iter()
            .map(|eye| {
                let i = eye.index();
                xr::CompositionLayerProjectionView::new()
                    .pose(frame.layer_views[i].pose)
                    .fov(frame.layer_views[i].fov)
                    .sub_image(
                        xr::SwapchainSubImage::new()
                            .swapchain(&self.swapchains[i].handle)
                            .image_array_index(0)
                            .image_rect(rect),
                    )
            })
            .collect();
        let layer = xr::CompositionLayerProjection::new()
            .space(&self.local)
            .views(&projection_views);
        let layers: [&xr::CompositionLayerBase<'_, xr::OpenGL>; 1] = [&layer];
        self.frame_stream
            .end(frame.display_time, xr::EnvironmentBlendMode::OPAQUE, &layers)
            .map_err(frame_err("ending frame"))
    }
}

impl PoseSource for OpenXrPoseSource {
    fn poll_event(&mut self) -> Result<Option<PoseEvent>, PoseError> {
        while let Some(event) = self
            .instance
            .poll_event(&mut self.event_buffer)
            .map_err(session_err("polling events"))?
        {
            match event {
                xr::Event::SessionStateChanged(change) => {
                    let state = change.state();
                    debug!("OpenXR session state: {:?}", state);
                    match state {
                        xr::SessionState::READY => {
                            self.session.begin(VIEW_TYPE).map_err(session_err("beginning session"))?;
                            self.running = true;
                            info!("OpenXR session running");
                        }
                        xr::SessionState::STOPPING => {
                            self.session.end().map_err(session_err("ending session"))?;
                            self.running = false;
                            self.focused = false;
                            return Ok(Some(PoseEvent::SessionIdle));
                        }
                        xr::SessionState::FOCUSED => self.focused = true,
                        xr::SessionState::VISIBLE => self.focused = false,
                        xr::SessionState::EXITING | xr::SessionState::LOSS_PENDING => {
                            return Ok(Some(PoseEvent::Quit));
                        }
                        _ => {}
                    }
                }
                xr::Event::InstanceLossPending(_) => return Ok(Some(PoseEvent::Quit)),
                _ => {}
            }
        }

        self.sync_controls()?;
        Ok(self.queued.pop_front())
    }

    fn wait_get_poses(&mut self) -> Result<FramePoses, PoseError> {
        self.actions_synced = false;
        let not_tracked = FramePoses { head: PoseMatrix::IDENTITY, valid: false, should_render: false };
        if !self.running {
            thread::sleep(IDLE_SLEEP);
            return Ok(not_tracked);
        }
        if let Some(stale) = self.frame.take() {
            warn!("OpenXR: previous frame never completed, dropping it");
            self.frame_stream
                .end(stale.display_time, xr::EnvironmentBlendMode::OPAQUE, &[])
                .map_err(frame_err("ending stale frame"))?;
        }

        let state = self.frame_waiter.wait().map_err(frame_err("waiting for frame"))?;
        self.frame_stream.begin().map_err(frame_err("beginning frame"))?;
        let time = state.predicted_display_time;

        let (_, eye_views) = self
            .session
            .locate_views(VIEW_TYPE, time, &self.view_space)
            .map_err(frame_err("locating eyes"))?;
        let (_, layer_views) = self
            .session
            .locate_views(VIEW_TYPE, time, &self.local)
            .map_err(frame_err("locating views"))?;
        let head = self
            .view_space
            .locate(&self.local, time)
            .map_err(frame_err("locating head"))?;

        let (eye_views, layer_views) = match (eye_views.as_slice(), layer_views.as_slice()) {
            ([l, r, ..], [ll, lr, ..]) => ([*l, *r], [*ll, *lr]),
            _ => {
                return Err(PoseError::Frame {
                    reason: "runtime returned fewer than two views".into(),
                })
            }
        };
        for eye in Eye::BOTH {
            self.eye_to_head[eye.index()] = pose_to_mat4(&eye_views[eye.index()].pose);
            self.fov[eye.index()] = eye_views[eye.index()].fov;
        }

        let valid = head.location_flags.contains(xr::SpaceLocationFlags::ORIENTATION_VALID);
        self.frame = Some(PendingFrame { display_time: time, layer_views, submitted: [false; 2] });
        Ok(FramePoses {
            head: PoseMatrix::from_mat4(&pose_to_mat4(&head.pose)),
            valid,
            should_render: state.should_render,
        })
    }

    fn eye_projection(&self, eye: Eye, near: f32, far: f32) -> Mat4 {
        let fov = self.fov[eye.index()];
        projection_from_fov(fov.angle_left, fov.angle_right, fov.angle_up, fov.angle_down, near, far)
    }

    fn eye_to_head(&self, eye: Eye) -> Mat4 {
        self.eye_to_head[eye.index()]
    }

    fn submit(
        &mut self,
        _token: &ContextToken<'_>,
        eye: Eye,
        texture: glow::Texture,
        size: Resolution,
    ) -> Result<(), PoseError> {
        let Some(frame) = self.frame.as_mut() else {
            return Ok(());
        };
        let i = eye.index();
        let swapchain = &mut self.swapchains[i];
        let image = swapchain.handle.acquire_image().map_err(frame_err("acquiring image"))?;
        swapchain
            .handle
            .wait_image(xr::Duration::from_nanos(5_000_000))
            .map_err(frame_err("waiting for image"))?;

        let target = swapchain
            .images
            .get(image as usize)
            .copied()
            .and_then(NonZeroU32::new)
            .map(glow::NativeTexture);
        if let Some(target) = target {
            let gl = &self.gl;
            let dst = self.render_size;
            unsafe {
                gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(self.read_fbo));
                gl.framebuffer_texture_2d(glow::READ_FRAMEBUFFER, glow::COLOR_ATTACHMENT0, glow::TEXTURE_2D, Some(texture), 0);
                gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(self.draw_fbo));
                gl.framebuffer_texture_2d(glow::DRAW_FRAMEBUFFER, glow::COLOR_ATTACHMENT0, glow::TEXTURE_2D, Some(target), 0);
                gl.blit_framebuffer(
                    0,
                    0,
                    size.width as i32,
                    size.height as i32,
                    0,
                    0,
                    dst.width as i32,
                    dst.height as i32,
                    glow::COLOR_BUFFER_BIT,
                    glow::LINEAR,
                );
                gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
                gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
            }
        }
        swapchain.handle.release_image().map_err(frame_err("releasing image"))?;

        frame.submitted[i] = true;
        if frame.submitted == [true, true] {
            if let Some(frame) = self.frame.take() {
                self.finish_frame(frame)?;
            }
        }
        Ok(())
    }

    fn skip_frame(&mut self) -> Result<(), PoseError> {
        match self.frame.take() {
            Some(frame) => self
                .frame_stream
                .end(frame.display_time, xr::EnvironmentBlendMode::OPAQUE, &[])
                .map_err(frame_err("skipping frame")),
            None => Ok(()),
        }
    }

    fn recommended_render_size(&self) -> Resolution {
        self.render_size
    }
}

impl Drop for OpenXrPoseSource {
    fn drop(&mut self) {
        unsafe {
            self.gl.delete_framebuffer(self.read_fbo);
            self.gl.delete_framebuffer(self.draw_fbo);
        }
        if self.running {
            if let Err(e) = self.session.request_exit() {
                debug!("OpenXR: request_exit failed: {}", e);
            }
        }
        debug!("OpenXR pose source released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_linear_rgba8() {
        assert_eq!(choose_swapchain_format(&[glow::SRGB8_ALPHA8, glow::RGBA8]), glow::RGBA8);
        assert_eq!(choose_swapchain_format(&[0x8C43]), glow::SRGB8_ALPHA8);
        assert_eq!(choose_swapchain_format(&[0x881A]), 0x881A);
        assert_eq!(choose_swapchain_format(&[]), glow::RGBA8);
    }

    #[test]
    fn pose_conversion_keeps_position_and_orientation() {
        let pose = xr::Posef {
            orientation: xr::Quaternionf { x: 0.0, y: 0.0, z: 0.0, w: 1.0 },
            position: xr::Vector3f { x: 0.032, y: 0.0, z: -0.01 },
        };
        let m = pose_to_mat4(&pose);
        assert_eq!(m.w_axis.truncate(), Vec3::new(0.032, 0.0, -0.01));
        assert_eq!(m.x_axis.truncate(), Vec3::X);
    }
}
