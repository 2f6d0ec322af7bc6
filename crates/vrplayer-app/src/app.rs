//! Main loop.
//!
//! ```text
//!   X events ──────┐
//!   pose events ───┼──► PlayerAction ──► apply (reset, zoom, seek, pointer, quit)
//!   signals ───────┘
//!   bridge events ────► video texture / end of playback
//!   SourceCapture ────► CaptureSurface::on_resize ──► mesh rebuild
//!   FrameContext ─────► RenderPipeline::render_frame ──► HMD + companion
//! ```
//!
//! Everything runs on the main thread with the main context current, except
//! video decoding which lives on the bridge's thread.

use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use glam::Vec2;
use tracing::{debug, info, warn};
use vrplayer_capture::{
    CaptureBackend, CaptureSurface, GlxPixmapBackend, ResizeDebouncer, WindowEvent, WindowGeometry, X11Display,
};
use vrplayer_core::{
    CaptureError, ErrorClass, FrameContext, MouseButton, PlayerAction, PlayerConfig, PlayerError, Resolution,
    SourceSelection, WindowId,
};
use vrplayer_decoder::{BridgeEvent, DecodeRenderBridge};
use vrplayer_input::{apply_zoom, companion_action, global_action, HotkeyGrabs, PointerInjector};
use vrplayer_renderer::{
    ContextKind, ContextToken, FrameOutcome, GlDevice, HeadTracker, OpenXrPoseSource, PoseEvent, PoseSource,
    RenderPipeline,
};

use crate::notify;
use crate::signals::Signals;
use crate::throttle::LogThrottle;
use crate::zoom::ZoomFile;

/// Extra texels trimmed from each cube face of a captured window.
const WINDOW_SEAM_INSET: u32 = 2;
const WARN_INTERVAL: Duration = Duration::from_secs(5);

// MARK: - Routing

/// Action for a key press, by the window that received it.
///
/// The companion window gets the full key map; the root window and the
/// captured window only react to the global Alt combinations.
pub fn key_action(window: WindowId, companion: WindowId, keysym: u64, modifiers: u32) -> Option<PlayerAction> {
    if window == companion {
        companion_action(keysym)
    } else {
        global_action(keysym, modifiers)
    }
}

/// Window to switch to after a focus change, if any.
pub fn focus_target(current: Option<WindowId>, focused: Option<WindowId>, companion: WindowId) -> Option<WindowId> {
    let focused = focused?;
    (focused != companion && Some(focused) != current).then_some(focused)
}

/// Actions for a controller trigger transition on a window of `size`.
///
/// A press with the pointer outside the window first moves it to the centre
/// so the click lands on the source.
pub fn click_actions(pressed: bool, pointer: Option<(i32, i32)>, size: Resolution) -> Vec<PlayerAction> {
    let inside = pointer.is_some_and(|(x, y)| {
        x >= 0 && y >= 0 && (x as u32) < size.width && (y as u32) < size.height
    });
    let mut actions = Vec::with_capacity(2);
    if pressed && !inside {
        actions.push(PlayerAction::PointerMove { x: 0.5, y: 0.5 });
    }
    actions.push(PlayerAction::PointerButton { button: MouseButton::Left, pressed });
    actions
}

// MARK: - Content sources

/// Capture of the source window, driven by geometry events. Touches the
/// window system only through its [`CaptureBackend`] and the callbacks
/// handed to [`settle`](Self::settle).
struct SourceCapture<B: CaptureBackend> {
    target: Option<WindowId>,
    surface: Option<CaptureSurface<B>>,
    window_size: Resolution,
    border_inset: u32,
    debouncer: ResizeDebouncer,
}

impl<B: CaptureBackend> SourceCapture<B> {
    fn new() -> Self {
        Self {
            target: None,
            surface: None,
            window_size: Resolution::new(0, 0),
            border_inset: 0,
            debouncer: ResizeDebouncer::default(),
        }
    }

    /// Drop the current capture and point at `window`.
    fn retarget(&mut self, window: WindowId) {
        if let Some(old) = self.surface.take() {
            old.deinit();
        }
        self.target = Some(window);
        self.debouncer.cancel();
    }

    fn is_target(&self, window: WindowId) -> bool {
        self.target == Some(window)
    }

    /// A configure event for the target restarts the settle period when the
    /// size actually changed.
    fn on_configure(&mut self, window: WindowId, size: Resolution, now: Instant) {
        if self.is_target(window) && self.window_size != size {
            self.window_size = size;
            self.debouncer.notify(now);
        }
    }

    fn on_visible(&mut self, window: WindowId, now: Instant) {
        if self.is_target(window) {
            self.debouncer.notify(now);
        }
    }

    /// Rebind against `geometry`. Creates the surface again when an earlier
    /// attempt left none.
    fn bind(
        &mut self,
        geometry: WindowGeometry,
        backend: impl FnOnce() -> Result<B, CaptureError>,
    ) -> Result<(), CaptureError> {
        let Some(window) = self.target else {
            return Ok(());
        };
        self.window_size = geometry.size();
        self.border_inset = geometry.border + WINDOW_SEAM_INSET;

        match &mut self.surface {
            Some(surface) => surface.on_resize(),
            None => {
                self.surface = Some(CaptureSurface::init(backend()?, window)?);
                Ok(())
            }
        }
    }

    /// Rebind once the last burst of events has settled. `None` while
    /// nothing is due.
    fn settle(
        &mut self,
        now: Instant,
        geometry: impl FnOnce(WindowId) -> Result<WindowGeometry, CaptureError>,
        backend: impl FnOnce() -> Result<B, CaptureError>,
    ) -> Option<Result<(), CaptureError>> {
        if !self.debouncer.poll(now) {
            return None;
        }
        let window = self.target?;
        Some(geometry(window).and_then(|geometry| self.bind(geometry, backend)))
    }

    fn suspend(&mut self) {
        if let Some(surface) = self.surface.take() {
            warn!("Capture[{}] suspended", surface.window());
            surface.deinit();
        }
        self.debouncer.cancel();
    }

    fn texture(&self) -> Option<B::Texture> {
        self.surface.as_ref().and_then(|s| s.texture())
    }

    fn texture_size(&self) -> Option<Resolution> {
        self.surface.as_ref().filter(|s| s.is_bound()).map(|s| s.size())
    }

    /// Texture size and cube-face inset the mesh is built from.
    fn mesh_source(&self) -> Option<(Resolution, u32)> {
        self.texture_size().map(|size| (size, self.border_inset))
    }
}

struct WindowSource {
    follow_focused: bool,
    capture: SourceCapture<GlxPixmapBackend>,
    injector: Option<PointerInjector>,
}

impl WindowSource {
    fn new(follow_focused: bool) -> Self {
        Self { follow_focused, capture: SourceCapture::new(), injector: None }
    }

    /// Capture `window`, replacing whatever was captured before.
    fn select(&mut self, display: &Arc<X11Display>, gl: &Rc<glow::Context>, window: WindowId) -> Result<(), CaptureError> {
        info!("Source window is now {}", window);
        self.capture.retarget(window);
        display.watch_window(window);
        self.injector
            .get_or_insert_with(|| PointerInjector::new(Arc::clone(display), window))
            .set_window(window);
        let geometry = display.window_geometry(window)?;
        self.capture.bind(geometry, || GlxPixmapBackend::new(Arc::clone(display), Rc::clone(gl)))
    }
}

struct VideoSource {
    bridge: Option<DecodeRenderBridge>,
    texture: Option<glow::Texture>,
    size: Resolution,
}

enum Content {
    Window(WindowSource),
    Video(VideoSource),
}

// MARK: - Player

#[derive(Debug, Clone, Copy, PartialEq)]
struct MeshKey {
    source: Resolution,
    zoom: u32,
    border_inset: u32,
}

impl MeshKey {
    fn new(source: Resolution, zoom: f32, border_inset: u32) -> Self {
        Self { source, zoom: zoom.to_bits(), border_inset }
    }

    /// Key of the mesh `source` needs at `zoom`, when it differs from `current`.
    fn stale(current: Option<MeshKey>, source: Option<(Resolution, u32)>, zoom: f32) -> Option<MeshKey> {
        let (size, border_inset) = source?;
        let key = Self::new(size, zoom, border_inset);
        (current != Some(key)).then_some(key)
    }
}

struct Player {
    config: PlayerConfig,
    display: Arc<X11Display>,
    gl: Rc<glow::Context>,
    companion: WindowId,
    companion_size: Resolution,
    content: Content,
    pipeline: RenderPipeline,
    zoom_file: ZoomFile,
    mesh_key: Option<MeshKey>,
    cursor_aspect: f32,
    frame_warnings: LogThrottle,
    quit: bool,
}

/// Set up every subsystem for `config` and run until asked to quit.
pub fn run(config: PlayerConfig) -> Result<()> {
    let display = Arc::new(X11Display::open(None)?);
    if !config.source.is_video() {
        display.check_composite()?;
    }

    let device = GlDevice::new(Arc::clone(&display))?;
    let token = device.make_current(ContextKind::Main)?;
    let gl = token.load_gl();

    let mut pose = OpenXrPoseSource::new(&device, &token, Rc::clone(&gl)).context("starting VR session")?;
    let signals = Signals::install()?;
    let _hotkeys = HotkeyGrabs::grab(Arc::clone(&display));

    let content = match &config.source {
        SourceSelection::Window { id } => {
            let mut source = WindowSource::new(false);
            source
                .select(&display, &gl, *id)
                .with_context(|| format!("capturing window {id}"))?;
            Content::Window(source)
        }
        SourceSelection::FollowFocused => {
            display.watch_focus();
            Content::Window(WindowSource::new(true))
        }
        SourceSelection::Video { path } => {
            let bridge = vrplayer_decoder::spawn_mpv(Arc::clone(&device), path.clone())?;
            Content::Video(VideoSource { bridge: Some(bridge), texture: None, size: Resolution::new(1, 1) })
        }
    };

    let mut player = Player::new(config, &device, &token, gl, content, pose.recommended_render_size())?;
    let result = player.run(&token, &mut pose, &signals);
    player.shutdown(&token);
    drop(pose);
    result
}

impl Player {
    fn new(
        config: PlayerConfig,
        device: &GlDevice,
        token: &ContextToken<'_>,
        gl: Rc<glow::Context>,
        content: Content,
        eye_size: Resolution,
    ) -> Result<Self, PlayerError> {
        let (source, border_inset) = match &content {
            Content::Window(w) => w.capture.mesh_source().unwrap_or((Resolution::new(1, 1), w.capture.border_inset)),
            Content::Video(v) => (v.size, 0),
        };
        let mesh = vrplayer_projection::build(config.topology, source, config.zoom, config.stretch, border_inset);
        let tracker = HeadTracker::new(config.free_camera, config.reduce_flicker);
        let pipeline = RenderPipeline::new(token, Rc::clone(&gl), &mesh, eye_size, tracker)?;

        let mut player = Self {
            zoom_file: ZoomFile::for_source(&config.source),
            display: Arc::clone(device.display()),
            companion: device.companion_window(),
            companion_size: Resolution::COMPANION,
            mesh_key: Some(MeshKey::new(source, config.zoom, border_inset)),
            cursor_aspect: mesh.cursor_aspect,
            config,
            gl,
            content,
            pipeline,
            frame_warnings: LogThrottle::new(WARN_INTERVAL),
            quit: false,
        };
        player.refresh_cursor(token);
        if matches!(&player.content, Content::Window(w) if w.follow_focused) {
            player.follow_focus(token);
        }
        Ok(player)
    }

    fn run<P: PoseSource>(&mut self, token: &ContextToken<'_>, pose: &mut P, signals: &Signals) -> Result<()> {
        info!(
            "Showing {:?} on {} ({:?}), zoom {}",
            self.config.source, self.config.topology, self.config.layout, self.config.zoom
        );
        while !self.quit {
            if signals.quit_requested() {
                info!("Termination signal received");
                break;
            }
            if signals.take_reset() {
                self.pipeline.request_reset();
            }

            let now = Instant::now();
            for event in self.display.poll_events() {
                if let Some(action) = self.handle_window_event(token, event, now) {
                    self.apply(action);
                }
            }
            self.poll_pose(pose)?;
            self.poll_bridge()?;
            self.settle_resize(token, now);
            self.sync_mesh(token);

            let (texture, frame) = self.frame_context();
            match self.pipeline.render_frame(token, pose, texture, &frame, self.companion_size) {
                Ok(FrameOutcome::Submitted) => {}
                Ok(FrameOutcome::Skipped) => debug!("Frame skipped by compositor"),
                Err(e) if e.class() == ErrorClass::PoseSource || e.class() == ErrorClass::ResourceAcquisitionFailure => {
                    if let Some(suppressed) = self.frame_warnings.ready(now) {
                        warn!("Frame dropped: {} ({} similar suppressed)", e, suppressed);
                    }
                }
                Err(e) => return Err(e).context("rendering frame"),
            }
        }
        Ok(())
    }

    // MARK: Events

    fn handle_window_event(&mut self, token: &ContextToken<'_>, event: WindowEvent, now: Instant) -> Option<PlayerAction> {
        match event {
            WindowEvent::Configure { window, size } if window == self.companion => {
                self.companion_size = size;
                None
            }
            WindowEvent::Configure { window, size } => {
                if let Content::Window(source) = &mut self.content {
                    source.capture.on_configure(window, size, now);
                }
                None
            }
            WindowEvent::Visibility { window, visible: true } => {
                if let Content::Window(source) = &mut self.content {
                    source.capture.on_visible(window, now);
                }
                None
            }
            WindowEvent::Visibility { .. } => None,
            WindowEvent::Key { window, keysym, modifiers, pressed: true } => {
                key_action(window, self.companion, keysym, modifiers)
            }
            WindowEvent::Key { .. } => None,
            WindowEvent::Destroyed { window } => {
                if let Content::Window(source) = &mut self.content {
                    if source.capture.is_target(window) {
                        warn!("Source window {} was destroyed", window);
                        source.capture.suspend();
                    }
                }
                None
            }
            WindowEvent::CloseRequested { window } if window == self.companion => Some(PlayerAction::Quit),
            WindowEvent::CloseRequested { .. } => None,
            WindowEvent::CursorChanged => {
                self.refresh_cursor(token);
                None
            }
            WindowEvent::ActiveWindowChanged => {
                self.follow_focus(token);
                None
            }
        }
    }

    fn poll_pose<P: PoseSource>(&mut self, pose: &mut P) -> Result<(), PlayerError> {
        while let Some(event) = pose.poll_event()? {
            match event {
                PoseEvent::ResetRequested => self.apply(PlayerAction::ResetRotation),
                PoseEvent::Quit => {
                    info!("VR runtime asked to quit");
                    self.apply(PlayerAction::Quit);
                }
                PoseEvent::SessionIdle => debug!("VR session idle"),
                PoseEvent::Click { pressed } => {
                    let Content::Window(source) = &self.content else {
                        continue;
                    };
                    let Some(window) = source.capture.target else {
                        continue;
                    };
                    let pointer = self.display.pointer_position(window);
                    for action in click_actions(pressed, pointer, source.capture.window_size) {
                        self.apply(action);
                    }
                }
            }
        }
        Ok(())
    }

    fn poll_bridge(&mut self) -> Result<(), PlayerError> {
        let Content::Video(video) = &mut self.content else {
            return Ok(());
        };
        let Some(bridge) = &video.bridge else {
            return Ok(());
        };
        while let Some(event) = bridge.try_event() {
            match event {
                BridgeEvent::Ready { texture, size } => {
                    info!("Video ready at {}", size);
                    video.texture = Some(texture);
                    video.size = size;
                }
                BridgeEvent::Ended => {
                    info!("Video ended");
                    video.texture = None;
                    notify::video_ended();
                    self.quit = true;
                }
                BridgeEvent::Failed(e) => {
                    video.texture = None;
                    if e.class() == ErrorClass::UpstreamFatalEvent {
                        notify::playback_error(&e.to_string());
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn settle_resize(&mut self, token: &ContextToken<'_>, now: Instant) {
        let Content::Window(source) = &mut self.content else {
            return;
        };
        let (display, gl) = (&self.display, &self.gl);
        let settled = source.capture.settle(
            now,
            |window| display.window_geometry(window),
            || GlxPixmapBackend::new(Arc::clone(display), Rc::clone(gl)),
        );
        let Some(result) = settled else {
            return;
        };
        match result {
            Ok(()) => debug!("Source window settled at {}", source.capture.window_size),
            Err(e) if e.class() == ErrorClass::InvalidWindowReference => {
                warn!("Source window unavailable: {}", e);
                source.capture.suspend();
            }
            Err(e) => warn!("Capture rebuild failed, retrying on next resize: {}", e),
        }
        self.refresh_cursor(token);
    }

    fn follow_focus(&mut self, token: &ContextToken<'_>) {
        let Content::Window(source) = &mut self.content else {
            return;
        };
        if !source.follow_focused {
            return;
        }
        let Some(window) = focus_target(source.capture.target, self.display.focused_window(), self.companion) else {
            return;
        };
        if let Err(e) = source.select(&self.display, &self.gl, window) {
            warn!("Cannot capture focused window {}: {}", window, e);
        }
        self.refresh_cursor(token);
    }

    fn refresh_cursor(&mut self, token: &ContextToken<'_>) {
        if !self.config.cursor_enabled() {
            return;
        }
        if let Some(image) = self.display.cursor_image() {
            self.pipeline.update_cursor(token, &image);
        }
    }

    // MARK: Actions

    fn apply(&mut self, action: PlayerAction) {
        debug!("Action {:?}", action);
        match action {
            PlayerAction::ResetRotation => self.pipeline.request_reset(),
            PlayerAction::Quit => self.quit = true,
            PlayerAction::ZoomIn | PlayerAction::ZoomOut => {
                if let Some(zoom) = apply_zoom(action, self.config.topology, self.config.zoom) {
                    self.config.zoom = zoom;
                    info!("Zoom {}", zoom);
                    self.zoom_file.write(zoom);
                }
            }
            PlayerAction::Seek { offset_seconds } => {
                if let Content::Video(VideoSource { bridge: Some(bridge), .. }) = &self.content {
                    bridge.seek(offset_seconds);
                }
            }
            PlayerAction::TogglePause => {
                if let Content::Video(VideoSource { bridge: Some(bridge), .. }) = &self.content {
                    bridge.toggle_pause();
                }
            }
            PlayerAction::PointerMove { x, y } => {
                if let Content::Window(WindowSource { injector: Some(injector), capture, .. }) = &self.content {
                    injector.move_to(x, y, capture.window_size);
                }
            }
            PlayerAction::PointerButton { button, pressed } => {
                if let Content::Window(WindowSource { injector: Some(injector), .. }) = &self.content {
                    injector.button(button, pressed);
                }
            }
        }
    }

    // MARK: Frame

    fn mesh_source(&self) -> Option<(Resolution, u32)> {
        match &self.content {
            Content::Window(w) => w.capture.mesh_source(),
            Content::Video(v) => v.texture.map(|_| (v.size, 0)),
        }
    }

    /// Rebuild the mesh when the source size, zoom or inset changed.
    fn sync_mesh(&mut self, token: &ContextToken<'_>) {
        let Some(key) = MeshKey::stale(self.mesh_key, self.mesh_source(), self.config.zoom) else {
            return;
        };
        let c = &self.config;
        let mesh = vrplayer_projection::build(c.topology, key.source, c.zoom, c.stretch, key.border_inset);
        self.pipeline.set_mesh(token, &mesh);
        self.cursor_aspect = mesh.cursor_aspect;
        self.mesh_key = Some(key);
    }

    fn frame_context(&self) -> (Option<glow::Texture>, FrameContext) {
        let cursor = self.pipeline.cursor();
        let (hot_x, hot_y) = cursor.hotspot();
        let mut frame = FrameContext {
            source_size: Resolution::new(1, 1),
            pointer: Vec2::ZERO,
            cursor_size: cursor.size(),
            cursor_hotspot: Vec2::new(hot_x as f32, hot_y as f32),
            cursor_scale: self.config.cursor_scale,
            cursor_aspect: self.cursor_aspect,
            cursor_wrap: self.config.cursor_wrap,
            layout: self.config.layout,
            show_cursor: false,
        };

        let texture = match &self.content {
            Content::Window(source) => {
                if let (Some(window), Some(size)) = (source.capture.target, source.capture.texture_size()) {
                    frame.source_size = size;
                    if let Some((x, y)) = self.display.pointer_position(window) {
                        frame.pointer = Vec2::new(x as f32, y as f32);
                    }
                    frame.show_cursor = self.config.cursor_enabled();
                }
                source.capture.texture()
            }
            Content::Video(video) => {
                frame.source_size = video.size;
                video.texture
            }
        };
        (texture, frame)
    }

    /// Stop decoding, then release GPU objects while the main context is
    /// still current.
    fn shutdown(self, token: &ContextToken<'_>) {
        let Self { content, pipeline, .. } = self;
        match content {
            Content::Video(mut video) => {
                if let Some(bridge) = video.bridge.take() {
                    bridge.shutdown();
                }
            }
            Content::Window(mut source) => source.capture.suspend(),
        }
        pipeline.destroy(token);
        info!("Player stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use x11::keysym;

    const COMPANION: WindowId = WindowId(0x100);
    const SOURCE: WindowId = WindowId(0x3a00007);

    #[test]
    fn companion_gets_full_key_map() {
        assert_eq!(key_action(COMPANION, COMPANION, keysym::XK_w as u64, 0), Some(PlayerAction::ResetRotation));
        assert_eq!(key_action(COMPANION, COMPANION, keysym::XK_space as u64, 0), Some(PlayerAction::TogglePause));
    }

    #[test]
    fn other_windows_only_see_global_hotkeys() {
        let alt = x11::xlib::Mod1Mask;
        assert_eq!(key_action(SOURCE, COMPANION, keysym::XK_w as u64, 0), None);
        assert_eq!(key_action(SOURCE, COMPANION, keysym::XK_q as u64, 0), None);
        assert_eq!(key_action(SOURCE, COMPANION, keysym::XK_q as u64, alt), Some(PlayerAction::ZoomIn));
        assert_eq!(
            key_action(WindowId(1), COMPANION, keysym::XK_F1 as u64, alt | x11::xlib::Mod2Mask),
            Some(PlayerAction::ResetRotation)
        );
    }

    #[test]
    fn focus_ignores_companion_and_current() {
        assert_eq!(focus_target(None, Some(SOURCE), COMPANION), Some(SOURCE));
        assert_eq!(focus_target(Some(SOURCE), Some(SOURCE), COMPANION), None);
        assert_eq!(focus_target(Some(SOURCE), Some(COMPANION), COMPANION), None);
        assert_eq!(focus_target(Some(SOURCE), None, COMPANION), None);
        assert_eq!(focus_target(Some(SOURCE), Some(WindowId(7)), COMPANION), Some(WindowId(7)));
    }

    #[test]
    fn click_outside_window_recentres_pointer_first() {
        let size = Resolution::new(800, 600);
        let left = |pressed| PlayerAction::PointerButton { button: MouseButton::Left, pressed };

        assert_eq!(click_actions(true, Some((10, 10)), size), vec![left(true)]);
        assert_eq!(
            click_actions(true, Some((900, 10)), size),
            vec![PlayerAction::PointerMove { x: 0.5, y: 0.5 }, left(true)]
        );
        assert_eq!(click_actions(true, None, size).len(), 2);
        assert_eq!(click_actions(false, Some((-5, 10)), size), vec![left(false)]);
    }

    // ── Capture wiring ──

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Check,
        Redirect,
        Unredirect,
        Geometry,
        Config(i32),
        CreateTexture(u32),
        DeleteTexture(u32),
        NamePixmap(u64),
        FreePixmap(u64),
        Bind(u64, u64),
        Release(u64),
        Configure(u32),
    }

    #[derive(Default)]
    struct Server {
        ops: Vec<Op>,
        next_id: u64,
        width: u32,
        height: u32,
        live_pixmaps: usize,
        live_bound: usize,
    }

    #[derive(Clone)]
    struct Recorder(Rc<RefCell<Server>>);

    impl Recorder {
        fn new(width: u32, height: u32) -> Self {
            Self(Rc::new(RefCell::new(Server { width, height, next_id: 100, ..Default::default() })))
        }

        fn resize(&self, width: u32, height: u32) {
            let mut server = self.0.borrow_mut();
            server.width = width;
            server.height = height;
        }

        fn geometry_now(&self) -> WindowGeometry {
            let server = self.0.borrow();
            WindowGeometry { width: server.width, height: server.height, border: 0, depth: 24, viewable: true }
        }

        fn take_ops(&self) -> Vec<Op> {
            std::mem::take(&mut self.0.borrow_mut().ops)
        }

        fn next_id(&self) -> u64 {
            let mut server = self.0.borrow_mut();
            server.next_id += 1;
            server.next_id
        }

        fn record(&self, op: Op) {
            self.0.borrow_mut().ops.push(op);
        }
    }

    impl CaptureBackend for Recorder {
        type Texture = u32;
        type Config = i32;

        fn check_supported(&mut self) -> Result<(), CaptureError> {
            self.record(Op::Check);
            Ok(())
        }

        fn redirect(&mut self, _window: WindowId) {
            self.record(Op::Redirect);
        }

        fn unredirect(&mut self, _window: WindowId) {
            self.record(Op::Unredirect);
        }

        fn geometry(&mut self, _window: WindowId) -> Result<WindowGeometry, CaptureError> {
            self.record(Op::Geometry);
            Ok(self.geometry_now())
        }

        fn choose_config(&mut self, depth: i32) -> Result<i32, CaptureError> {
            self.record(Op::Config(depth));
            Ok(depth)
        }

        fn create_texture(&mut self) -> Result<u32, CaptureError> {
            let id = self.next_id() as u32;
            self.record(Op::CreateTexture(id));
            Ok(id)
        }

        fn delete_texture(&mut self, texture: u32) {
            self.record(Op::DeleteTexture(texture));
        }

        fn name_pixmap(&mut self, _window: WindowId) -> Result<u64, CaptureError> {
            let id = self.next_id();
            self.0.borrow_mut().live_pixmaps += 1;
            self.record(Op::NamePixmap(id));
            Ok(id)
        }

        fn free_pixmap(&mut self, pixmap: u64) {
            self.0.borrow_mut().live_pixmaps -= 1;
            self.record(Op::FreePixmap(pixmap));
        }

        fn bind_pixmap(&mut self, pixmap: u64, _config: i32, _texture: u32) -> Result<u64, CaptureError> {
            let id = self.next_id();
            self.0.borrow_mut().live_bound += 1;
            self.record(Op::Bind(pixmap, id));
            Ok(id)
        }

        fn release_pixmap(&mut self, bound: u64) {
            self.0.borrow_mut().live_bound -= 1;
            self.record(Op::Release(bound));
        }

        fn configure_texture(&mut self, texture: u32) {
            self.record(Op::Configure(texture));
        }
    }

    fn bound_capture(rec: &Recorder) -> SourceCapture<Recorder> {
        let mut capture = SourceCapture::new();
        capture.retarget(SOURCE);
        capture.bind(rec.geometry_now(), || Ok(rec.clone())).expect("initial bind");
        rec.take_ops();
        capture
    }

    #[test]
    fn resize_burst_rebinds_and_rebuilds_mesh_once() {
        let rec = Recorder::new(1280, 720);
        let mut capture = bound_capture(&rec);
        let zoom = 1.0;
        let mut mesh_key = MeshKey::stale(None, capture.mesh_source(), zoom);
        assert!(mesh_key.is_some());

        let start = Instant::now();
        let (mut rebinds, mut rebuilds) = (0, 0);
        for tick in (0..=3000u64).step_by(10) {
            let now = start + Duration::from_millis(tick);
            if tick < 500 && tick % 50 == 0 {
                let width = 1280 + tick as u32;
                rec.resize(width, 720);
                capture.on_configure(SOURCE, Resolution::new(width, 720), now);
            }
            if let Some(result) = capture.settle(now, |_| Ok(rec.geometry_now()), || Ok(rec.clone())) {
                result.expect("rebind");
                rebinds += 1;
                assert_eq!(tick, 1450, "rebind before the burst settled");
            }
            if let Some(key) = MeshKey::stale(mesh_key, capture.mesh_source(), zoom) {
                mesh_key = Some(key);
                rebuilds += 1;
            }
        }

        assert_eq!((rebinds, rebuilds), (1, 1));
        assert_eq!(
            rec.take_ops(),
            vec![
                Op::Release(103),
                Op::FreePixmap(102),
                Op::Geometry,
                Op::Config(24),
                Op::NamePixmap(104),
                Op::Bind(104, 105),
                Op::Configure(101),
            ]
        );
        assert_eq!(mesh_key, Some(MeshKey::new(Resolution::new(1730, 720), zoom, WINDOW_SEAM_INSET)));
        let server = rec.0.borrow();
        assert_eq!((server.live_pixmaps, server.live_bound), (1, 1));
    }

    #[test]
    fn unrelated_or_unchanged_configures_do_not_rebind() {
        let rec = Recorder::new(800, 600);
        let mut capture = bound_capture(&rec);
        let start = Instant::now();

        capture.on_configure(WindowId(0x999), Resolution::new(10, 10), start);
        capture.on_configure(SOURCE, Resolution::new(800, 600), start);
        let later = start + Duration::from_secs(5);
        assert!(capture.settle(later, |_| Ok(rec.geometry_now()), || Ok(rec.clone())).is_none());
        assert!(rec.take_ops().is_empty());

        // uncovering the window rebinds at the same size
        capture.on_visible(SOURCE, later);
        let settled = capture.settle(later + Duration::from_secs(1), |_| Ok(rec.geometry_now()), || Ok(rec.clone()));
        assert!(matches!(settled, Some(Ok(()))));
        assert_eq!(rec.take_ops().first(), Some(&Op::Release(103)));
    }

    #[test]
    fn vanished_window_reports_invalid_reference_on_settle() {
        let rec = Recorder::new(640, 480);
        let mut capture = bound_capture(&rec);
        let start = Instant::now();
        capture.on_configure(SOURCE, Resolution::new(700, 480), start);

        let gone = |window: WindowId| -> Result<WindowGeometry, CaptureError> {
            Err(CaptureError::WindowGone { window: window.raw() })
        };
        let settled = capture.settle(start + Duration::from_secs(1), gone, || Ok(rec.clone()));
        match settled {
            Some(Err(e)) => assert_eq!(e.class(), ErrorClass::InvalidWindowReference),
            other => panic!("expected a window error, got {other:?}"),
        }

        capture.suspend();
        assert_eq!(capture.texture(), None);
        assert_eq!(MeshKey::stale(None, capture.mesh_source(), 1.0), None);
        assert_eq!(rec.0.borrow().live_pixmaps, 0);
        assert_eq!(rec.take_ops().last(), Some(&Op::Unredirect));
    }
}
