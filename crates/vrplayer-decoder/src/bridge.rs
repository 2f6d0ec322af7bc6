//! Decode thread and its hand-off to the render thread.
//!
//! ```text
//!   decode thread, every iteration
//!   ───────────────────────────────
//!   Idle ──make_current(Decode)──► ContextAcquired
//!        poll collaborator events (dimensions, end of stream)
//!        first dimensions ──allocate──► FramebufferReady
//!        flag.take_and_clear() ──► Rendering ──render_into + resolve──► FramebufferReady
//!   drop(token) ──► Idle, sleep 1 ms when nothing was drawn
//! ```
//!
//! The bridge's resolved texture is announced once with
//! [`BridgeEvent::Ready`] and sampled by the main context afterwards. After
//! [`BridgeEvent::Ended`] or [`BridgeEvent::Failed`] the texture stays alive
//! until [`DecodeRenderBridge::shutdown`], so the main thread never samples a
//! deleted object.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use glow::HasContext;
use tracing::{debug, error, info, warn};
use vrplayer_core::{DecodeError, Resolution};
use vrplayer_renderer::{ContextKind, ContextToken, EyeFramebuffer, GlDevice};

use crate::update_flag::RenderUpdateFlag;

const IDLE_SLEEP: Duration = Duration::from_millis(1);
const RELEASE_POLL: Duration = Duration::from_millis(5);

// MARK: - Collaborator seams

/// Why playback stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum EndReason {
    Finished,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    /// A new frame can be rendered.
    RenderReady,
    DimensionsChanged { width: u32, height: u32 },
    EndOfStream(EndReason),
}

/// Video engine that renders into a caller-supplied framebuffer.
///
/// Lives on the decode thread and is only called with the decode context
/// current.
pub trait DecodeCollaborator {
    fn load(&mut self, path: &Path) -> Result<(), DecodeError>;
    fn render_into(&mut self, fbo: u32, size: Resolution) -> Result<(), DecodeError>;
    fn seek(&mut self, offset_seconds: f64) -> Result<(), DecodeError>;
    fn toggle_pause(&mut self) -> Result<(), DecodeError>;
    fn poll_event(&mut self) -> Option<DecodeEvent>;
}

/// Framebuffer the collaborator draws into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSurface {
    pub fbo: u32,
    pub texture: glow::Texture,
    pub size: Resolution,
}

/// GPU side of the bridge, separated so the loop runs without a GPU in tests.
pub trait DecodeTarget {
    fn allocate(&mut self, size: Resolution) -> Result<DecodeSurface, DecodeError>;
    /// Make the last render visible through [`DecodeSurface::texture`].
    fn resolve(&mut self);
}

// MARK: - Commands and events

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodeCommand {
    Seek { offset_seconds: f64 },
    TogglePause,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// The video has dimensions and its texture can be sampled.
    Ready { texture: glow::Texture, size: Resolution },
    Ended,
    Failed(DecodeError),
}

// MARK: - BridgeCore

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    ContextAcquired,
    FramebufferReady,
    Rendering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing to draw this iteration.
    Idle,
    Rendered,
    /// Playback ended; the loop stops.
    Finished,
}

/// Per-iteration state machine of the decode thread.
pub struct BridgeCore {
    flag: Arc<RenderUpdateFlag>,
    events: Sender<BridgeEvent>,
    state: BridgeState,
    video_size: Option<Resolution>,
    surface: Option<DecodeSurface>,
}

impl BridgeCore {
    pub fn new(flag: Arc<RenderUpdateFlag>, events: Sender<BridgeEvent>) -> Self {
        Self { flag, events, state: BridgeState::Idle, video_size: None, surface: None }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.video_size.is_some()
    }

    pub fn on_acquired(&mut self) {
        self.state = match self.surface {
            Some(_) => BridgeState::FramebufferReady,
            None => BridgeState::ContextAcquired,
        };
    }

    pub fn on_released(&mut self) {
        self.state = BridgeState::Idle;
    }

    pub fn apply<C: DecodeCollaborator>(&mut self, collaborator: &mut C, command: DecodeCommand) {
        let result = match command {
            DecodeCommand::Seek { offset_seconds } => collaborator.seek(offset_seconds),
            DecodeCommand::TogglePause => collaborator.toggle_pause(),
        };
        if let Err(e) = result {
            warn!("Decode: {:?} failed: {}", command, e);
        }
    }

    /// One loop iteration with the decode context current.
    pub fn step<C, T>(&mut self, collaborator: &mut C, target: &mut T) -> Result<StepOutcome, DecodeError>
    where
        C: DecodeCollaborator,
        T: DecodeTarget,
    {
        while let Some(event) = collaborator.poll_event() {
            match event {
                DecodeEvent::RenderReady => self.flag.set(),
                DecodeEvent::DimensionsChanged { width, height } => match self.video_size {
                    None if width > 0 && height > 0 => {
                        let size = Resolution::new(width, height);
                        info!("Decode: video loaded ({})", size);
                        self.video_size = Some(size);
                    }
                    None => debug!("Decode: ignoring empty dimensions"),
                    Some(size) => debug!("Decode: dimensions now {}×{}, keeping {}", width, height, size),
                },
                DecodeEvent::EndOfStream(EndReason::Finished) => {
                    info!("Decode: end of stream");
                    self.send(BridgeEvent::Ended);
                    return Ok(StepOutcome::Finished);
                }
                DecodeEvent::EndOfStream(EndReason::Error(reason)) => {
                    return Err(DecodeError::Playback { reason });
                }
            }
        }

        let surface = match (self.surface, self.video_size) {
            (Some(surface), _) => surface,
            (None, Some(size)) => {
                let surface = target.allocate(size)?;
                self.surface = Some(surface);
                self.state = BridgeState::FramebufferReady;
                self.send(BridgeEvent::Ready { texture: surface.texture, size });
                surface
            }
            (None, None) => return Ok(StepOutcome::Idle),
        };

        if !self.flag.take_and_clear() {
            return Ok(StepOutcome::Idle);
        }
        self.state = BridgeState::Rendering;
        let rendered = collaborator.render_into(surface.fbo, surface.size);
        target.resolve();
        self.state = BridgeState::FramebufferReady;
        rendered.map(|()| StepOutcome::Rendered)
    }

    fn send(&self, event: BridgeEvent) {
        if self.events.send(event).is_err() {
            debug!("Decode: main thread stopped listening");
        }
    }
}

// MARK: - GL target

/// Multisampled framebuffer on the decode context, resolved after every
/// render.
struct GlDecodeTarget {
    gl: Rc<glow::Context>,
    framebuffer: Option<EyeFramebuffer>,
}

impl DecodeTarget for GlDecodeTarget {
    fn allocate(&mut self, size: Resolution) -> Result<DecodeSurface, DecodeError> {
        let framebuffer = EyeFramebuffer::create(&self.gl, size)
            .map_err(|e| DecodeError::RenderFailed { reason: e.to_string() })?;
        let surface = DecodeSurface {
            fbo: framebuffer.render_target_id(),
            texture: framebuffer.texture(),
            size: framebuffer.size(),
        };
        if let Some(old) = self.framebuffer.replace(framebuffer) {
            old.destroy(&self.gl);
        }
        Ok(surface)
    }

    fn resolve(&mut self) {
        if let Some(framebuffer) = &self.framebuffer {
            framebuffer.resolve(&self.gl);
            unsafe { self.gl.flush() };
        }
    }
}

impl GlDecodeTarget {
    fn destroy(self) {
        if let Some(framebuffer) = self.framebuffer {
            framebuffer.destroy(&self.gl);
        }
    }
}

// MARK: - DecodeRenderBridge

/// Builds the collaborator on the decode thread with its context current.
pub type CollaboratorFactory<C> =
    Box<dyn FnOnce(&ContextToken<'_>, Arc<RenderUpdateFlag>) -> Result<C, DecodeError> + Send>;

/// Handle owned by the main thread.
pub struct DecodeRenderBridge {
    running: Arc<AtomicBool>,
    commands: Sender<DecodeCommand>,
    events: Receiver<BridgeEvent>,
    thread: Option<JoinHandle<()>>,
}

impl DecodeRenderBridge {
    pub fn spawn<C>(device: Arc<GlDevice>, path: PathBuf, factory: CollaboratorFactory<C>) -> Result<Self, DecodeError>
    where
        C: DecodeCollaborator + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();

        let thread = {
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("decode".into())
                .spawn(move || {
                    decode_thread(&device, &path, factory, &running, &command_rx, &event_tx);
                    debug!("Decode thread exiting");
                })
                .map_err(|e| DecodeError::ThreadUnavailable { reason: e.to_string() })?
        };

        Ok(Self { running, commands: command_tx, events: event_rx, thread: Some(thread) })
    }

    pub fn seek(&self, offset_seconds: f64) {
        self.send(DecodeCommand::Seek { offset_seconds });
    }

    pub fn toggle_pause(&self) {
        self.send(DecodeCommand::TogglePause);
    }

    fn send(&self, command: DecodeCommand) {
        if self.commands.send(command).is_err() {
            warn!("Decode: thread gone, dropping {:?}", command);
        }
    }

    /// Next event from the decode thread, if any.
    pub fn try_event(&self) -> Option<BridgeEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Stop the loop and wait for the thread to release its context.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Decode thread panicked");
            }
        }
    }
}

impl Drop for DecodeRenderBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Report how playback stopped, then block until the main thread asks the
/// bridge to shut down. GPU objects shared with the main context are only
/// released after this returns.
fn await_release(result: Result<(), DecodeError>, running: &AtomicBool, events: &Sender<BridgeEvent>) {
    if let Err(e) = result {
        error!("Decode thread failed: {}", e);
        let _ = events.send(BridgeEvent::Failed(e));
    }
    while running.load(Ordering::SeqCst) {
        thread::sleep(RELEASE_POLL);
    }
}

fn decode_thread<C: DecodeCollaborator>(
    device: &GlDevice,
    path: &Path,
    factory: CollaboratorFactory<C>,
    running: &AtomicBool,
    commands: &Receiver<DecodeCommand>,
    events: &Sender<BridgeEvent>,
) {
    let flag = Arc::new(RenderUpdateFlag::new());
    let mut core = BridgeCore::new(Arc::clone(&flag), events.clone());

    let context_error = |e: vrplayer_core::RenderError| DecodeError::InitFailed { reason: e.to_string() };
    let setup = (|| -> Result<_, DecodeError> {
        let token = device.make_current(ContextKind::Decode).map_err(context_error)?;
        let gl = token.load_gl();
        let mut collaborator = factory(&token, flag)?;
        info!("Decode: loading {}", path.display());
        collaborator.load(path)?;
        Ok((collaborator, GlDecodeTarget { gl, framebuffer: None }))
    })();
    let (mut collaborator, mut target) = match setup {
        Ok(parts) => parts,
        Err(e) => return await_release(Err(e), running, events),
    };

    let result = (|| -> Result<(), DecodeError> {
        while running.load(Ordering::SeqCst) {
            let token = device.make_current(ContextKind::Decode).map_err(context_error)?;
            core.on_acquired();
            for command in commands.try_iter() {
                core.apply(&mut collaborator, command);
            }
            let outcome = core.step(&mut collaborator, &mut target);
            drop(token);
            core.on_released();

            match outcome? {
                StepOutcome::Finished => break,
                StepOutcome::Rendered => {}
                StepOutcome::Idle => thread::sleep(IDLE_SLEEP),
            }
        }
        Ok(())
    })();
    await_release(result, running, events);

    // Collaborator and framebuffer go away with the decode context current.
    match device.make_current(ContextKind::Decode) {
        Ok(_token) => {
            drop(collaborator);
            target.destroy();
        }
        Err(e) => warn!("Decode: cannot release GPU objects: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Render { fbo: u32, size: Resolution },
        Seek(f64),
        TogglePause,
        Allocate(Resolution),
        Resolve,
    }

    #[derive(Default)]
    struct FakeEngine {
        events: Vec<DecodeEvent>,
        ops: Vec<Op>,
        fail_render: bool,
    }

    impl DecodeCollaborator for FakeEngine {
        fn load(&mut self, _path: &Path) -> Result<(), DecodeError> {
            Ok(())
        }

        fn render_into(&mut self, fbo: u32, size: Resolution) -> Result<(), DecodeError> {
            self.ops.push(Op::Render { fbo, size });
            if self.fail_render {
                return Err(DecodeError::RenderFailed { reason: "lost context".into() });
            }
            Ok(())
        }

        fn seek(&mut self, offset_seconds: f64) -> Result<(), DecodeError> {
            self.ops.push(Op::Seek(offset_seconds));
            Ok(())
        }

        fn toggle_pause(&mut self) -> Result<(), DecodeError> {
            self.ops.push(Op::TogglePause);
            Ok(())
        }

        fn poll_event(&mut self) -> Option<DecodeEvent> {
            if self.events.is_empty() {
                None
            } else {
                Some(self.events.remove(0))
            }
        }
    }

    #[derive(Default)]
    struct FakeTarget {
        ops: Vec<Op>,
    }

    impl DecodeTarget for FakeTarget {
        fn allocate(&mut self, size: Resolution) -> Result<DecodeSurface, DecodeError> {
            self.ops.push(Op::Allocate(size));
            let texture = glow::NativeTexture(NonZeroU32::new(7).expect("non-zero"));
            Ok(DecodeSurface { fbo: 3, texture, size })
        }

        fn resolve(&mut self) {
            self.ops.push(Op::Resolve);
        }
    }

    fn core() -> (BridgeCore, Arc<RenderUpdateFlag>, Receiver<BridgeEvent>) {
        let flag = Arc::new(RenderUpdateFlag::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        (BridgeCore::new(Arc::clone(&flag), tx), flag, rx)
    }

    fn dims(width: u32, height: u32) -> DecodeEvent {
        DecodeEvent::DimensionsChanged { width, height }
    }

    #[test]
    fn idles_until_dimensions_arrive() {
        let (mut core, flag, events) = core();
        let (mut engine, mut target) = (FakeEngine::default(), FakeTarget::default());
        flag.set();

        core.on_acquired();
        assert_eq!(core.state(), BridgeState::ContextAcquired);
        assert_eq!(core.step(&mut engine, &mut target), Ok(StepOutcome::Idle));
        assert!(target.ops.is_empty());
        assert!(engine.ops.is_empty());
        assert!(events.try_recv().is_err());
        core.on_released();
        assert_eq!(core.state(), BridgeState::Idle);
    }

    #[test]
    fn framebuffer_allocated_once_on_first_dimensions() {
        let (mut core, _flag, events) = core();
        let mut engine = FakeEngine { events: vec![dims(1920, 1080)], ..Default::default() };
        let mut target = FakeTarget::default();

        core.on_acquired();
        assert_eq!(core.step(&mut engine, &mut target), Ok(StepOutcome::Idle));
        assert_eq!(core.state(), BridgeState::FramebufferReady);
        assert!(core.is_loaded());

        engine.events.push(dims(1280, 720));
        core.step(&mut engine, &mut target).expect("step");
        assert_eq!(target.ops, vec![Op::Allocate(Resolution::new(1920, 1080))]);

        match events.try_recv() {
            Ok(BridgeEvent::Ready { size, .. }) => assert_eq!(size, Resolution::new(1920, 1080)),
            other => panic!("expected Ready, got {other:?}"),
        }
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn renders_only_when_update_pending() {
        let (mut core, flag, _events) = core();
        let mut engine = FakeEngine { events: vec![dims(640, 360)], ..Default::default() };
        let mut target = FakeTarget::default();
        core.on_acquired();
        core.step(&mut engine, &mut target).expect("allocate");

        flag.set();
        flag.set();
        assert_eq!(core.step(&mut engine, &mut target), Ok(StepOutcome::Rendered));
        assert_eq!(core.step(&mut engine, &mut target), Ok(StepOutcome::Idle));

        let size = Resolution::new(640, 360);
        assert_eq!(engine.ops, vec![Op::Render { fbo: 3, size }]);
        assert_eq!(target.ops, vec![Op::Allocate(size), Op::Resolve]);
        assert_eq!(core.state(), BridgeState::FramebufferReady);
    }

    #[test]
    fn render_ready_event_sets_flag() {
        let (mut core, _flag, _events) = core();
        let mut engine = FakeEngine {
            events: vec![dims(320, 240), DecodeEvent::RenderReady],
            ..Default::default()
        };
        let mut target = FakeTarget::default();
        assert_eq!(core.step(&mut engine, &mut target), Ok(StepOutcome::Rendered));
    }

    #[test]
    fn end_of_stream_finishes() {
        let (mut core, _flag, events) = core();
        let mut engine = FakeEngine {
            events: vec![DecodeEvent::EndOfStream(EndReason::Finished)],
            ..Default::default()
        };
        let mut target = FakeTarget::default();
        assert_eq!(core.step(&mut engine, &mut target), Ok(StepOutcome::Finished));
        assert_eq!(events.try_recv(), Ok(BridgeEvent::Ended));
    }

    #[test]
    fn playback_error_is_surfaced_as_error() {
        let (mut core, _flag, _events) = core();
        let mut engine = FakeEngine {
            events: vec![DecodeEvent::EndOfStream(EndReason::Error("unrecognized file format".into()))],
            ..Default::default()
        };
        let err = core
            .step(&mut engine, &mut FakeTarget::default())
            .expect_err("playback error");
        assert_eq!(err.class(), vrplayer_core::ErrorClass::UpstreamFatalEvent);
    }

    #[test]
    fn failed_render_still_resolves_and_reports() {
        let (mut core, flag, _events) = core();
        let mut engine = FakeEngine { events: vec![dims(64, 64)], fail_render: true, ..Default::default() };
        let mut target = FakeTarget::default();
        core.step(&mut engine, &mut target).expect("allocate");
        flag.set();
        assert!(core.step(&mut engine, &mut target).is_err());
        assert_eq!(target.ops.last(), Some(&Op::Resolve));
        assert_eq!(core.state(), BridgeState::FramebufferReady);
    }

    #[test]
    fn commands_reach_collaborator() {
        let (mut core, _flag, _events) = core();
        let mut engine = FakeEngine::default();
        core.apply(&mut engine, DecodeCommand::Seek { offset_seconds: -5.0 });
        core.apply(&mut engine, DecodeCommand::TogglePause);
        assert_eq!(engine.ops, vec![Op::Seek(-5.0), Op::TogglePause]);
    }

    #[test]
    fn teardown_waits_for_shutdown_after_end() {
        let running = Arc::new(AtomicBool::new(true));
        let released = Arc::new(AtomicBool::new(false));
        let (tx, rx) = crossbeam_channel::unbounded();

        let worker = {
            let (running, released) = (Arc::clone(&running), Arc::clone(&released));
            thread::spawn(move || {
                await_release(Err(DecodeError::Playback { reason: "corrupt stream".into() }), &running, &tx);
                released.store(true, Ordering::SeqCst);
            })
        };

        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(BridgeEvent::Failed(e)) => assert_eq!(e.class(), vrplayer_core::ErrorClass::UpstreamFatalEvent),
            other => panic!("expected Failed, got {other:?}"),
        }
        thread::sleep(Duration::from_millis(30));
        assert!(!released.load(Ordering::SeqCst), "texture released while still in use");

        running.store(false, Ordering::SeqCst);
        worker.join().expect("join");
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn stopped_bridge_releases_without_waiting() {
        let running = AtomicBool::new(false);
        let (tx, rx) = crossbeam_channel::unbounded();
        await_release(Ok(()), &running, &tx);
        assert!(rx.try_recv().is_err());
    }
}
