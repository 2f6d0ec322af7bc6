use tracing::{debug, info, warn};
use vrplayer_core::{CaptureError, Resolution, WindowId};

use crate::backend::CaptureBackend;

/// The pixmap handles attached to the surface texture. Released in reverse
/// acquisition order: GL pixmap first, then the window's backing pixmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixmapBinding {
    pixmap: u64,
    bound: u64,
}

/// A redirected window whose contents are readable as a GPU texture.
///
/// At most one binding is live at a time; [`CaptureSurface::on_resize`]
/// releases the previous one before acquiring its replacement. Dropping the
/// surface releases everything it holds.
pub struct CaptureSurface<B: CaptureBackend> {
    backend: B,
    window: WindowId,
    texture: Option<B::Texture>,
    binding: Option<PixmapBinding>,
    size: Resolution,
}

impl<B: CaptureBackend> CaptureSurface<B> {
    /// Redirect `window` offscreen and bind its current contents.
    pub fn init(mut backend: B, window: WindowId) -> Result<Self, CaptureError> {
        backend.check_supported()?;
        backend.redirect(window);

        let mut surface = Self {
            backend,
            window,
            texture: None,
            binding: None,
            size: Resolution::new(0, 0),
        };
        surface.on_resize()?;
        info!("Capture[{}] bound at {}", window, surface.size);
        Ok(surface)
    }

    /// Rebuild the binding after the window changed size or visibility.
    ///
    /// On error the surface is left unbound; a later call may succeed.
    pub fn on_resize(&mut self) -> Result<(), CaptureError> {
        self.release_binding();

        let geometry = self.backend.geometry(self.window)?;
        let config = self.backend.choose_config(geometry.depth)?;
        let texture = match self.texture {
            Some(texture) => texture,
            None => {
                let texture = self.backend.create_texture()?;
                self.texture = Some(texture);
                texture
            }
        };

        let pixmap = self.backend.name_pixmap(self.window)?;
        let bound = match self.backend.bind_pixmap(pixmap, config, texture) {
            Ok(bound) => bound,
            Err(e) => {
                self.backend.free_pixmap(pixmap);
                warn!("Capture[{}] bind failed: {}", self.window, e);
                return Err(e);
            }
        };
        self.binding = Some(PixmapBinding { pixmap, bound });
        self.backend.configure_texture(texture);
        self.size = geometry.pixmap_size().at_least_one();
        debug!("Capture[{}] rebound at {} (depth {})", self.window, self.size, geometry.depth);
        Ok(())
    }

    /// The texture holding the window contents, if currently bound.
    pub fn texture(&self) -> Option<B::Texture> {
        self.binding.and(self.texture)
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Pixel size of the bound texture, border included.
    pub fn size(&self) -> Resolution {
        self.size
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Release every resource now rather than at drop.
    pub fn deinit(self) {}

    fn release_binding(&mut self) {
        if let Some(binding) = self.binding.take() {
            self.backend.release_pixmap(binding.bound);
            self.backend.free_pixmap(binding.pixmap);
        }
    }
}

impl<B: CaptureBackend> Drop for CaptureSurface<B> {
    fn drop(&mut self) {
        self.release_binding();
        if let Some(texture) = self.texture.take() {
            self.backend.delete_texture(texture);
        }
        self.backend.unredirect(self.window);
        debug!("Capture[{}] released", self.window);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    use super::*;
    use crate::display::WindowGeometry;

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
    struct World {
        ops: Vec<Op>,
        live_pixmaps: HashSet<u64>,
        live_bound: HashSet<u64>,
        live_textures: HashSet<u32>,
        next_id: u64,
        width: u32,
        height: u32,
        window_gone: bool,
        composite_minor: i32,
        fail_bind: bool,
    }

    #[derive(Clone)]
    struct Recorder(Rc<RefCell<World>>);

    impl Recorder {
        fn new(width: u32, height: u32) -> Self {
            Self(Rc::new(RefCell::new(World {
                width,
                height,
                composite_minor: 4,
                next_id: 100,
                ..Default::default()
            })))
        }

        fn world(&self) -> std::cell::RefMut<'_, World> {
            self.0.borrow_mut()
        }
    }

    impl CaptureBackend for Recorder {
        type Texture = u32;
        type Config = i32;

        fn check_supported(&mut self) -> Result<(), CaptureError> {
            let mut w = self.world();
            w.ops.push(Op::Check);
            if w.composite_minor < 2 {
                return Err(CaptureError::CaptureUnsupported { major: 0, minor: w.composite_minor });
            }
            Ok(())
        }

        fn redirect(&mut self, _window: WindowId) {
            self.world().ops.push(Op::Redirect);
        }

        fn unredirect(&mut self, _window: WindowId) {
            self.world().ops.push(Op::Unredirect);
        }

        fn geometry(&mut self, window: WindowId) -> Result<WindowGeometry, CaptureError> {
            let mut w = self.world();
            w.ops.push(Op::Geometry);
            if w.window_gone {
                return Err(CaptureError::WindowGone { window: window.raw() });
            }
            Ok(WindowGeometry { width: w.width, height: w.height, border: 0, depth: 24, viewable: true })
        }

        fn choose_config(&mut self, depth: i32) -> Result<i32, CaptureError> {
            self.world().ops.push(Op::Config(depth));
            Ok(depth)
        }

        fn create_texture(&mut self) -> Result<u32, CaptureError> {
            let mut w = self.world();
            w.next_id += 1;
            let id = w.next_id as u32;
            w.live_textures.insert(id);
            w.ops.push(Op::CreateTexture(id));
            Ok(id)
        }

        fn delete_texture(&mut self, texture: u32) {
            let mut w = self.world();
            w.live_textures.remove(&texture);
            w.ops.push(Op::DeleteTexture(texture));
        }

        fn name_pixmap(&mut self, _window: WindowId) -> Result<u64, CaptureError> {
            let mut w = self.world();
            w.next_id += 1;
            let id = w.next_id;
            w.live_pixmaps.insert(id);
            w.ops.push(Op::NamePixmap(id));
            Ok(id)
        }

        fn free_pixmap(&mut self, pixmap: u64) {
            let mut w = self.world();
            w.live_pixmaps.remove(&pixmap);
            w.ops.push(Op::FreePixmap(pixmap));
        }

        fn bind_pixmap(&mut self, pixmap: u64, _config: i32, _texture: u32) -> Result<u64, CaptureError> {
            let mut w = self.world();
            if w.fail_bind {
                return Err(CaptureError::BindFailed { reason: "test".into() });
            }
            w.next_id += 1;
            let id = w.next_id;
            w.live_bound.insert(id);
            w.ops.push(Op::Bind(pixmap, id));
            Ok(id)
        }

        fn release_pixmap(&mut self, bound: u64) {
            let mut w = self.world();
            w.live_bound.remove(&bound);
            w.ops.push(Op::Release(bound));
        }

        fn configure_texture(&mut self, texture: u32) {
            self.world().ops.push(Op::Configure(texture));
        }
    }

    #[test]
    fn init_binds_window_contents() {
        let rec = Recorder::new(640, 480);
        let surface = CaptureSurface::init(rec.clone(), WindowId(0x42)).expect("init");

        assert_eq!(
            rec.world().ops,
            vec![
                Op::Check,
                Op::Redirect,
                Op::Geometry,
                Op::Config(24),
                Op::CreateTexture(101),
                Op::NamePixmap(102),
                Op::Bind(102, 103),
                Op::Configure(101),
            ]
        );
        assert_eq!(surface.texture(), Some(101));
        assert_eq!(surface.size(), Resolution::new(640, 480));
    }

    #[test]
    fn resize_releases_before_reacquiring() {
        let rec = Recorder::new(640, 480);
        let mut surface = CaptureSurface::init(rec.clone(), WindowId(0x42)).expect("init");
        rec.world().ops.clear();
        rec.world().width = 1280;

        surface.on_resize().expect("resize");

        let w = rec.world();
        assert_eq!(
            w.ops,
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
        // texture object is kept across rebinds
        assert_eq!(w.live_textures.len(), 1);
        assert_eq!(w.live_pixmaps.len(), 1);
        assert_eq!(w.live_bound.len(), 1);
        drop(w);
        assert_eq!(surface.size(), Resolution::new(1280, 480));
    }

    #[test]
    fn many_resizes_leave_one_binding() {
        let rec = Recorder::new(100, 100);
        let mut surface = CaptureSurface::init(rec.clone(), WindowId(7)).expect("init");
        for i in 0..10 {
            rec.world().height = 100 + i;
            surface.on_resize().expect("resize");
        }
        let w = rec.world();
        assert_eq!(w.live_pixmaps.len(), 1);
        assert_eq!(w.live_bound.len(), 1);
        assert_eq!(w.live_textures.len(), 1);
    }

    #[test]
    fn vanished_window_leaves_surface_unbound() {
        let rec = Recorder::new(320, 240);
        let mut surface = CaptureSurface::init(rec.clone(), WindowId(9)).expect("init");
        rec.world().window_gone = true;

        let err = surface.on_resize().expect_err("window is gone");
        assert_eq!(err, CaptureError::WindowGone { window: 9 });
        assert!(!surface.is_bound());
        assert_eq!(surface.texture(), None);
        assert!(rec.world().live_pixmaps.is_empty());
        assert!(rec.world().live_bound.is_empty());
    }

    #[test]
    fn failed_bind_frees_named_pixmap() {
        let rec = Recorder::new(320, 240);
        let mut surface = CaptureSurface::init(rec.clone(), WindowId(9)).expect("init");
        rec.world().fail_bind = true;

        assert!(surface.on_resize().is_err());
        assert!(rec.world().live_pixmaps.is_empty());
        assert!(!surface.is_bound());
    }

    #[test]
    fn old_composite_is_rejected_before_any_allocation() {
        let rec = Recorder::new(320, 240);
        rec.world().composite_minor = 1;

        let err = CaptureSurface::init(rec.clone(), WindowId(1)).err().expect("unsupported");
        assert_eq!(err, CaptureError::CaptureUnsupported { major: 0, minor: 1 });
        assert_eq!(rec.world().ops, vec![Op::Check]);
    }

    #[test]
    fn drop_releases_everything() {
        let rec = Recorder::new(320, 240);
        let surface = CaptureSurface::init(rec.clone(), WindowId(3)).expect("init");
        surface.deinit();

        let w = rec.world();
        assert!(w.live_pixmaps.is_empty());
        assert!(w.live_bound.is_empty());
        assert!(w.live_textures.is_empty());
        assert_eq!(w.ops.last(), Some(&Op::Unredirect));
    }
}
