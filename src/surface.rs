//! # Render Surface
//!
//! The render target is the window clips draw into. The display connection is
//! opened once at startup; the target itself is resolved on the first request
//! (compositing overlay if the surface offers one, the root window otherwise),
//! cached, and released once at shutdown.

use std::path::Path;

use tracing::{debug, info};

use crate::error::SurfaceError;

/// Which window a render target refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Root,
    Overlay,
}

/// Opaque handle to the window clips render into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub handle: u64,
    pub kind: TargetKind,
}

impl RenderTarget {
    pub fn root(handle: u64) -> Self {
        Self {
            handle,
            kind: TargetKind::Root,
        }
    }

    pub fn overlay(handle: u64) -> Self {
        Self {
            handle,
            kind: TargetKind::Overlay,
        }
    }
}

/// Windowing-system side of the output surface
pub trait RenderSurface {
    /// The default root window
    fn root(&mut self) -> Result<RenderTarget, SurfaceError>;

    /// A compositing overlay above `root`, if the display offers one
    fn acquire_overlay(&mut self, root: RenderTarget) -> Option<RenderTarget>;

    fn release_overlay(&mut self, overlay: RenderTarget);

    /// Close the display connection
    fn close(&mut self);
}

/// Resolves the render target once and hands out the cached handle after that
pub struct LazyRenderTarget {
    surface: Box<dyn RenderSurface>,
    resolved: Option<RenderTarget>,
    released: bool,
}

impl LazyRenderTarget {
    pub fn new(surface: Box<dyn RenderSurface>) -> Self {
        Self {
            surface,
            resolved: None,
            released: false,
        }
    }

    /// Cached target, resolving it on first use
    pub fn resolve(&mut self) -> Result<RenderTarget, SurfaceError> {
        if let Some(target) = self.resolved {
            return Ok(target);
        }

        let root = self.surface.root()?;
        let target = match self.surface.acquire_overlay(root) {
            Some(overlay) => {
                info!("Rendering into compositing overlay {:#x}", overlay.handle);
                overlay
            }
            None => {
                info!("No compositing overlay, rendering into root window {:#x}", root.handle);
                root
            }
        };

        self.resolved = Some(target);
        Ok(target)
    }

    /// Release the overlay (if one was taken) and close the display. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(target) = self.resolved.take() {
            if target.kind == TargetKind::Overlay {
                self.surface.release_overlay(target);
            }
        }
        self.surface.close();
    }
}

impl Drop for LazyRenderTarget {
    fn drop(&mut self) {
        self.release();
    }
}

/// X display located through `DISPLAY` (or an explicit name).
///
/// Opening only verifies that the display is reachable: for a local display
/// its server socket must exist, which is the startup-fatal condition. No
/// protocol connection is made. The root target is the symbolic
/// [`DEFAULT_ROOT_HANDLE`] and overlays are never offered; launched sinks open
/// their own windows on this display.
pub struct DisplaySurface {
    display: String,
    open: bool,
}

/// Handle meaning "the default root window of the display"
pub const DEFAULT_ROOT_HANDLE: u64 = 0;

impl DisplaySurface {
    pub fn open(display: Option<&str>) -> Result<Self, SurfaceError> {
        let name = match display {
            Some(name) => name.to_string(),
            None => std::env::var("DISPLAY").unwrap_or_default(),
        };

        if name.is_empty() {
            return Err(SurfaceError::DisplayUnavailable {
                display: "(unset)".to_string(),
            });
        }

        if let Some(socket) = Self::local_socket(&name) {
            if !Path::new(&socket).exists() {
                return Err(SurfaceError::DisplayUnavailable { display: name });
            }
        }

        info!("Using display {}", name);
        Ok(Self {
            display: name,
            open: true,
        })
    }

    /// `:0` and `:0.0` map to `/tmp/.X11-unix/X0`; remote displays have no local socket
    fn local_socket(display: &str) -> Option<String> {
        let number = display.strip_prefix(':')?;
        let number = number.split('.').next()?;
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(format!("/tmp/.X11-unix/X{}", number))
    }

    pub fn display(&self) -> &str {
        &self.display
    }
}

impl RenderSurface for DisplaySurface {
    fn root(&mut self) -> Result<RenderTarget, SurfaceError> {
        if !self.open {
            return Err(SurfaceError::NoRootWindow {
                display: self.display.clone(),
            });
        }
        Ok(RenderTarget::root(DEFAULT_ROOT_HANDLE))
    }

    fn acquire_overlay(&mut self, _root: RenderTarget) -> Option<RenderTarget> {
        debug!("Display {} offers no compositing overlay", self.display);
        None
    }

    fn release_overlay(&mut self, _overlay: RenderTarget) {}

    fn close(&mut self) {
        if self.open {
            debug!("Closing display {}", self.display);
            self.open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Counters {
        roots: Cell<usize>,
        overlays_released: Cell<usize>,
        closed: Cell<usize>,
    }

    struct FakeSurface {
        counters: Rc<Counters>,
        overlay: bool,
    }

    impl RenderSurface for FakeSurface {
        fn root(&mut self) -> Result<RenderTarget, SurfaceError> {
            self.counters.roots.set(self.counters.roots.get() + 1);
            Ok(RenderTarget::root(0x10))
        }

        fn acquire_overlay(&mut self, _root: RenderTarget) -> Option<RenderTarget> {
            self.overlay.then(|| RenderTarget::overlay(0x20))
        }

        fn release_overlay(&mut self, _overlay: RenderTarget) {
            let n = &self.counters.overlays_released;
            n.set(n.get() + 1);
        }

        fn close(&mut self) {
            self.counters.closed.set(self.counters.closed.get() + 1);
        }
    }

    #[test]
    fn test_overlay_preferred_and_cached() {
        let counters = Rc::new(Counters::default());
        let mut target = LazyRenderTarget::new(Box::new(FakeSurface {
            counters: counters.clone(),
            overlay: true,
        }));

        assert_eq!(target.resolve().unwrap(), RenderTarget::overlay(0x20));
        assert_eq!(target.resolve().unwrap(), RenderTarget::overlay(0x20));
        assert_eq!(counters.roots.get(), 1);

        target.release();
        target.release();
        assert_eq!(counters.overlays_released.get(), 1);
        assert_eq!(counters.closed.get(), 1);
    }

    #[test]
    fn test_falls_back_to_root() {
        let counters = Rc::new(Counters::default());
        let mut target = LazyRenderTarget::new(Box::new(FakeSurface {
            counters: counters.clone(),
            overlay: false,
        }));

        assert_eq!(target.resolve().unwrap(), RenderTarget::root(0x10));
        drop(target);
        assert_eq!(counters.overlays_released.get(), 0);
        assert_eq!(counters.closed.get(), 1);
    }

    #[test]
    fn test_local_socket_paths() {
        assert_eq!(
            DisplaySurface::local_socket(":0").as_deref(),
            Some("/tmp/.X11-unix/X0")
        );
        assert_eq!(
            DisplaySurface::local_socket(":1.0").as_deref(),
            Some("/tmp/.X11-unix/X1")
        );
        assert_eq!(DisplaySurface::local_socket("remote:0"), None);
    }

    #[test]
    fn test_missing_local_display_is_fatal() {
        assert!(DisplaySurface::open(Some(":4242")).is_err());
        assert!(DisplaySurface::open(Some("")).is_err());
    }

    #[test]
    fn test_remote_display_renders_into_default_root() {
        let mut surface = DisplaySurface::open(Some("remote:0")).unwrap();
        assert_eq!(surface.display(), "remote:0");

        let root = surface.root().unwrap();
        assert_eq!(root, RenderTarget::root(DEFAULT_ROOT_HANDLE));
        assert_eq!(surface.acquire_overlay(root), None);

        surface.close();
        assert!(surface.root().is_err());
    }
}
