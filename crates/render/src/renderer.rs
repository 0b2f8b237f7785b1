use crate::stage::{Stage, SurfaceDescriptor};
use glam::Vec2;
use parallax_common::{ImageRef, ResolvedDimensions};
use std::cell::RefCell;
use std::rc::Rc;

/// Errors from building a rendering surface.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("texture {locator} is {width}x{height}, larger than the device limit of {max}")]
    TextureTooLarge {
        locator: ImageRef,
        width: u32,
        height: u32,
        max: u32,
    },
    #[error("surface of {width}x{height} physical pixels exceeds the limit of {max}")]
    SurfaceTooLarge { width: u32, height: u32, max: u32 },
    #[error("rendering surface unavailable: {0}")]
    SurfaceUnavailable(String),
}

/// A live rendering surface owning its layers and displacement filter.
///
/// Drawing is driven by the backend's own loop; the view only writes the
/// filter scale and eventually destroys the surface.
pub trait RenderSurface {
    fn descriptor(&self) -> &SurfaceDescriptor;

    /// Overwrite the displacement filter's scale vector.
    fn set_displacement_scale(&mut self, scale: Vec2);

    fn displacement_scale(&self) -> Vec2;

    /// Release every resource owned by the surface. Calling it again is a no-op.
    fn destroy(&mut self);

    fn is_destroyed(&self) -> bool;
}

/// Renderer-agnostic surface factory. All backends implement this trait.
pub trait RenderBackend {
    type Surface: RenderSurface;

    /// Build a surface and attach the stage to its root. On error nothing
    /// is left allocated.
    fn create_surface(
        &mut self,
        descriptor: SurfaceDescriptor,
        stage: Stage,
    ) -> Result<Self::Surface, RenderError>;
}

/// Counters and a text log of everything done through a [`DebugTextBackend`].
#[derive(Debug, Default)]
pub struct DebugJournal {
    pub surfaces_created: usize,
    pub surfaces_destroyed: usize,
    pub scale_writes: usize,
    pub last_scale: Option<Vec2>,
    pub lines: Vec<String>,
}

impl DebugJournal {
    /// Surfaces created and not yet destroyed.
    pub fn live_surfaces(&self) -> usize {
        self.surfaces_created - self.surfaces_destroyed
    }
}

/// Debug backend: records surface operations instead of drawing.
///
/// Useful for CLI output, logging, and testing the view lifecycle without a GPU.
#[derive(Debug, Default)]
pub struct DebugTextBackend {
    journal: Rc<RefCell<DebugJournal>>,
    refuse: Option<String>,
}

impl DebugTextBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose `create_surface` always fails with the given reason.
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            journal: Rc::default(),
            refuse: Some(reason.into()),
        }
    }

    /// Shared handle to the journal; stays valid after surfaces are dropped.
    pub fn journal(&self) -> Rc<RefCell<DebugJournal>> {
        Rc::clone(&self.journal)
    }
}

impl RenderBackend for DebugTextBackend {
    type Surface = DebugTextSurface;

    fn create_surface(
        &mut self,
        descriptor: SurfaceDescriptor,
        stage: Stage,
    ) -> Result<DebugTextSurface, RenderError> {
        if let Some(reason) = &self.refuse {
            return Err(RenderError::SurfaceUnavailable(reason.clone()));
        }
        let mut journal = self.journal.borrow_mut();
        journal.surfaces_created += 1;
        let size = descriptor.physical_size();
        journal.lines.push(format!(
            "create {}x{} @{} base={} depth={}",
            size.x,
            size.y,
            descriptor.device_pixel_ratio,
            stage.base().texture.locator(),
            stage.depth_map().texture.locator()
        ));
        Ok(DebugTextSurface {
            descriptor,
            dimensions: stage.dimensions(),
            scale: Vec2::ZERO,
            destroyed: false,
            journal: Rc::clone(&self.journal),
        })
    }
}

#[derive(Debug)]
pub struct DebugTextSurface {
    descriptor: SurfaceDescriptor,
    dimensions: ResolvedDimensions,
    scale: Vec2,
    destroyed: bool,
    journal: Rc<RefCell<DebugJournal>>,
}

impl DebugTextSurface {
    /// Human-readable summary of the surface state.
    pub fn describe(&self) -> String {
        format!(
            "surface {:.0}x{:.0} scale=({:.2}, {:.2}){}",
            self.dimensions.width,
            self.dimensions.height,
            self.scale.x,
            self.scale.y,
            if self.destroyed { " [destroyed]" } else { "" }
        )
    }
}

impl RenderSurface for DebugTextSurface {
    fn descriptor(&self) -> &SurfaceDescriptor {
        &self.descriptor
    }

    fn set_displacement_scale(&mut self, scale: Vec2) {
        if self.destroyed {
            return;
        }
        self.scale = scale;
        let mut journal = self.journal.borrow_mut();
        journal.scale_writes += 1;
        journal.last_scale = Some(scale);
        journal
            .lines
            .push(format!("scale ({:.3}, {:.3})", scale.x, scale.y));
    }

    fn displacement_scale(&self) -> Vec2 {
        self.scale
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let mut journal = self.journal.borrow_mut();
        journal.surfaces_destroyed += 1;
        journal.lines.push("destroy".into());
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}
