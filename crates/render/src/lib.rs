//! Rendering Adapter: renderer-agnostic stage model and backend interface.
//!
//! # Invariants
//! - Both layers and the surface share identical dimensions.
//! - A surface is either fully built or never handed out.
//! - `destroy` releases everything the surface owns and is idempotent.
//!
//! The GPU backend lives in `parallax-render-wgpu`. This crate ships a debug
//! journal backend for tests and traces, and a CPU backend for headless
//! rendering.

mod renderer;
mod software;
mod stage;

pub use renderer::{
    DebugJournal, DebugTextBackend, DebugTextSurface, RenderBackend, RenderError, RenderSurface,
};
pub use software::{DEFAULT_MAX_DIMENSION, SoftwareBackend, SoftwareSurface, displace};
pub use stage::{DisplacementFilter, Layer, LayerRole, Stage, SurfaceDescriptor};

pub fn crate_info() -> &'static str {
    "parallax-render v0.1.0"
}
