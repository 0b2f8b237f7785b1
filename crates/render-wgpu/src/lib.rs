//! wgpu render backend for the parallax view.
//!
//! Draws the base layer as a single quad into a viewport of the host's
//! frame, sampling it through the depth-map displacement in the fragment
//! shader.
//!
//! # Invariants
//! - The renderer never writes view state; it only reads the scale uniform.
//! - Destroying a surface releases both textures and its uniform buffer.

mod gpu;
mod shaders;

pub use gpu::{WgpuBackend, WgpuParallaxSurface};

pub fn crate_info() -> &'static str {
    "parallax-render-wgpu v0.1.0"
}
