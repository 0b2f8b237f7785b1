//! Shared types for the parallax depth-map view.
//!
//! Everything here is plain data: no GPU handles, no event sources.

pub mod types;

pub use types::{ImageRef, ListenerScope, PointerModel, Rect, ResolvedDimensions, ViewId};

pub fn crate_info() -> &'static str {
    "parallax-common v0.1.0"
}
