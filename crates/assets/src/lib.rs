//! Texture loading: turns an [`ImageRef`] into decoded RGBA pixels.
//!
//! Decoding is delegated to the `image` crate; no format validation happens
//! here beyond what the decoder reports. Textures are immutable once loaded
//! and cheap to clone.

pub mod demo;
mod loader;

pub use loader::{FsImageLoader, ImageLoader, LoadError, MemoryImageLoader, Texture};
use parallax_common::ImageRef;

pub fn crate_info() -> &'static str {
    "parallax-assets v0.1.0"
}

/// Load a base image and its depth map, base first. Stops at the first failure.
pub fn load_pair<L: ImageLoader + ?Sized>(
    loader: &L,
    image: &ImageRef,
    depth_map: &ImageRef,
) -> Result<(Texture, Texture), LoadError> {
    let base = loader.load(image)?;
    let depth = loader.load(depth_map)?;
    Ok((base, depth))
}
