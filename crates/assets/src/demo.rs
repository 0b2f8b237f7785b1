//! Procedurally generated demo images, used when no image paths are given.

use crate::loader::MemoryImageLoader;
use image::{Rgba, RgbaImage};

pub const DEMO_IMAGE: &str = "demo:image";
pub const DEMO_DEPTH_MAP: &str = "demo:depth-map";

/// A checkerboard over a diagonal color gradient with a disc in the middle.
pub fn demo_image(width: u32, height: u32) -> RgbaImage {
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let radius = width.min(height) as f32 * 0.3;
    RgbaImage::from_fn(width, height, |x, y| {
        let u = x as f32 / width.max(1) as f32;
        let v = y as f32 / height.max(1) as f32;
        let dist = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        if dist < radius {
            return Rgba([240, 200, 40, 255]);
        }
        let checker = ((x / 32) + (y / 32)) % 2 == 0;
        let shade = if checker { 1.0 } else { 0.75 };
        Rgba([
            (u * 200.0 * shade) as u8 + 30,
            (v * 160.0 * shade) as u8 + 40,
            ((1.0 - u) * 180.0 * shade) as u8 + 50,
            255,
        ])
    })
}

/// Radial depth: white (near) at the center fading to black at the corners.
pub fn demo_depth_map(width: u32, height: u32) -> RgbaImage {
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let max_dist = (cx * cx + cy * cy).sqrt().max(1.0);
    RgbaImage::from_fn(width, height, |x, y| {
        let dist = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        let level = ((1.0 - dist / max_dist) * 255.0).clamp(0.0, 255.0) as u8;
        Rgba([level, level, level, 255])
    })
}

/// A loader that serves [`DEMO_IMAGE`] and [`DEMO_DEPTH_MAP`].
pub fn demo_loader(width: u32, height: u32) -> MemoryImageLoader {
    let mut loader = MemoryImageLoader::new();
    loader.insert(DEMO_IMAGE, demo_image(width, height));
    loader.insert(DEMO_DEPTH_MAP, demo_depth_map(width, height));
    loader
}
