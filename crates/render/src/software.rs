//! CPU implementation of the displacement filter.
//!
//! Samples the base layer at `p + (map.rg - 0.5) * scale` with bilinear
//! interpolation, clamped to the layer edges. Rows are processed in parallel.

use crate::renderer::{RenderBackend, RenderError, RenderSurface};
use crate::stage::{Stage, SurfaceDescriptor};
use glam::Vec2;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

/// Largest physical surface edge accepted by default, matching wgpu's
/// default `max_texture_dimension_2d`.
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

/// Backend that renders frames into RGBA buffers on the CPU.
#[derive(Debug, Clone)]
pub struct SoftwareBackend {
    max_dimension: u32,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for SoftwareBackend {
    type Surface = SoftwareSurface;

    fn create_surface(
        &mut self,
        descriptor: SurfaceDescriptor,
        stage: Stage,
    ) -> Result<SoftwareSurface, RenderError> {
        let size = descriptor.checked_physical_size(self.max_dimension)?;
        let fit = |image: &RgbaImage| {
            if image.dimensions() == (size.x, size.y) {
                image.clone()
            } else {
                imageops::resize(image, size.x, size.y, FilterType::Triangle)
            }
        };
        let layers = SoftwareLayers {
            base: fit(stage.base().texture.pixels()),
            depth_map: fit(stage.depth_map().texture.pixels()),
        };
        tracing::debug!(width = size.x, height = size.y, "software surface created");
        Ok(SoftwareSurface {
            descriptor,
            scale: stage.filter().scale,
            layers: Some(layers),
        })
    }
}

struct SoftwareLayers {
    base: RgbaImage,
    depth_map: RgbaImage,
}

/// Surface holding both layers resampled to the physical surface size.
pub struct SoftwareSurface {
    descriptor: SurfaceDescriptor,
    scale: Vec2,
    layers: Option<SoftwareLayers>,
}

impl SoftwareSurface {
    /// Render the current frame. `None` once the surface is destroyed.
    pub fn render_frame(&self) -> Option<RgbaImage> {
        let layers = self.layers.as_ref()?;
        // Scale is in logical pixels; the buffers are physical.
        let scale = self.scale * self.descriptor.device_pixel_ratio;
        Some(displace(&layers.base, &layers.depth_map, scale))
    }
}

impl RenderSurface for SoftwareSurface {
    fn descriptor(&self) -> &SurfaceDescriptor {
        &self.descriptor
    }

    fn set_displacement_scale(&mut self, scale: Vec2) {
        self.scale = scale;
    }

    fn displacement_scale(&self) -> Vec2 {
        self.scale
    }

    fn destroy(&mut self) {
        if self.layers.take().is_some() {
            tracing::debug!("software surface destroyed");
        }
    }

    fn is_destroyed(&self) -> bool {
        self.layers.is_none()
    }
}

/// Displace `base` by `depth_map` (red channel drives x, green drives y).
///
/// Both images must have the same dimensions; a neutral map (128) or a zero
/// scale leaves the image unchanged.
pub fn displace(base: &RgbaImage, depth_map: &RgbaImage, scale: Vec2) -> RgbaImage {
    let (width, height) = base.dimensions();
    debug_assert_eq!(depth_map.dimensions(), (width, height));

    let rows: Vec<Vec<Rgba<u8>>> = (0..height)
        .into_par_iter()
        .map(|y| {
            (0..width)
                .map(|x| {
                    let map = depth_map.get_pixel(x, y).0;
                    let dx = (map[0] as f32 / 255.0 - 0.5) * scale.x;
                    let dy = (map[1] as f32 / 255.0 - 0.5) * scale.y;
                    let src_x = (x as f32 + dx).clamp(0.0, (width - 1) as f32);
                    let src_y = (y as f32 + dy).clamp(0.0, (height - 1) as f32);
                    bilinear_sample(base, src_x, src_y)
                })
                .collect()
        })
        .collect();

    let mut output = RgbaImage::new(width, height);
    for (y, row) in rows.into_iter().enumerate() {
        for (x, pixel) in row.into_iter().enumerate() {
            output.put_pixel(x as u32, y as u32, pixel);
        }
    }
    output
}

fn bilinear_sample(image: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let (width, height) = image.dimensions();

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;

    let mut out = [0u8; 4];
    for (i, channel) in out.iter_mut().enumerate() {
        let value = p00[i] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[i] as f32 * fx * (1.0 - fy)
            + p01[i] as f32 * (1.0 - fx) * fy
            + p11[i] as f32 * fx * fy;
        *channel = value.round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}
