use crate::renderer::RenderError;
use glam::{UVec2, Vec2};
use parallax_assets::Texture;
use parallax_common::ResolvedDimensions;

/// Parameters of the drawable surface a stage is rendered into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceDescriptor {
    pub dimensions: ResolvedDimensions,
    /// Device pixel ratio of the host; scales the backing store.
    pub device_pixel_ratio: f32,
    /// Clear to transparent instead of an opaque background.
    pub transparent: bool,
}

impl SurfaceDescriptor {
    pub fn new(dimensions: ResolvedDimensions, device_pixel_ratio: f32) -> Self {
        let device_pixel_ratio = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        Self {
            dimensions,
            device_pixel_ratio,
            transparent: true,
        }
    }

    /// Backing-store size in physical pixels.
    pub fn physical_size(&self) -> UVec2 {
        self.dimensions.physical_size(self.device_pixel_ratio)
    }

    /// Physical size, or an error when either axis exceeds `max`.
    pub fn checked_physical_size(&self, max: u32) -> Result<UVec2, RenderError> {
        let size = self.physical_size();
        if size.x > max || size.y > max {
            return Err(RenderError::SurfaceTooLarge {
                width: size.x,
                height: size.y,
                max,
            });
        }
        Ok(size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerRole {
    /// The visible image.
    Base,
    /// Grayscale map driving the displacement; sampled, never drawn.
    DepthMap,
}

/// A full-surface sprite.
#[derive(Debug, Clone)]
pub struct Layer {
    pub role: LayerRole,
    pub texture: Texture,
    pub width: f32,
    pub height: f32,
}

/// Displacement post-effect: offsets pixels of the stage by
/// `(map.rg - 0.5) * scale`, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplacementFilter {
    pub map: LayerRole,
    pub scale: Vec2,
}

/// The composited scene: base layer, depth layer, and the filter bound to the depth layer.
#[derive(Debug, Clone)]
pub struct Stage {
    base: Layer,
    depth_map: Layer,
    filter: DisplacementFilter,
}

impl Stage {
    /// Compose both layers at the resolved dimensions with a zero-scale filter.
    pub fn compose(base: Texture, depth_map: Texture, dimensions: ResolvedDimensions) -> Self {
        let layer = |role, texture| Layer {
            role,
            texture,
            width: dimensions.width,
            height: dimensions.height,
        };
        Self {
            base: layer(LayerRole::Base, base),
            depth_map: layer(LayerRole::DepthMap, depth_map),
            filter: DisplacementFilter {
                map: LayerRole::DepthMap,
                scale: Vec2::ZERO,
            },
        }
    }

    pub fn base(&self) -> &Layer {
        &self.base
    }

    pub fn depth_map(&self) -> &Layer {
        &self.depth_map
    }

    pub fn filter(&self) -> &DisplacementFilter {
        &self.filter
    }

    pub fn dimensions(&self) -> ResolvedDimensions {
        ResolvedDimensions::new(self.base.width, self.base.height)
    }

    /// Layers in draw order.
    pub fn layers(&self) -> [&Layer; 2] {
        [&self.base, &self.depth_map]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use parallax_common::ImageRef;
    use std::sync::Arc;

    fn texture(name: &str, w: u32, h: u32) -> Texture {
        Texture::new(ImageRef::new(name), Arc::new(RgbaImage::new(w, h))).unwrap()
    }

    #[test]
    fn layers_share_resolved_dimensions() {
        let dims = ResolvedDimensions::new(300.0, 150.0);
        let stage = Stage::compose(texture("a", 640, 480), texture("b", 64, 64), dims);
        for layer in stage.layers() {
            assert_eq!(layer.width, 300.0);
            assert_eq!(layer.height, 150.0);
        }
        assert_eq!(stage.dimensions(), dims);
        assert_eq!(stage.filter().map, LayerRole::DepthMap);
        assert_eq!(stage.filter().scale, Vec2::ZERO);
    }

    #[test]
    fn descriptor_sanitizes_pixel_ratio() {
        let dims = ResolvedDimensions::new(100.0, 50.0);
        assert_eq!(SurfaceDescriptor::new(dims, 0.0).device_pixel_ratio, 1.0);
        assert_eq!(SurfaceDescriptor::new(dims, f32::NAN).device_pixel_ratio, 1.0);
        let hidpi = SurfaceDescriptor::new(dims, 2.0);
        assert_eq!(hidpi.physical_size(), UVec2::new(200, 100));
        assert!(hidpi.transparent);
    }

    #[test]
    fn oversized_surface_is_refused() {
        let dims = ResolvedDimensions::new(5000.0, 100.0);
        assert_eq!(
            SurfaceDescriptor::new(dims, 1.0).checked_physical_size(8192).unwrap(),
            UVec2::new(5000, 100)
        );
        let err = SurfaceDescriptor::new(dims, 2.0).checked_physical_size(8192).unwrap_err();
        assert!(matches!(
            err,
            RenderError::SurfaceTooLarge { width: 10000, height: 200, max: 8192 }
        ));
        let huge = SurfaceDescriptor::new(ResolvedDimensions::new(1e10, 1e10), 1.0);
        assert!(huge.checked_physical_size(u32::MAX - 1).is_err());
    }
}
