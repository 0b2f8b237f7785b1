//! Pointer position to displacement scale.
//!
//! Both models are direct passthrough: no smoothing, damping or clamping.

use glam::Vec2;
use parallax_common::{PointerModel, ResolvedDimensions};
use parallax_input::PointerEvent;

/// `((P / V) - 0.5) * R / intensity`. `None` for a degenerate viewport.
pub fn viewport_normalized(
    pointer: Vec2,
    viewport: Vec2,
    dimensions: ResolvedDimensions,
    intensity: f32,
) -> Option<Vec2> {
    if viewport.x <= 0.0 || viewport.y <= 0.0 {
        return None;
    }
    let centered = pointer / viewport - Vec2::splat(0.5);
    Some(centered * dimensions.as_vec2() / intensity)
}

/// `(R / 2 - local) / divisor`, with `local` relative to the surface origin.
pub fn surface_local(local: Vec2, dimensions: ResolvedDimensions, divisor: f32) -> Vec2 {
    (dimensions.half() - local) / divisor
}

/// Displacement for a pointer sample under the given model.
pub fn displacement_for(
    model: PointerModel,
    event: &PointerEvent,
    dimensions: ResolvedDimensions,
    divisor: f32,
) -> Option<Vec2> {
    match model {
        PointerModel::ViewportNormalized => {
            viewport_normalized(event.position, event.viewport, dimensions, divisor)
        }
        PointerModel::SurfaceLocal => Some(surface_local(
            event.surface_local(),
            dimensions,
            divisor,
        )),
    }
}
