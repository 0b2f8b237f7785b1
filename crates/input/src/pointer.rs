use glam::Vec2;
use parallax_common::Rect;

/// A single pointer-move sample as delivered by the host.
///
/// Coordinates are logical pixels relative to the top-left of the host
/// window. `surface_bounds` is the rendering surface's bounding box at the
/// time of the event, when the host has laid one out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub position: Vec2,
    pub viewport: Vec2,
    pub surface_bounds: Option<Rect>,
}

impl PointerEvent {
    pub fn new(position: Vec2, viewport: Vec2) -> Self {
        Self {
            position,
            viewport,
            surface_bounds: None,
        }
    }

    pub fn with_surface_bounds(mut self, bounds: Rect) -> Self {
        self.surface_bounds = Some(bounds);
        self
    }

    /// Whether the sample lies over the rendering surface.
    pub fn over_surface(&self) -> bool {
        self.surface_bounds
            .is_some_and(|bounds| bounds.contains(self.position))
    }

    /// Position relative to the surface origin (window origin if no surface is laid out).
    pub fn surface_local(&self) -> Vec2 {
        let origin = self.surface_bounds.map_or(Vec2::ZERO, |b| b.origin);
        self.position - origin
    }
}
