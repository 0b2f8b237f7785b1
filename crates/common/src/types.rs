use glam::{UVec2, Vec2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a mounted view instance. Used for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId(pub Uuid);

impl ViewId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ViewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.8}", self.0.to_string())
    }
}

/// Opaque locator of a raster image (a filesystem path or a name known to a loader).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ImageRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Final width/height used for the rendering surface and both layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDimensions {
    pub width: f32,
    pub height: f32,
}

impl ResolvedDimensions {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Explicit values win per axis; missing axes fall back to the natural
    /// pixel size of the base texture.
    pub fn resolve(width: Option<f32>, height: Option<f32>, natural: UVec2) -> Self {
        Self {
            width: width.unwrap_or(natural.x as f32),
            height: height.unwrap_or(natural.y as f32),
        }
    }

    pub fn as_vec2(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    pub fn half(&self) -> Vec2 {
        self.as_vec2() * 0.5
    }

    /// Backing-store size in physical pixels for the given device pixel ratio.
    /// Never zero on either axis.
    pub fn physical_size(&self, device_pixel_ratio: f32) -> UVec2 {
        let scaled = (self.as_vec2() * device_pixel_ratio).ceil();
        UVec2::new(scaled.x.max(1.0) as u32, scaled.y.max(1.0) as u32)
    }
}

/// Axis-aligned rectangle in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    pub fn new(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, point: Vec2) -> bool {
        let max = self.origin + self.size;
        point.x >= self.origin.x && point.y >= self.origin.y && point.x < max.x && point.y < max.y
    }
}

/// How a pointer position is turned into a displacement vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PointerModel {
    /// Normalize against the whole viewport, recenter, scale by the surface
    /// size and divide by the intensity.
    #[default]
    ViewportNormalized,
    /// Offset from the surface center in surface-local coordinates, divided
    /// by a fixed divisor.
    SurfaceLocal,
}

impl PointerModel {
    /// Divisor applied when the config leaves `intensity` unset.
    pub fn default_divisor(&self) -> f32 {
        match self {
            Self::ViewportNormalized => 10.0,
            Self::SurfaceLocal => 20.0,
        }
    }

    /// Listener scope used when the config leaves `scope` unset.
    pub fn default_scope(&self) -> ListenerScope {
        match self {
            Self::ViewportNormalized => ListenerScope::Window,
            Self::SurfaceLocal => ListenerScope::Surface,
        }
    }
}

impl FromStr for PointerModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewport" | "viewport-normalized" => Ok(Self::ViewportNormalized),
            "surface" | "surface-local" => Ok(Self::SurfaceLocal),
            other => Err(format!(
                "unknown pointer model '{other}' (expected 'viewport' or 'surface')"
            )),
        }
    }
}

impl fmt::Display for PointerModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ViewportNormalized => "viewport-normalized",
            Self::SurfaceLocal => "surface-local",
        })
    }
}

/// Where the pointer-move listener is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListenerScope {
    /// Every pointer move delivered to the host window.
    Window,
    /// Only pointer moves over the rendering surface's bounding box.
    Surface,
}

impl FromStr for ListenerScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "window" => Ok(Self::Window),
            "surface" => Ok(Self::Surface),
            other => Err(format!(
                "unknown listener scope '{other}' (expected 'window' or 'surface')"
            )),
        }
    }
}

impl fmt::Display for ListenerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Window => "window",
            Self::Surface => "surface",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_id_uniqueness() {
        assert_ne!(ViewId::new(), ViewId::new());
    }

    #[test]
    fn explicit_dimensions_win() {
        let dims = ResolvedDimensions::resolve(Some(320.0), Some(240.0), UVec2::new(800, 600));
        assert_eq!(dims, ResolvedDimensions::new(320.0, 240.0));
    }

    #[test]
    fn missing_dimensions_use_natural_size() {
        let dims = ResolvedDimensions::resolve(None, None, UVec2::new(800, 600));
        assert_eq!(dims, ResolvedDimensions::new(800.0, 600.0));
    }

    #[test]
    fn dimensions_resolve_per_axis() {
        let dims = ResolvedDimensions::resolve(Some(100.0), None, UVec2::new(800, 600));
        assert_eq!(dims, ResolvedDimensions::new(100.0, 600.0));
    }

    #[test]
    fn physical_size_scales_with_pixel_ratio() {
        let dims = ResolvedDimensions::new(200.5, 100.0);
        assert_eq!(dims.physical_size(1.0), UVec2::new(201, 100));
        assert_eq!(dims.physical_size(2.0), UVec2::new(401, 200));
        assert_eq!(ResolvedDimensions::new(0.0, 0.0).physical_size(1.0), UVec2::ONE);
    }

    #[test]
    fn rect_contains_is_half_open() {
        let r = Rect::new(Vec2::new(10.0, 10.0), Vec2::new(100.0, 50.0));
        assert!(r.contains(Vec2::new(10.0, 10.0)));
        assert!(r.contains(Vec2::new(109.9, 59.9)));
        assert!(!r.contains(Vec2::new(110.0, 20.0)));
        assert!(!r.contains(Vec2::new(9.0, 20.0)));
    }

    #[test]
    fn model_defaults() {
        assert_eq!(PointerModel::default(), PointerModel::ViewportNormalized);
        assert_eq!(PointerModel::ViewportNormalized.default_divisor(), 10.0);
        assert_eq!(PointerModel::SurfaceLocal.default_divisor(), 20.0);
        assert_eq!(
            PointerModel::SurfaceLocal.default_scope(),
            ListenerScope::Surface
        );
    }

    #[test]
    fn parse_model_and_scope() {
        assert_eq!("surface".parse::<PointerModel>(), Ok(PointerModel::SurfaceLocal));
        assert_eq!(
            "viewport-normalized".parse::<PointerModel>(),
            Ok(PointerModel::ViewportNormalized)
        );
        assert!("diagonal".parse::<PointerModel>().is_err());
        assert_eq!("window".parse::<ListenerScope>(), Ok(ListenerScope::Window));
    }

    #[test]
    fn image_ref_serializes_as_plain_string() {
        let r = ImageRef::new("assets/photo.jpg");
        assert_eq!(serde_json::to_string(&r).unwrap(), "\"assets/photo.jpg\"");
        assert_eq!(r.as_path(), Path::new("assets/photo.jpg"));
    }
}
