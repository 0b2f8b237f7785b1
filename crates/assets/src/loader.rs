use glam::UVec2;
use image::RgbaImage;
use parallax_common::ImageRef;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Errors from texture loading.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {locator}: {source}")]
    Decode {
        locator: ImageRef,
        #[source]
        source: image::ImageError,
    },
    #[error("image not found: {0}")]
    NotFound(ImageRef),
    #[error("image {0} has no pixels")]
    Empty(ImageRef),
}

/// A decoded raster image ready to be uploaded as a texture.
#[derive(Clone)]
pub struct Texture {
    locator: ImageRef,
    pixels: Arc<RgbaImage>,
}

impl Texture {
    /// Wrap decoded pixels. Rejects zero-sized images.
    pub fn new(locator: ImageRef, pixels: Arc<RgbaImage>) -> Result<Self, LoadError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(LoadError::Empty(locator));
        }
        Ok(Self { locator, pixels })
    }

    pub fn locator(&self) -> &ImageRef {
        &self.locator
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Natural pixel dimensions of the decoded image.
    pub fn natural_size(&self) -> UVec2 {
        UVec2::new(self.pixels.width(), self.pixels.height())
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("locator", &self.locator)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Resolves an image locator to a decoded texture.
pub trait ImageLoader {
    fn load(&self, locator: &ImageRef) -> Result<Texture, LoadError>;
}

/// Loads images from the filesystem. Relative locators resolve against `root`
/// when one is set.
#[derive(Debug, Clone, Default)]
pub struct FsImageLoader {
    root: Option<PathBuf>,
}

impl FsImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, locator: &ImageRef) -> PathBuf {
        let path = locator.as_path();
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ImageLoader for FsImageLoader {
    fn load(&self, locator: &ImageRef) -> Result<Texture, LoadError> {
        let path = self.resolve(locator);
        let bytes = std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound(locator.clone()),
            _ => LoadError::Io {
                path: path.clone(),
                source,
            },
        })?;
        let decoded = image::load_from_memory(&bytes).map_err(|source| LoadError::Decode {
            locator: locator.clone(),
            source,
        })?;
        let texture = Texture::new(locator.clone(), Arc::new(decoded.to_rgba8()))?;
        tracing::debug!(
            %locator,
            width = texture.width(),
            height = texture.height(),
            "texture loaded"
        );
        Ok(texture)
    }
}

/// In-memory image registry keyed by locator.
#[derive(Debug, Clone, Default)]
pub struct MemoryImageLoader {
    images: BTreeMap<ImageRef, Arc<RgbaImage>>,
}

impl MemoryImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image under a locator, replacing any previous entry.
    pub fn insert(&mut self, locator: impl Into<ImageRef>, pixels: RgbaImage) {
        self.images.insert(locator.into(), Arc::new(pixels));
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ImageLoader for MemoryImageLoader {
    fn load(&self, locator: &ImageRef) -> Result<Texture, LoadError> {
        let pixels = self
            .images
            .get(locator)
            .ok_or_else(|| LoadError::NotFound(locator.clone()))?;
        Texture::new(locator.clone(), Arc::clone(pixels))
    }
}
