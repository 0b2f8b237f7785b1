use parallax_common::{ImageRef, ListenerScope, PointerModel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors from reading or validating a view configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format: {0} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),
    #[error("{field} must be a positive number, got {value}")]
    NotPositive { field: &'static str, value: f32 },
}

/// Everything one mount of the view depends on.
///
/// Immutable for the lifetime of a mount: any change tears the rendering
/// state down and builds it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewConfig {
    /// Base image.
    pub image: ImageRef,
    /// Grayscale depth map.
    pub depth_map: ImageRef,
    /// Output width in logical pixels; natural base width when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    /// Output height in logical pixels; natural base height when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    /// Divisor of the displacement; larger is calmer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f32>,
    #[serde(default)]
    pub model: PointerModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ListenerScope>,
}

impl ViewConfig {
    pub fn new(image: impl Into<ImageRef>, depth_map: impl Into<ImageRef>) -> Self {
        Self {
            image: image.into(),
            depth_map: depth_map.into(),
            width: None,
            height: None,
            intensity: None,
            model: PointerModel::default(),
            scope: None,
        }
    }

    pub fn with_dimensions(mut self, width: f32, height: f32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn with_model(mut self, model: PointerModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_scope(mut self, scope: ListenerScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Effective divisor: `intensity` if set, else the model's default.
    pub fn divisor(&self) -> f32 {
        self.intensity.unwrap_or_else(|| self.model.default_divisor())
    }

    /// Effective listener scope: `scope` if set, else the model's default.
    pub fn listener_scope(&self) -> ListenerScope {
        self.scope.unwrap_or_else(|| self.model.default_scope())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("width", self.width),
            ("height", self.height),
            ("intensity", self.intensity),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                if !(value.is_finite() && value > 0.0) {
                    return Err(ConfigError::NotPositive { field, value });
                }
            }
        }
        Ok(())
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, choosing the format by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&data),
            Some("json") => Self::from_json_str(&data),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}
