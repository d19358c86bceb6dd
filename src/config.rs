//! Configuration management for the classification service

use crate::types::TensorLayout;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default label set used when a model's label file is missing or invalid
pub const DEFAULT_CLASSES: [&str; 5] = ["Healthy", "Mosaic", "RedRot", "Rust", "Yellow"];

/// Model served when a request names an unknown model
pub const DEFAULT_MODEL: &str = "ResNet50";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub prediction: PredictionConfig,
    pub upload: UploadConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Model catalog configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Model used when the request does not name a known one
    pub default_model: String,
    /// Number of intra-op threads per ONNX session
    pub onnx_threads: usize,
    /// Available models keyed by name
    pub catalog: BTreeMap<String, ModelConfig>,
}

/// Static description of one classifier
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Model name; filled from the catalog key when omitted
    #[serde(default)]
    pub name: String,
    /// Path to the exported ONNX weights
    pub path: PathBuf,
    /// Path to the JSON label list
    pub classes: PathBuf,
    /// Expected input (width, height)
    pub size: (u32, u32),
    /// Family tag used to select input normalization; defaults to the name
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub layout: TensorLayout,
}

impl ModelsConfig {
    /// Look up a model by name, ignoring ASCII case
    pub fn find(&self, name: &str) -> Option<&ModelConfig> {
        self.catalog
            .values()
            .find(|model| model.name.eq_ignore_ascii_case(name))
    }
}

impl ModelConfig {
    pub fn new(name: &str, dir: &str, classes_file: &str, size: (u32, u32), description: &str) -> Self {
        Self {
            name: name.to_string(),
            path: PathBuf::from(format!("models/{dir}/{name}_latest.onnx")),
            classes: PathBuf::from(format!("models/{dir}/{classes_file}")),
            size,
            family: None,
            description: description.to_string(),
            layout: TensorLayout::Nhwc,
        }
    }

    /// Tag used to resolve the model family
    pub fn family_tag(&self) -> &str {
        self.family.as_deref().unwrap_or(&self.name)
    }
}

/// Prediction behavior for the live endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Minimum probability for a `success` status
    pub threshold: f64,
    /// Augmented variants averaged when TTA is requested
    pub tta_augmentations: usize,
}

/// Upload handling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
    pub allowed_extensions: Vec<String>,
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between logged summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, layered with `SACCHARUM__*` variables.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("SACCHARUM").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let mut app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.normalize();
        Ok(app)
    }

    fn normalize(&mut self) {
        for (name, model) in self.models.catalog.iter_mut() {
            if model.name.is_empty() {
                model.name = name.clone();
            }
        }
        for ext in self.upload.allowed_extensions.iter_mut() {
            *ext = ext.trim_start_matches('.').to_lowercase();
        }
    }

    /// Check critical paths; creates the upload directory if needed.
    ///
    /// Returns one message per problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.models.find(&self.models.default_model).is_none() {
            problems.push(format!(
                "Default model {} is not in the catalog",
                self.models.default_model
            ));
        }

        for model in self.models.catalog.values() {
            if let Some(dir) = model.path.parent() {
                if !dir.as_os_str().is_empty() && !dir.exists() {
                    problems.push(format!("Model directory not found: {}", dir.display()));
                    continue;
                }
            }
            if !model.path.exists() {
                problems.push(format!("Model not found: {}", model.path.display()));
            }
            if !model.classes.exists() {
                problems.push(format!(
                    "Label file for {} not found: {} (default labels will be used)",
                    model.name,
                    model.classes.display()
                ));
            }
        }

        if let Err(e) = std::fs::create_dir_all(&self.upload.dir) {
            problems.push(format!("Could not create upload directory: {}", e));
        }

        problems
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            models: ModelsConfig::default(),
            prediction: PredictionConfig::default(),
            upload: UploadConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            onnx_threads: 1,
            catalog: default_catalog(),
        }
    }
}

fn default_catalog() -> BTreeMap<String, ModelConfig> {
    [
        ModelConfig::new("ResNet50", "ResNet50", "classes_latest.json", (224, 224), "Balanced and reliable"),
        ModelConfig::new("EfficientNetB0", "EfficientNetB0", "classes_latest.json", (256, 256), "Efficient and accurate"),
        ModelConfig::new("MobileNetV2", "MobileNetV2", "classes_latest.json", (256, 256), "Fast and lightweight"),
    ]
    .into_iter()
    .map(|model| (model.name.clone(), model))
    .collect()
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.50,
            tta_augmentations: 8,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            max_bytes: 32 * 1024 * 1024,
            allowed_extensions: ["png", "jpg", "jpeg", "gif", "bmp", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
