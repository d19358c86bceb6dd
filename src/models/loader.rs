//! ONNX model and label loading

use crate::config::DEFAULT_CLASSES;
use crate::error::{ClassifierError, Result};
use crate::models::inference::OnnxBackend;
use crate::types::TensorLayout;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::{info, warn};

/// Loader for classifier artifacts
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        // Initialize ONNX Runtime
        ort::init()
            .commit()
            .map_err(|e| ClassifierError::Runtime(e.to_string()))?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load one exported classifier into an inference session.
    ///
    /// A missing file is `ArtifactMissing`; a file ONNX Runtime rejects is `ModelLoad`.
    pub fn load_model<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        layout: TensorLayout,
    ) -> Result<OnnxBackend> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ClassifierError::ArtifactMissing(path.to_path_buf()));
        }

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let load_error = |reason: String| ClassifierError::ModelLoad {
            path: path.to_path_buf(),
            reason,
        };

        let session = Session::builder()
            .map_err(|e| load_error(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(e.to_string()))?
            .with_intra_threads(self.onnx_threads)
            .map_err(|e| load_error(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| load_error(e.to_string()))?;

        // Get input/output names
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                session
                    .outputs
                    .last()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "output".to_string())
            });

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            layout = ?layout,
            "Model loaded successfully"
        );

        Ok(OnnxBackend::new(
            name.to_string(),
            session,
            input_name,
            output_name,
            layout,
        ))
    }
}

/// Load the ordered label list from a JSON array of strings.
///
/// Any problem (missing file, bad JSON, empty list) degrades to the default
/// label set with a warning instead of failing.
pub fn load_labels<P: AsRef<Path>>(path: P) -> Vec<String> {
    let path = path.as_ref();

    if !path.exists() {
        warn!(path = %path.display(), "Label file not found, using default labels");
        return default_labels();
    }

    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str::<Vec<String>>(&content).map_err(|e| e.to_string()));

    match parsed {
        Ok(labels) if !labels.is_empty() => {
            info!(path = %path.display(), classes = %labels.join(", "), "Labels loaded");
            labels
        }
        Ok(_) => {
            warn!(path = %path.display(), "Label file is empty, using default labels");
            default_labels()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to load labels, using default labels");
            default_labels()
        }
    }
}

/// The fallback label set
pub fn default_labels() -> Vec<String> {
    DEFAULT_CLASSES.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_labels_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let labels = load_labels(dir.path().join("classes_classes.json"));
        assert_eq!(labels, vec!["Healthy", "Mosaic", "RedRot", "Rust", "Yellow"]);
    }

    #[test]
    fn test_invalid_or_empty_labels_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let invalid = dir.path().join("invalid.json");
        std::fs::write(&invalid, "{not json").unwrap();
        assert_eq!(load_labels(&invalid), default_labels());

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "[]").unwrap();
        assert_eq!(load_labels(&empty), default_labels());
    }

    #[test]
    fn test_labels_loaded_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classes_latest.json");
        std::fs::write(&path, r#"["Rust", "Healthy", "Mosaic"]"#).unwrap();

        assert_eq!(load_labels(&path), vec!["Rust", "Healthy", "Mosaic"]);
    }

    #[test]
    fn test_missing_model_is_artifact_missing() {
        let loader = ModelLoader { onnx_threads: 1 };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ResNet50_latest.onnx");

        let err = loader
            .load_model(&path, "ResNet50", TensorLayout::Nhwc)
            .err()
            .unwrap();
        assert!(matches!(err, ClassifierError::ArtifactMissing(p) if p == path));
    }
}
