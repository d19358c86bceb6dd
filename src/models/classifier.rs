//! Classifier wrapper: one loaded model, its labels and its preprocessing

use crate::config::ModelConfig;
use crate::error::{ClassifierError, Result};
use crate::models::inference::InferenceBackend;
use crate::models::loader::{load_labels, ModelLoader};
use crate::preprocessor::ImagePreprocessor;
use crate::types::{
    BatchItem, BatchOutcome, ModelFamily, ModelInfo, Prediction, TensorLayout, TopPrediction,
};
use ndarray::ArrayView4;
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Tolerance for treating a raw output as an already normalized distribution
const DISTRIBUTION_TOLERANCE: f64 = 1e-3;

/// A loaded model with its fixed label list and family-specific preprocessing.
///
/// Never mutated after construction.
pub struct Classifier {
    name: String,
    labels: Vec<String>,
    family: ModelFamily,
    layout: TensorLayout,
    preprocessor: ImagePreprocessor,
    backend: Box<dyn InferenceBackend>,
}

impl Classifier {
    /// Load weights and labels for a configured model.
    ///
    /// Missing or unreadable weights are fatal; missing labels are not.
    pub fn load(config: &ModelConfig, loader: &ModelLoader) -> Result<Self> {
        let backend = loader.load_model(&config.path, &config.name, config.layout)?;
        let labels = load_labels(&config.classes);
        let family = ModelFamily::from_tag(config.family_tag());

        let classifier = Self::from_backend(&config.name, labels, family, config.size, Box::new(backend))
            .with_layout(config.layout);

        info!(
            model = %classifier.name,
            family = ?classifier.family,
            classes = classifier.labels.len(),
            "Classifier ready"
        );
        Ok(classifier)
    }

    /// Build a classifier around an existing backend
    pub fn from_backend(
        name: &str,
        labels: Vec<String>,
        family: ModelFamily,
        size: (u32, u32),
        backend: Box<dyn InferenceBackend>,
    ) -> Self {
        if family == ModelFamily::Generic {
            warn!(model = %name, "Unknown model family, using generic [-1, 1] preprocessing");
        } else {
            debug!(model = %name, family = ?family, "Using family-specific preprocessing");
        }

        Self {
            name: name.to_string(),
            labels,
            family,
            layout: TensorLayout::Nhwc,
            preprocessor: ImagePreprocessor::new(size, family),
            backend,
        }
    }

    fn with_layout(mut self, layout: TensorLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn preprocessor(&self) -> &ImagePreprocessor {
        &self.preprocessor
    }

    /// Run the model on a preprocessed batch and return a probability vector.
    ///
    /// Raw scores that are not already a distribution are passed through softmax;
    /// near-distributions are rescaled to sum to exactly one.
    pub fn predict_tensor(&self, tensor: ArrayView4<f32>) -> Result<Vec<f64>> {
        let raw = self.backend.run(tensor)?;

        if raw.len() != self.labels.len() {
            return Err(ClassifierError::Inference(format!(
                "model {} produced {} outputs for {} labels",
                self.name,
                raw.len(),
                self.labels.len()
            )));
        }

        let values: Vec<f64> = raw.into_iter().map(f64::from).collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ClassifierError::Inference(format!(
                "model {} produced non-finite outputs",
                self.name
            )));
        }

        if is_distribution(&values) {
            let sum: f64 = values.iter().sum();
            Ok(values.into_iter().map(|v| v / sum).collect())
        } else {
            debug!(model = %self.name, "Applying softmax to raw model output");
            Ok(softmax(&values))
        }
    }

    /// Basic prediction on [0, 1] scaled input
    pub fn predict(&self, image_path: &Path) -> Result<Prediction> {
        let tensor = self.preprocessor.preprocess_basic(image_path)?;
        let probs = self.predict_tensor(tensor.view())?;
        let prediction = Prediction::from_distribution(&self.labels, probs, 0);

        info!(
            model = %self.name,
            class = %prediction.label,
            confidence = format!("{:.2}%", prediction.confidence),
            "Prediction"
        );
        Ok(prediction)
    }

    /// Single pass with the family-specific normalization and no augmentation
    pub fn predict_direct(&self, image_path: &Path) -> Result<Prediction> {
        debug!(model = %self.name, "Direct prediction without augmentation");
        let tensor = self.preprocessor.preprocess(image_path)?;
        let probs = self.predict_tensor(tensor.view())?;
        Ok(Prediction::from_distribution(&self.labels, probs, 0))
    }

    /// The `k` most probable classes, descending.
    ///
    /// Equal probabilities keep ascending label index order.
    pub fn top_k(&self, probs: &[f64], k: usize) -> Vec<TopPrediction> {
        let mut indices: Vec<usize> = (0..probs.len().min(self.labels.len())).collect();
        indices.sort_by(|&a, &b| probs[b].partial_cmp(&probs[a]).unwrap_or(Ordering::Equal));

        indices
            .into_iter()
            .take(k)
            .map(|idx| TopPrediction {
                label: self.labels[idx].clone(),
                confidence: probs[idx] * 100.0,
                probability: probs[idx],
            })
            .collect()
    }

    /// The three most probable classes
    pub fn top_3(&self, probs: &[f64]) -> Vec<TopPrediction> {
        self.top_k(probs, 3)
    }

    /// Direct prediction on an image, reduced to its top three classes
    pub fn top_3_for_image(&self, image_path: &Path) -> Result<Vec<TopPrediction>> {
        let prediction = self.predict_direct(image_path)?;
        Ok(self.top_3(&prediction.distribution))
    }

    /// Predict several images in sequence; a failing item does not stop the rest
    pub fn predict_batch<P: AsRef<Path>>(&self, image_paths: &[P]) -> Vec<BatchItem> {
        image_paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let outcome = match self.predict(path) {
                    Ok(prediction) => BatchOutcome::Predicted(prediction),
                    Err(e) => {
                        error!(model = %self.name, path = %path.display(), error = %e, "Batch item failed");
                        BatchOutcome::Failed { error: e.to_string() }
                    }
                };
                BatchItem {
                    image_path: path.display().to_string(),
                    outcome,
                }
            })
            .collect()
    }

    /// Describe the model's shapes and classes
    pub fn info(&self) -> ModelInfo {
        let (width, height) = self.preprocessor.size();
        let input_shape = match self.layout {
            TensorLayout::Nhwc => vec![1, height as i64, width as i64, 3],
            TensorLayout::Nchw => vec![1, 3, height as i64, width as i64],
        };

        ModelInfo {
            name: self.name.clone(),
            family: self.family,
            input_shape,
            output_shape: vec![1, self.labels.len() as i64],
            classes: self.labels.clone(),
            num_classes: self.labels.len(),
        }
    }
}

fn is_distribution(values: &[f64]) -> bool {
    values.iter().all(|&v| (0.0..=1.0).contains(&v))
        && (values.iter().sum::<f64>() - 1.0).abs() <= DISTRIBUTION_TOLERANCE
}

fn softmax(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max_val).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if sum <= 0.0 {
        return vec![0.0; values.len()];
    }
    exps.iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::inference::testing::{FixedBackend, ScriptedBackend};
    use crate::models::loader::default_labels;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    fn write_leaf(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 90]))
            .save(&path)
            .unwrap();
        path
    }

    fn classifier(output: Vec<f32>) -> Classifier {
        Classifier::from_backend(
            "ResNet50",
            default_labels(),
            ModelFamily::ResNet,
            (16, 16),
            Box::new(FixedBackend::new(output)),
        )
    }

    #[test]
    fn test_predict_probabilities_match_labels() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_leaf(dir.path(), "leaf.png");
        let classifier = classifier(vec![0.05, 0.1, 0.15, 0.6, 0.1]);

        let prediction = classifier.predict(&image).unwrap();

        assert_eq!(prediction.label, "Rust");
        assert!((prediction.probabilities.sum() - 1.0).abs() < 1e-4);
        assert!((prediction.confidence - prediction.probability * 100.0).abs() < 1e-6);
        let mut keys: Vec<&str> = prediction.probabilities.iter().map(|(l, _)| l).collect();
        keys.sort();
        assert_eq!(keys, vec!["Healthy", "Mosaic", "RedRot", "Rust", "Yellow"]);
    }

    #[test]
    fn test_raw_logits_are_softmaxed() {
        let classifier = classifier(vec![2.0, 1.0, 0.0, -1.0, 3.0]);
        let tensor = ndarray::Array4::<f32>::zeros((1, 16, 16, 3));

        let probs = classifier.predict_tensor(tensor.view()).unwrap();

        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(probs[4] > probs[0] && probs[0] > probs[1]);
    }

    #[test]
    fn test_near_distribution_is_renormalized() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_leaf(dir.path(), "leaf.png");
        let classifier = classifier(vec![0.2, 0.2, 0.2, 0.2, 0.2009]);

        let prediction = classifier.predict_direct(&image).unwrap();

        assert!((prediction.probabilities.sum() - 1.0).abs() < 1e-9);
        assert_eq!(prediction.label, "Yellow");
        assert!((prediction.confidence - prediction.probability * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_output_is_inference_error() {
        let tensor = ndarray::Array4::<f32>::zeros((1, 16, 16, 3));

        for output in [
            vec![f32::NAN, 0.2, 0.2, 0.2, 0.2],
            vec![f32::INFINITY, 0.0, 0.0, 0.0, 0.0],
            vec![1.0, f32::NEG_INFINITY, 0.0, 0.0, 0.0],
        ] {
            let err = classifier(output).predict_tensor(tensor.view()).unwrap_err();
            assert!(matches!(err, ClassifierError::Inference(_)));
        }
    }

    #[test]
    fn test_output_label_mismatch_is_inference_error() {
        let classifier = classifier(vec![0.5, 0.5]);
        let tensor = ndarray::Array4::<f32>::zeros((1, 16, 16, 3));

        let err = classifier.predict_tensor(tensor.view()).unwrap_err();
        assert!(matches!(err, ClassifierError::Inference(_)));
    }

    #[test]
    fn test_top_3_sorted_and_ties_by_index() {
        let classifier = classifier(vec![0.2; 5]);
        let top = classifier.top_3(&[0.1, 0.3, 0.1, 0.3, 0.2]);

        let labels: Vec<&str> = top.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["Mosaic", "Rust", "Yellow"]);
        assert!((top[0].confidence - 30.0).abs() < 1e-9);
        assert!((top[2].probability - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_top_3_with_fewer_labels() {
        let classifier = Classifier::from_backend(
            "tiny",
            vec!["Healthy".to_string(), "Rust".to_string()],
            ModelFamily::Generic,
            (8, 8),
            Box::new(FixedBackend::new(vec![0.3, 0.7])),
        );

        let top = classifier.top_3(&[0.3, 0.7]);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].label, "Rust");
    }

    #[test]
    fn test_top_3_for_image_matches_direct_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_leaf(dir.path(), "leaf.png");
        let classifier = classifier(vec![0.1, 0.5, 0.05, 0.05, 0.3]);

        let prediction = classifier.predict_direct(&image).unwrap();
        let top = classifier.top_3_for_image(&image).unwrap();

        assert_eq!(top.len(), 3);
        for entry in &top {
            assert_eq!(prediction.probabilities.get(&entry.label), Some(entry.probability));
        }
    }

    #[test]
    fn test_predict_batch_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_leaf(dir.path(), "good.png");
        let bad = dir.path().join("bad.jpg");
        std::fs::write(&bad, b"garbage").unwrap();
        let also_good = write_leaf(dir.path(), "also_good.png");

        let classifier = Classifier::from_backend(
            "ResNet50",
            default_labels(),
            ModelFamily::ResNet,
            (16, 16),
            Box::new(ScriptedBackend::new(vec![
                vec![0.6, 0.1, 0.1, 0.1, 0.1],
                vec![0.1, 0.1, 0.1, 0.1, 0.6],
            ])),
        );

        let results = classifier.predict_batch(&[good, bad.clone(), also_good]);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(!results[1].is_ok());
        assert!(results[2].is_ok());
        assert_eq!(results[1].image_path, bad.display().to_string());
        match &results[2].outcome {
            BatchOutcome::Predicted(p) => assert_eq!(p.label, "Yellow"),
            BatchOutcome::Failed { error } => panic!("unexpected failure: {error}"),
        }
    }

    #[test]
    fn test_info_reports_shapes() {
        let classifier = classifier(vec![0.2; 5]);
        let info = classifier.info();

        assert_eq!(info.name, "ResNet50");
        assert_eq!(info.input_shape, vec![1, 16, 16, 3]);
        assert_eq!(info.output_shape, vec![1, 5]);
        assert_eq!(info.num_classes, 5);
    }
}
