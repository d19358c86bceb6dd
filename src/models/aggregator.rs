//! Test-time augmentation: average the model's output over randomized variants

use crate::augmentation::Augmenter;
use crate::error::Result;
use crate::models::classifier::Classifier;
use crate::types::Prediction;
use rand::Rng;
use std::path::Path;
use tracing::{debug, info};

/// Averages one plain and `k` augmented predictions into a single result.
#[derive(Debug, Clone, Copy, Default)]
pub struct TtaAggregator {
    augmenter: Augmenter,
}

impl TtaAggregator {
    pub fn new(augmenter: Augmenter) -> Self {
        Self { augmenter }
    }

    /// Predict `image_path` with `k` augmented variants.
    ///
    /// The image is decoded once; any failure aborts the whole aggregation.
    /// With `k == 0` this is a single direct pass.
    pub fn aggregate<R: Rng + ?Sized>(
        &self,
        classifier: &Classifier,
        image_path: &Path,
        k: usize,
        rng: &mut R,
    ) -> Result<Prediction> {
        let preprocessor = classifier.preprocessor();
        let pixels = preprocessor.load_pixels(image_path)?;

        let mut runs = Vec::with_capacity(k + 1);
        runs.push(classifier.predict_tensor(preprocessor.normalize(pixels.view()).view())?);

        for i in 0..k {
            let variant = self.augmenter.augment(pixels.view(), rng);
            let probs = classifier.predict_tensor(preprocessor.normalize(variant.view()).view())?;
            debug!(model = %classifier.name(), augmentation = i + 1, "Augmented prediction");
            runs.push(probs);
        }

        let averaged = mean_distribution(&runs);
        let prediction = Prediction::from_distribution(classifier.labels(), averaged, k);

        info!(
            model = %classifier.name(),
            augmentations = k,
            class = %prediction.label,
            confidence = format!("{:.2}%", prediction.confidence),
            "TTA prediction"
        );
        Ok(prediction)
    }
}

/// Element-wise arithmetic mean of equally sized vectors
pub fn mean_distribution(runs: &[Vec<f64>]) -> Vec<f64> {
    let Some(first) = runs.first() else {
        return Vec::new();
    };

    let mut sum = vec![0.0; first.len()];
    for run in runs {
        for (acc, value) in sum.iter_mut().zip(run) {
            *acc += value;
        }
    }

    let n = runs.len() as f64;
    sum.into_iter().map(|v| v / n).collect()
}
