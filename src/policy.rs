//! Confidence threshold decision over an aggregated prediction

use crate::error::Result;
use crate::models::{Classifier, TtaAggregator};
use crate::types::{Prediction, PredictionResponse, PredictionStatus, RankedProbabilities, TopPrediction};
use rand::Rng;
use std::path::Path;
use tracing::{error, warn};

/// Threshold used by the live endpoint
pub const DEFAULT_THRESHOLD: f64 = 0.50;

/// Turns a prediction (or the error that replaced it) into a response with a status.
#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy {
    /// Minimum winning probability (0-1) for a `success`
    pub threshold: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl DecisionPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Status for a winning probability; the threshold itself is a success
    pub fn status_for(&self, probability: f64) -> PredictionStatus {
        if probability < self.threshold {
            PredictionStatus::Warning
        } else {
            PredictionStatus::Success
        }
    }

    /// Classify with `k` augmentations and decide on the outcome.
    ///
    /// Never fails: errors become an `error` response.
    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        classifier: &Classifier,
        aggregator: &TtaAggregator,
        image_path: &Path,
        k: usize,
        rng: &mut R,
    ) -> PredictionResponse {
        let outcome = aggregator
            .aggregate(classifier, image_path, k, rng)
            .map(|prediction| {
                let top_3 = classifier.top_3(&prediction.distribution);
                (prediction, top_3)
            });

        self.decide(outcome, method_label(k))
    }

    pub fn decide(
        &self,
        outcome: Result<(Prediction, Vec<TopPrediction>)>,
        method: String,
    ) -> PredictionResponse {
        let (prediction, top_3) = match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, kind = e.kind(), "Prediction failed");
                return PredictionResponse {
                    status: PredictionStatus::Error,
                    label: None,
                    confidence: 0.0,
                    probability: 0.0,
                    probabilities: RankedProbabilities::default(),
                    method,
                    message: format!("Error processing the image: {}", e),
                    top_3: Vec::new(),
                };
            }
        };

        let status = self.status_for(prediction.probability);
        let message = if status == PredictionStatus::Warning {
            warn!(
                class = %prediction.label,
                probability = prediction.probability,
                threshold = self.threshold,
                "Low confidence prediction"
            );
            format!(
                "Low confidence ({:.1}%). A minimum of {:.0}% is required.",
                prediction.confidence,
                self.threshold * 100.0
            )
        } else {
            format!("Detected: {} ({:.1}%)", prediction.label, prediction.confidence)
        };

        PredictionResponse {
            status,
            label: Some(prediction.label),
            confidence: prediction.confidence,
            probability: prediction.probability,
            probabilities: prediction.probabilities,
            method,
            message,
            top_3,
        }
    }
}

/// Human-readable name of the prediction method
pub fn method_label(k: usize) -> String {
    if k > 0 {
        format!("TTA ({} augmentations)", k)
    } else {
        "Direct prediction (no TTA)".to_string()
    }
}
