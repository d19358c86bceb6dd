//! Prediction data structures

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;

/// Outcome of a single request after the decision policy ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Success,
    Warning,
    Error,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Success => "success",
            PredictionStatus::Warning => "warning",
            PredictionStatus::Error => "error",
        }
    }
}

/// Label → probability pairs, kept sorted by descending probability.
///
/// Serializes as a JSON object whose keys appear in ranking order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedProbabilities(Vec<(String, f64)>);

impl RankedProbabilities {
    /// Rank a distribution against its labels.
    ///
    /// The sort is stable, so equal probabilities keep ascending label index order.
    pub fn from_distribution(labels: &[String], probs: &[f64]) -> Self {
        let mut ranked: Vec<(String, f64)> = labels
            .iter()
            .cloned()
            .zip(probs.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        Self(ranked)
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.iter().find(|(l, _)| l == label).map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(l, p)| (l.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().map(|(_, p)| p).sum()
    }
}

impl Serialize for RankedProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, prob) in &self.0 {
            map.serialize_entry(label, prob)?;
        }
        map.end()
    }
}

/// One of the highest-ranked candidate classes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPrediction {
    #[serde(rename = "class")]
    pub label: String,
    /// Probability on a 0-100 scale
    pub confidence: f64,
    /// Probability on a 0-1 scale
    pub probability: f64,
}

/// Result of a direct or test-time-augmented prediction
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    #[serde(rename = "class")]
    pub label: String,
    /// Winning probability on a 0-100 scale
    pub confidence: f64,
    /// Winning probability on a 0-1 scale
    pub probability: f64,
    /// Full distribution, descending
    pub probabilities: RankedProbabilities,
    /// Number of augmented variants averaged in (0 for a direct pass)
    pub num_augmentations: usize,
    /// Distribution in label index order
    #[serde(skip)]
    pub distribution: Vec<f64>,
}

impl Prediction {
    /// Build a prediction from a probability vector aligned with `labels`.
    ///
    /// Ties resolve to the lowest index.
    pub fn from_distribution(labels: &[String], probs: Vec<f64>, num_augmentations: usize) -> Self {
        let (best_idx, best_prob) = argmax(&probs);
        let label = labels.get(best_idx).cloned().unwrap_or_default();

        Self {
            label,
            confidence: best_prob * 100.0,
            probability: best_prob,
            probabilities: RankedProbabilities::from_distribution(labels, &probs),
            num_augmentations,
            distribution: probs,
        }
    }
}

/// Index and value of the first maximum entry
pub fn argmax(values: &[f64]) -> (usize, f64) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (idx, value)| {
            if value > best.1 {
                (idx, value)
            } else {
                best
            }
        })
}

/// Final per-request result handed to the web layer
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub status: PredictionStatus,
    #[serde(rename = "class", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub confidence: f64,
    pub probability: f64,
    pub probabilities: RankedProbabilities,
    pub method: String,
    pub message: String,
    pub top_3: Vec<TopPrediction>,
}

/// Outcome of one item in a batch prediction
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub image_path: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchOutcome {
    Predicted(Prediction),
    Failed { error: String },
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Predicted(_))
    }
}
