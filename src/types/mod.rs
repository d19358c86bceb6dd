//! Type definitions for the classification service

pub mod model;
pub mod prediction;

pub use model::{ModelFamily, ModelInfo, TensorLayout};
pub use prediction::{
    BatchItem, BatchOutcome, Prediction, PredictionResponse, PredictionStatus,
    RankedProbabilities, TopPrediction,
};
