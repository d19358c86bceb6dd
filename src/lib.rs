//! SaccharumVision Library
//!
//! Sugar cane leaf disease classification: pretrained CNNs exported to ONNX,
//! family-specific preprocessing, test-time augmentation and a confidence
//! threshold that separates confident detections from advisory ones.

pub mod augmentation;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod policy;
pub mod preprocessor;
pub mod server;
pub mod types;

pub use config::AppConfig;
pub use error::{ClassifierError, Result};
pub use models::{Classifier, ModelRegistry, TtaAggregator};
pub use policy::DecisionPolicy;
pub use preprocessor::ImagePreprocessor;
pub use types::{Prediction, PredictionResponse, PredictionStatus};
