//! Classifier, inference backends and prediction aggregation

pub mod aggregator;
pub mod classifier;
pub mod inference;
pub mod loader;
pub mod registry;

pub use aggregator::TtaAggregator;
pub use classifier::Classifier;
pub use inference::{InferenceBackend, OnnxBackend};
pub use loader::ModelLoader;
pub use registry::ModelRegistry;
