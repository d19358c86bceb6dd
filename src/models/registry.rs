//! Lazily loaded, shared classifiers keyed by model name

use crate::config::{ModelConfig, ModelsConfig};
use crate::error::{ClassifierError, Result};
use crate::models::classifier::Classifier;
use crate::models::loader::ModelLoader;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{error, info, warn};

type Slot = Arc<OnceCell<Arc<Classifier>>>;
type LoadFn = dyn Fn(&ModelConfig) -> Result<Classifier> + Send + Sync;

/// Get-or-create cache of classifiers.
///
/// The first request for a model loads it; concurrent first requests for the
/// same model wait on a single load. A failed load leaves the slot empty.
pub struct ModelRegistry {
    models: ModelsConfig,
    slots: RwLock<HashMap<String, Slot>>,
    load: Box<LoadFn>,
}

impl ModelRegistry {
    /// Registry backed by ONNX Runtime sessions
    pub fn new(models: &ModelsConfig) -> Result<Self> {
        let loader = ModelLoader::with_threads(models.onnx_threads.max(1))?;
        Ok(Self::with_loader(models, move |config| {
            Classifier::load(config, &loader)
        }))
    }

    /// Registry with a custom load function
    pub fn with_loader<F>(models: &ModelsConfig, load: F) -> Self
    where
        F: Fn(&ModelConfig) -> Result<Classifier> + Send + Sync + 'static,
    {
        Self {
            models: models.clone(),
            slots: RwLock::new(HashMap::new()),
            load: Box::new(load),
        }
    }

    /// Catalog entry for `name`, falling back to the default model
    pub fn resolve(&self, name: &str) -> Result<&ModelConfig> {
        if let Some(config) = self.models.find(name) {
            return Ok(config);
        }

        warn!(
            requested = %name,
            default = %self.models.default_model,
            "Unknown model requested, using default"
        );
        self.models
            .find(&self.models.default_model)
            .ok_or_else(|| ClassifierError::UnknownModel(name.to_string()))
    }

    /// Shared classifier for `name`, loading it on first use
    pub fn get(&self, name: &str) -> Result<Arc<Classifier>> {
        let config = self.resolve(name)?;
        let slot = self.slot(&config.name);

        slot.get_or_try_init(|| {
            let start = Instant::now();
            info!(model = %config.name, "Loading model");
            match (self.load)(config) {
                Ok(classifier) => {
                    info!(
                        model = %config.name,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Model cached"
                    );
                    Ok(Arc::new(classifier))
                }
                Err(e) => {
                    error!(model = %config.name, error = %e, "Model load failed");
                    Err(e)
                }
            }
        })
        .cloned()
    }

    fn slot(&self, key: &str) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
        {
            return slot.clone();
        }

        self.slots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// The classifier for `name` if it is already loaded; never triggers a load
    pub fn cached(&self, name: &str) -> Option<Arc<Classifier>> {
        let config = self.models.find(name)?;
        self.slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&config.name)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.cached(name).is_some()
    }

    /// Names of all loaded models
    pub fn loaded_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Whether the weights file for `name` exists on disk
    pub fn is_available(&self, name: &str) -> bool {
        self.models
            .find(name)
            .is_some_and(|config| config.path.exists())
    }

    pub fn catalog(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.catalog.values()
    }

    pub fn default_model(&self) -> &str {
        &self.models.default_model
    }
}
