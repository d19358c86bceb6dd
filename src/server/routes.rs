//! Request handlers

use crate::error::Result as ClassifierResult;
use crate::metrics::MetricsSnapshot;
use crate::server::upload::{self, StoredUpload};
use crate::server::{ApiError, ApiResult, AppState};
use crate::types::{BatchItem, BatchOutcome, ModelInfo, PredictionResponse, PredictionStatus, RankedProbabilities, TopPrediction};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

const SERVICE_NAME: &str = "SaccharumVision";
const SERVICE_DESCRIPTION: &str = "Sugar cane leaf disease detection";

/// One file part of a multipart upload
struct UploadedFile {
    field: String,
    file_name: String,
    data: Bytes,
}

#[derive(Default)]
struct UploadForm {
    files: Vec<UploadedFile>,
    use_tta: bool,
    model: Option<String>,
}

async fn read_form(multipart: &mut Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "use_tta" => {
                form.use_tta = field.text().await?.trim().eq_ignore_ascii_case("true");
            }
            "model" => {
                let model = field.text().await?.trim().to_string();
                if !model.is_empty() {
                    form.model = Some(model);
                }
            }
            _ => {
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let data = field.bytes().await?;
                form.files.push(UploadedFile {
                    field: name,
                    file_name,
                    data,
                });
            }
        }
    }

    Ok(form)
}

fn check_extension(state: &AppState, file_name: &str) -> ApiResult<()> {
    if upload::is_allowed(file_name, &state.config.upload.allowed_extensions) {
        Ok(())
    } else {
        warn!(file_name = %file_name, "Rejected upload with disallowed extension");
        Err(ApiError::BadRequest(format!("File format not allowed: {}", file_name)))
    }
}

#[derive(Debug, Serialize)]
pub struct PredictionBody {
    pub class: Option<String>,
    pub confidence: f64,
    pub probability: f64,
    pub method: String,
    pub top_3: Vec<TopPrediction>,
    pub all_probabilities: RankedProbabilities,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub filename: String,
    pub timestamp: String,
    pub prediction: PredictionBody,
    pub status: PredictionStatus,
    pub message: String,
    pub tta_used: bool,
    pub model_used: String,
}

/// `POST /api/predict`
pub async fn predict(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<PredictResponse>> {
    let UploadForm {
        files,
        use_tta,
        model,
    } = read_form(&mut multipart).await?;

    let file = files
        .into_iter()
        .find(|f| (f.field == "image" || f.field == "file") && !f.file_name.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No valid image was sent".to_string()))?;
    check_extension(&state, &file.file_name)?;

    let stored = upload::store(&state.config.upload.dir, &file.file_name, &file.data).await?;

    let requested = model.unwrap_or_else(|| state.config.models.default_model.clone());
    let k = if use_tta {
        state.config.prediction.tta_augmentations
    } else {
        0
    };
    info!(model = %requested, tta = use_tta, filename = %stored.filename, "Running prediction");

    let start = Instant::now();
    let task_state = state.clone();
    let path = stored.path.clone();
    let (model_used, response) = tokio::task::spawn_blocking(
        move || -> ClassifierResult<(String, PredictionResponse)> {
            let classifier = task_state.registry.get(&requested)?;
            let response = task_state.policy.evaluate(
                &classifier,
                &task_state.aggregator,
                &path,
                k,
                &mut rand::thread_rng(),
            );
            Ok((classifier.name().to_string(), response))
        },
    )
    .await?
    .map_err(|e| ApiError::Internal(format!("Model unavailable: {}", e)))?;

    state.metrics.record_prediction(
        &model_used,
        start.elapsed(),
        response.status,
        response.label.as_deref(),
        response.probability,
        k > 0,
    );

    if response.status == PredictionStatus::Error {
        return Err(ApiError::Internal(response.message));
    }

    let StoredUpload {
        filename,
        timestamp,
        ..
    } = stored;

    Ok(Json(PredictResponse {
        success: true,
        filename,
        timestamp,
        prediction: PredictionBody {
            class: response.label,
            confidence: response.confidence,
            probability: response.probability,
            method: response.method,
            top_3: response.top_3,
            all_probabilities: response.probabilities,
        },
        status: response.status,
        message: response.message,
        tta_used: use_tta,
        model_used,
    }))
}

#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub filename: String,
    #[serde(flatten)]
    pub item: BatchItem,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub model_used: String,
    pub count: usize,
    pub failed: usize,
    pub results: Vec<BatchResult>,
}

/// `POST /api/predict/batch`
pub async fn predict_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<BatchResponse>> {
    let form = read_form(&mut multipart).await?;

    let files: Vec<UploadedFile> = form
        .files
        .into_iter()
        .filter(|f| !f.file_name.is_empty())
        .collect();
    if files.is_empty() {
        return Err(ApiError::BadRequest("No valid image was sent".to_string()));
    }
    for file in &files {
        check_extension(&state, &file.file_name)?;
    }

    let mut stored = Vec::with_capacity(files.len());
    for file in &files {
        stored.push(upload::store(&state.config.upload.dir, &file.file_name, &file.data).await?);
    }

    let requested = form
        .model
        .unwrap_or_else(|| state.config.models.default_model.clone());
    let paths: Vec<PathBuf> = stored.iter().map(|s| s.path.clone()).collect();

    let start = Instant::now();
    let registry = state.registry.clone();
    let (model_used, items) = tokio::task::spawn_blocking(
        move || -> ClassifierResult<(String, Vec<BatchItem>)> {
            let classifier = registry.get(&requested)?;
            Ok((classifier.name().to_string(), classifier.predict_batch(&paths)))
        },
    )
    .await?
    .map_err(|e| ApiError::Internal(format!("Model unavailable: {}", e)))?;

    let per_item = start.elapsed() / items.len().max(1) as u32;
    for item in &items {
        match &item.outcome {
            BatchOutcome::Predicted(p) => state.metrics.record_prediction(
                &model_used,
                per_item,
                state.policy.status_for(p.probability),
                Some(&p.label),
                p.probability,
                false,
            ),
            BatchOutcome::Failed { .. } => state.metrics.record_prediction(
                &model_used,
                per_item,
                PredictionStatus::Error,
                None,
                0.0,
                false,
            ),
        }
    }

    let failed = items.iter().filter(|item| !item.is_ok()).count();
    info!(model = %model_used, count = items.len(), failed = failed, "Batch prediction complete");

    let results = stored
        .into_iter()
        .zip(items)
        .map(|(upload, item)| BatchResult {
            filename: upload.filename,
            item,
        })
        .collect::<Vec<_>>();

    Ok(Json(BatchResponse {
        success: true,
        model_used,
        count: results.len(),
        failed,
        results,
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub model_loaded: bool,
    pub models_available: Vec<String>,
    pub version: &'static str,
}

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: chrono::Local::now().to_rfc3339(),
        model_loaded: !state.registry.loaded_models().is_empty(),
        models_available: state.registry.catalog().map(|m| m.name.clone()).collect(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub name: String,
    pub description: String,
    pub loaded: bool,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ModelInfo>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub success: bool,
    pub models: BTreeMap<String, ModelEntry>,
    pub default: String,
}

/// `GET /api/models`
pub async fn models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let registry = &state.registry;
    let models = registry
        .catalog()
        .map(|config| {
            let cached = registry.cached(&config.name);
            let entry = ModelEntry {
                name: config.name.clone(),
                description: config.description.clone(),
                loaded: cached.is_some(),
                available: registry.is_available(&config.name),
                info: cached.map(|classifier| classifier.info()),
            };
            (config.name.clone(), entry)
        })
        .collect();

    Json(ModelsResponse {
        success: true,
        models,
        default: registry.default_model().to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    pub model_loaded: bool,
    pub default_model: String,
    pub threshold: f64,
    pub tta_augmentations: usize,
    pub endpoints: Vec<&'static str>,
}

/// `GET /api/info`
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: SERVICE_NAME,
        description: SERVICE_DESCRIPTION,
        version: env!("CARGO_PKG_VERSION"),
        model_loaded: !state.registry.loaded_models().is_empty(),
        default_model: state.registry.default_model().to_string(),
        threshold: state.policy.threshold,
        tta_augmentations: state.config.prediction.tta_augmentations,
        endpoints: vec![
            "/api/predict",
            "/api/predict/batch",
            "/api/health",
            "/api/models",
            "/api/info",
            "/api/metrics",
        ],
    })
}

/// `GET /api/metrics`
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
