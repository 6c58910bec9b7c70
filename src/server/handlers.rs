//! Request handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::data;
use crate::training::registry::TaskType;
use crate::training::trainer::{self, AlgorithmEntry, TrainingJob};

use super::error::{Result, ServerError};
use super::state::AppState;

fn default_test_size() -> f64 {
    0.2
}

fn default_cv_folds() -> usize {
    5
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainRequest {
    pub filename: String,
    pub model_type: String,
    pub algorithms: Vec<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default)]
    pub cv_enabled: bool,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
}

#[derive(Debug, Serialize)]
pub struct AlgorithmResultDto {
    pub algorithm: String,
    pub metrics: Map<String, Value>,
    #[serde(rename = "importancePlot")]
    pub importance_plot: Option<String>,
    pub plots: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<AlgorithmEntry> for AlgorithmResultDto {
    fn from(entry: AlgorithmEntry) -> Self {
        Self {
            algorithm: entry.algorithm,
            metrics: entry.metrics,
            importance_plot: entry.importance_plot,
            plots: entry.plots,
            error: entry.error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub results: Vec<AlgorithmResultDto>,
    pub comparison_plot: Option<String>,
    pub metrics_table: Option<String>,
}

/// POST /api/train-models
pub async fn train_models(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TrainRequest>,
) -> Result<Json<TrainResponse>> {
    let task = TaskType::parse(&req.model_type)
        .ok_or_else(|| ServerError::BadRequest(format!("Unknown model type: {}", req.model_type)))?;
    if req.algorithms.is_empty() {
        return Err(ServerError::BadRequest(
            "No algorithms specified".to_string(),
        ));
    }

    let path = data::resolve_dataset(
        &state.processed_dir(),
        &state.uploads_dir(),
        &req.filename,
    )
    .ok_or_else(|| ServerError::NotFound(format!("Dataset not found: {}", req.filename)))?;

    info!(
        filename = %req.filename,
        model_type = %req.model_type,
        algorithms = ?req.algorithms,
        "training request received"
    );

    let df = data::load_dataset(&path).map_err(ServerError::from)?;
    let job = TrainingJob {
        task,
        algorithms: req.algorithms,
        params: req.params,
        target: req.target,
        test_size: req.test_size,
        cv_enabled: req.cv_enabled,
        cv_folds: req.cv_folds,
    };

    let store = state.store.clone();
    let outcome = tokio::task::spawn_blocking(move || trainer::run_batch(&df, &job, &store))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .map_err(ServerError::from)?;

    Ok(Json(TrainResponse {
        results: outcome.results.into_iter().map(Into::into).collect(),
        comparison_plot: outcome.comparison_plot,
        metrics_table: outcome.metrics_table,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub algo: Option<String>,
    pub model_type: Option<String>,
}

/// GET /api/download-model?algo=..&model_type=..
pub async fn download_model(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse> {
    let algo = query
        .algo
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing algo parameter".to_string()))?;
    let model_type = query
        .model_type
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing model_type parameter".to_string()))?;
    let task = TaskType::parse(&model_type)
        .ok_or_else(|| ServerError::BadRequest(format!("Unknown model type: {model_type}")))?;

    let bytes = state
        .store
        .raw_bytes(&algo, task)
        .ok_or_else(|| ServerError::NotFound(format!("No saved model for {algo} ({model_type})")))?;

    let filename = format!("{}_{}.bin", algo, task.as_str());
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

/// GET /api/health
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
