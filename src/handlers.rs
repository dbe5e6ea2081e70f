use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::artifacts::ModelBundle;
use crate::errors::{AppError, ModelError};
use crate::evaluation::{self, EvaluationReport};
use crate::models::{MsiResponse, RecommendationsResponse, ZipLookup, ZipNotFoundResponse};
use crate::services::ScoringService;
use crate::store::MetricStore;

/// Shared state for all handlers. Built once at startup and never mutated.
pub struct AppState {
    /// Source of stored ZIP records.
    pub store: Arc<dyn MetricStore>,
    /// Fitted models and scalers.
    pub bundle: Arc<ModelBundle>,
    /// Directory holding the artifacts and `results/`.
    pub model_dir: PathBuf,
    /// Suggestions returned for unknown ZIPs.
    pub nearby_zip_count: usize,
}

impl AppState {
    fn scoring(&self) -> ScoringService<'_> {
        ScoringService::new(&self.bundle, self.store.as_ref()).with_nearby_count(self.nearby_zip_count)
    }
}

/// GET /health
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "zipscore-api",
            "version": "0.1.0"
        })),
    )
}

/// GET /api/recommendations/:state_code
///
/// Every stored ZIP of the state, best ranking score first.
pub async fn get_state_recommendations(
    State(state): State<Arc<AppState>>,
    Path(state_code): Path<String>,
) -> Result<Json<RecommendationsResponse>, AppError> {
    tracing::info!("GET /recommendations/{}", state_code);

    let recommendations = state.scoring().score_state(&state_code).await?;
    if recommendations.is_empty() {
        return Err(AppError::NotFound(format!(
            "No data available for state {}",
            state_code
        )));
    }

    Ok(Json(RecommendationsResponse { recommendations }))
}

/// GET /api/analysis/:zip_code
pub async fn get_zip_analysis(
    State(state): State<Arc<AppState>>,
    Path(zip_code): Path<String>,
) -> Result<Response, AppError> {
    tracing::info!("GET /analysis/{}", zip_code);

    match state.scoring().score_zip(&zip_code).await? {
        ZipLookup::Found(analysis) => Ok(Json(*analysis).into_response()),
        ZipLookup::NotFound { zip_code, nearby } => {
            let mut error = format!("No data available for ZIP code {}", zip_code);
            if !nearby.is_empty() {
                error.push_str(". However, we found data for these nearby ZIP codes");
            }
            Ok((
                StatusCode::NOT_FOUND,
                Json(ZipNotFoundResponse {
                    error,
                    nearby_zips: nearby,
                }),
            )
                .into_response())
        }
    }
}

/// GET /api/msi-analysis/:state_code
///
/// Mean classifier score per metro area of the state.
pub async fn get_msi_analysis(
    State(state): State<Arc<AppState>>,
    Path(state_code): Path<String>,
) -> Result<Json<MsiResponse>, AppError> {
    tracing::info!("GET /msi-analysis/{}", state_code);

    let msi_data = state.scoring().score_msi(&state_code).await?;
    if msi_data.is_empty() {
        return Err(AppError::NotFound(format!(
            "No data found for state {}",
            state_code
        )));
    }

    Ok(Json(MsiResponse { msi_data }))
}

/// GET /api/model-evaluation
///
/// Serves the report written by `evaluate_models`.
pub async fn get_model_evaluation(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EvaluationReport>, AppError> {
    tracing::info!("GET /model-evaluation");

    let model_dir = state.model_dir.clone();
    let report = tokio::task::spawn_blocking(move || evaluation::load_report(model_dir))
        .await
        .map_err(|e| AppError::InternalError(format!("evaluation task failed: {}", e)))?;

    match report {
        Ok(report) => Ok(Json(report)),
        Err(ModelError::MissingArtifact { .. }) => Err(AppError::NotFound(
            "No evaluation results found".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}
