//! HTTP surface: route table and app assembly.

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod handlers {
    pub use crate::handlers::*;
}

use crate::handlers::AppState;

/// Scoring endpoints. Callers decide which middleware wraps them.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/recommendations/:state_code",
            get(handlers::get_state_recommendations),
        )
        .route("/api/analysis/:zip_code", get(handlers::get_zip_analysis))
        .route(
            "/api/msi-analysis/:state_code",
            get(handlers::get_msi_analysis),
        )
        .route("/api/model-evaluation", get(handlers::get_model_evaluation))
}

/// Final app: `/health` outside `api`, plus tracing and permissive CORS.
pub fn app(state: Arc<AppState>, api: Router<Arc<AppState>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
