//! HTTP surface: `POST /query`, `GET /health`, `GET /api/kinds`.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::error;

use crate::application::{
    ErrorResponse, HealthStatusResponse, KindListResponse, QueryRequest, QueryResponse,
    QueryService,
};
use crate::domain::PipelineError;

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Clone)]
struct HttpState {
    service: Arc<QueryService>,
}

pub fn router(service: Arc<QueryService>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/query", post(submit_query))
        .route("/api/kinds", get(list_kinds))
        .with_state(HttpState { service })
}

async fn health_check() -> Json<HealthStatusResponse> {
    Json(HealthStatusResponse::healthy())
}

async fn list_kinds() -> Json<KindListResponse> {
    Json(KindListResponse::catalog())
}

async fn submit_query(
    State(state): State<HttpState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        pipeline_error(&PipelineError::invalid_query(rejection.body_text()))
    })?;

    let service = Arc::clone(&state.service);
    let outcome = tokio::task::spawn_blocking(move || service.answer(&request.query))
        .await
        .map_err(|err| {
            error!(target: "kubequery::http", %err, "query task aborted");
            pipeline_error(&PipelineError::internal("query task aborted"))
        })?
        .map_err(|err| pipeline_error(&err))?;

    Ok(Json(QueryResponse::from(outcome)))
}

fn pipeline_error(err: &PipelineError) -> ApiError {
    (status_for(err), Json(ErrorResponse::from(err)))
}

pub fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        PipelineError::ClusterUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
