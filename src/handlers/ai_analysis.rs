use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::accepted;
use crate::{
    entities::ai_analysis_job,
    errors::ServiceError,
    services::ai_analysis::StartOutcome,
    ApiResponse, ApiResult, AppState,
};

const DEFAULT_CANCEL_REASON: &str = "cancelled by reviewer";

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelJobRequest {
    pub reason: Option<String>,
}

pub fn ai_analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/suppliers/:id/ai-analysis", post(start_analysis))
        .route("/suppliers/:id/ai-analysis/latest", get(latest_analysis))
        .route("/ai-analysis/:job_id", get(get_job))
        .route("/ai-analysis/:job_id/cancel", post(cancel_job))
}

#[utoipa::path(
    post,
    path = "/api/v1/suppliers/{id}/ai-analysis",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 202, description = "Job started, or the active job returned", body = ApiResponse<StartOutcome>),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse)
    ),
    tag = "ai-analysis"
)]
pub async fn start_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.services.ai_analysis.start(id).await?;
    Ok(accepted(outcome))
}

#[utoipa::path(
    get,
    path = "/api/v1/suppliers/{id}/ai-analysis/latest",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Most recent job for the supplier", body = ApiResponse<ai_analysis_job::Model>),
        (status = 404, description = "No analysis has been run", body = crate::errors::ErrorResponse)
    ),
    tag = "ai-analysis"
)]
pub async fn latest_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ai_analysis_job::Model> {
    let job = state
        .services
        .ai_analysis
        .latest(id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("No analysis has been run for supplier {}", id))
        })?;
    Ok(Json(ApiResponse::success(job)))
}

#[utoipa::path(
    get,
    path = "/api/v1/ai-analysis/{job_id}",
    params(("job_id" = Uuid, Path, description = "Analysis job ID")),
    responses(
        (status = 200, description = "Job progress and results", body = ApiResponse<ai_analysis_job::Model>),
        (status = 404, description = "Job not found", body = crate::errors::ErrorResponse)
    ),
    tag = "ai-analysis"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<ai_analysis_job::Model> {
    let job = state.services.ai_analysis.get(job_id).await?;
    Ok(Json(ApiResponse::success(job)))
}

#[utoipa::path(
    post,
    path = "/api/v1/ai-analysis/{job_id}/cancel",
    request_body(content = CancelJobRequest, description = "Optional reason", content_type = "application/json"),
    params(("job_id" = Uuid, Path, description = "Analysis job ID")),
    responses(
        (status = 200, description = "Job failed with a cancellation message", body = ApiResponse<ai_analysis_job::Model>),
        (status = 400, description = "Job already finished", body = crate::errors::ErrorResponse),
        (status = 404, description = "Job not found", body = crate::errors::ErrorResponse)
    ),
    tag = "ai-analysis"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    payload: Option<Json<CancelJobRequest>>,
) -> ApiResult<ai_analysis_job::Model> {
    let reason = payload
        .and_then(|Json(body)| body.reason)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());
    let job = state.services.ai_analysis.cancel(job_id, &reason).await?;
    Ok(Json(ApiResponse::success(job)))
}
