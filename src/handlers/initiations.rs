use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{created, Page, PaginationParams};
use crate::{
    auth::AuthUser,
    entities::supplier_initiation,
    errors::ServiceError,
    services::initiations::{DecisionRequest, InitiationDetail, InitiationInput, PendingApproval},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateInitiationRequest {
    #[serde(flatten)]
    pub fields: InitiationInput,
    /// Submit for approval immediately instead of saving a draft
    #[serde(default)]
    pub submit: bool,
}

pub fn initiation_routes() -> Router<AppState> {
    Router::new()
        .route("/initiations", get(list_initiations).post(create_initiation))
        .route(
            "/initiations/:id",
            get(get_initiation)
                .put(update_initiation)
                .delete(delete_initiation),
        )
        .route("/initiations/:id/submit", post(submit_initiation))
        .route(
            "/initiations/:id/resend-invitation",
            post(resend_invitation),
        )
        .route("/initiations/:id/manager-decision", post(manager_decision))
        .route(
            "/initiations/:id/procurement-decision",
            post(procurement_decision),
        )
        .route("/initiations/:id/decision", post(decide))
        .route("/approvals/pending", get(pending_approvals))
}

#[utoipa::path(
    post,
    path = "/api/v1/initiations",
    request_body = CreateInitiationRequest,
    responses(
        (status = 201, description = "Initiation saved or submitted", body = ApiResponse<supplier_initiation::Model>),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Supplier or initiation already exists", body = crate::errors::ErrorResponse)
    ),
    tag = "initiations"
)]
pub async fn create_initiation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateInitiationRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let initiation = state
        .services
        .initiations
        .create(&user, payload.fields, payload.submit)
        .await?;
    Ok(created(initiation))
}

#[utoipa::path(
    put,
    path = "/api/v1/initiations/{id}",
    request_body = InitiationInput,
    params(("id" = Uuid, Path, description = "Initiation ID")),
    responses(
        (status = 200, description = "Draft saved", body = ApiResponse<supplier_initiation::Model>),
        (status = 400, description = "Initiation is not editable", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the initiator", body = crate::errors::ErrorResponse)
    ),
    tag = "initiations"
)]
pub async fn update_initiation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<InitiationInput>,
) -> ApiResult<supplier_initiation::Model> {
    let saved = state
        .services
        .initiations
        .save_draft(&user, Some(id), payload)
        .await?;
    Ok(Json(ApiResponse::success(saved)))
}

#[utoipa::path(
    post,
    path = "/api/v1/initiations/{id}/submit",
    params(("id" = Uuid, Path, description = "Initiation ID")),
    responses(
        (status = 200, description = "Initiation submitted for manager approval", body = ApiResponse<supplier_initiation::Model>),
        (status = 400, description = "Validation failed or no manager configured", body = crate::errors::ErrorResponse),
        (status = 409, description = "Duplicate supplier", body = crate::errors::ErrorResponse)
    ),
    tag = "initiations"
)]
pub async fn submit_initiation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<supplier_initiation::Model> {
    let submitted = state.services.initiations.submit(&user, id).await?;
    Ok(Json(ApiResponse::success(submitted)))
}

#[utoipa::path(
    post,
    path = "/api/v1/initiations/{id}/resend-invitation",
    params(("id" = Uuid, Path, description = "Initiation ID")),
    responses(
        (status = 200, description = "Invitation retried; status is SUPPLIER_EMAILED when delivered", body = ApiResponse<supplier_initiation::Model>),
        (status = 400, description = "Invitation already sent or initiation not procurement approved", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not allowed to resend", body = crate::errors::ErrorResponse)
    ),
    tag = "initiations"
)]
pub async fn resend_invitation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<supplier_initiation::Model> {
    let initiation = state.services.initiations.resend_invitation(&user, id).await?;
    Ok(Json(ApiResponse::success(initiation)))
}

#[utoipa::path(
    get,
    path = "/api/v1/initiations",
    params(PaginationParams),
    responses(
        (status = 200, description = "Caller's initiations", body = ApiResponse<Page<supplier_initiation::Model>>)
    ),
    tag = "initiations"
)]
pub async fn list_initiations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PaginationParams>,
) -> ApiResult<Page<supplier_initiation::Model>> {
    let (page, limit) = query.resolve(&state.config);
    let (items, total) = state.services.initiations.list(&user, page, limit).await?;
    Ok(Json(ApiResponse::success(Page::new(items, total, page, limit))))
}

#[utoipa::path(
    get,
    path = "/api/v1/initiations/{id}",
    params(("id" = Uuid, Path, description = "Initiation ID")),
    responses(
        (status = 200, description = "Initiation with its approval gates", body = ApiResponse<InitiationDetail>),
        (status = 403, description = "No access", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "initiations"
)]
pub async fn get_initiation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<InitiationDetail> {
    let detail = state.services.initiations.get(&user, id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/initiations/{id}",
    params(("id" = Uuid, Path, description = "Initiation ID")),
    responses(
        (status = 200, description = "Initiation deleted", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Initiation is protected", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not allowed", body = crate::errors::ErrorResponse)
    ),
    tag = "initiations"
)]
pub async fn delete_initiation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    state.services.initiations.delete(&user, id).await?;
    Ok(Json(ApiResponse::success(json!({ "id": id, "deleted": true }))))
}

#[utoipa::path(
    get,
    path = "/api/v1/approvals/pending",
    responses(
        (status = 200, description = "Gates the caller can decide now", body = ApiResponse<Vec<PendingApproval>>)
    ),
    tag = "initiations"
)]
pub async fn pending_approvals(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<PendingApproval>> {
    let pending = state.services.initiations.pending_approvals(&user).await?;
    Ok(Json(ApiResponse::success(pending)))
}

#[utoipa::path(
    post,
    path = "/api/v1/initiations/{id}/manager-decision",
    request_body = DecisionRequest,
    params(("id" = Uuid, Path, description = "Initiation ID")),
    responses(
        (status = 200, description = "Decision recorded", body = ApiResponse<supplier_initiation::Model>),
        (status = 403, description = "Not authorized for this gate", body = crate::errors::ErrorResponse),
        (status = 409, description = "Gate is no longer pending", body = crate::errors::ErrorResponse)
    ),
    tag = "initiations"
)]
pub async fn manager_decision(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> ApiResult<supplier_initiation::Model> {
    let initiation = state
        .services
        .initiations
        .manager_decision(&user, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(initiation)))
}

#[utoipa::path(
    post,
    path = "/api/v1/initiations/{id}/procurement-decision",
    request_body = DecisionRequest,
    params(("id" = Uuid, Path, description = "Initiation ID")),
    responses(
        (status = 200, description = "Decision recorded", body = ApiResponse<supplier_initiation::Model>),
        (status = 403, description = "Not authorized for this gate", body = crate::errors::ErrorResponse),
        (status = 409, description = "Gate is no longer pending", body = crate::errors::ErrorResponse)
    ),
    tag = "initiations"
)]
pub async fn procurement_decision(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> ApiResult<supplier_initiation::Model> {
    let initiation = state
        .services
        .initiations
        .procurement_decision(&user, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(initiation)))
}

#[utoipa::path(
    post,
    path = "/api/v1/initiations/{id}/decision",
    request_body = DecisionRequest,
    params(("id" = Uuid, Path, description = "Initiation ID")),
    responses(
        (status = 200, description = "Decision recorded on the open gate", body = ApiResponse<supplier_initiation::Model>),
        (status = 409, description = "No gate is pending", body = crate::errors::ErrorResponse)
    ),
    tag = "initiations"
)]
pub async fn decide(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> ApiResult<supplier_initiation::Model> {
    let initiation = state.services.initiations.decide(&user, id, payload).await?;
    Ok(Json(ApiResponse::success(initiation)))
}
