use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{Page, PaginationParams};
use crate::{
    auth::AuthUser,
    entities::{enums::SupplierStatus, supplier, supplier_onboarding},
    services::onboarding::{
        RevisionRequest, StatusChangeOutcome, StatusUpdateRequest, SupplierDetail, SupplierFilter,
    },
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SupplierListQuery {
    pub status: Option<SupplierStatus>,
    /// Matched against company name, contact email and supplier code
    pub search: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// Reviewer operations on onboarded suppliers.
pub fn supplier_routes() -> Router<AppState> {
    Router::new()
        .route("/suppliers", get(list_suppliers))
        .route("/suppliers/:id", get(get_supplier))
        .route("/suppliers/:id/request-revision", post(request_revision))
        .route("/suppliers/:id/status", post(update_status))
}

/// Escalation is open to the initiator, who may hold no reviewer role.
pub fn final_approval_routes() -> Router<AppState> {
    Router::new().route(
        "/suppliers/:id/request-final-approval",
        post(request_final_approval),
    )
}

#[utoipa::path(
    get,
    path = "/api/v1/suppliers",
    params(SupplierListQuery),
    responses(
        (status = 200, description = "Suppliers, newest first", body = ApiResponse<Page<supplier::Model>>),
        (status = 403, description = "Reviewer role required", body = crate::errors::ErrorResponse)
    ),
    tag = "suppliers"
)]
pub async fn list_suppliers(
    State(state): State<AppState>,
    Query(query): Query<SupplierListQuery>,
) -> ApiResult<Page<supplier::Model>> {
    let (page, limit) = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve(&state.config);
    let filter = SupplierFilter {
        status: query.status,
        search: query.search,
    };
    let (items, total) = state
        .services
        .onboarding
        .list_suppliers(filter, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(Page::new(items, total, page, limit))))
}

#[utoipa::path(
    get,
    path = "/api/v1/suppliers/{id}",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Supplier with onboarding, timeline and document status", body = ApiResponse<SupplierDetail>),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse)
    ),
    tag = "suppliers"
)]
pub async fn get_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SupplierDetail> {
    let detail = state.services.onboarding.supplier_detail(id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

#[utoipa::path(
    post,
    path = "/api/v1/suppliers/{id}/request-revision",
    request_body = RevisionRequest,
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Revision requested and supplier emailed", body = ApiResponse<supplier_onboarding::Model>),
        (status = 400, description = "Notes missing", body = crate::errors::ErrorResponse),
        (status = 403, description = "Procurement manager or admin required", body = crate::errors::ErrorResponse)
    ),
    tag = "suppliers"
)]
pub async fn request_revision(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RevisionRequest>,
) -> ApiResult<supplier_onboarding::Model> {
    let onboarding = state
        .services
        .onboarding
        .request_revision(&user, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(onboarding)))
}

#[utoipa::path(
    post,
    path = "/api/v1/suppliers/{id}/request-final-approval",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Supplier is awaiting final approval", body = ApiResponse<supplier::Model>),
        (status = 403, description = "Only the initiator may escalate", body = crate::errors::ErrorResponse),
        (status = 400, description = "Supplier is not under review", body = crate::errors::ErrorResponse)
    ),
    tag = "suppliers"
)]
pub async fn request_final_approval(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<supplier::Model> {
    let supplier = state
        .services
        .onboarding
        .request_final_approval(&user, id)
        .await?;
    Ok(Json(ApiResponse::success(supplier)))
}

#[utoipa::path(
    post,
    path = "/api/v1/suppliers/{id}/status",
    request_body = StatusUpdateRequest,
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Status changed", body = ApiResponse<StatusChangeOutcome>),
        (status = 400, description = "Rejection reason missing", body = crate::errors::ErrorResponse),
        (status = 403, description = "Reviewer role required", body = crate::errors::ErrorResponse)
    ),
    tag = "suppliers"
)]
pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusUpdateRequest>,
) -> ApiResult<StatusChangeOutcome> {
    let outcome = state
        .services
        .onboarding
        .update_status(&user, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}
