use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    routing::{delete, get},
    Extension, Router,
};
use uuid::Uuid;

use super::common::created;
use crate::{
    auth::AuthUser,
    entities::user_delegation,
    errors::ServiceError,
    services::delegations::{CreateDelegationRequest, DelegationOverview},
    ApiResponse, ApiResult, AppState,
};

pub fn delegation_routes() -> Router<AppState> {
    Router::new()
        .route("/delegations", get(list_delegations).post(create_delegation))
        .route("/delegations/:id", delete(revoke_delegation))
}

#[utoipa::path(
    post,
    path = "/api/v1/delegations",
    request_body = CreateDelegationRequest,
    responses(
        (status = 201, description = "Delegation created", body = ApiResponse<user_delegation::Model>),
        (status = 400, description = "Invalid window or delegate", body = crate::errors::ErrorResponse),
        (status = 404, description = "Delegate not found", body = crate::errors::ErrorResponse)
    ),
    tag = "delegations"
)]
pub async fn create_delegation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateDelegationRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let delegation = state.services.delegations.create(&user, payload).await?;
    Ok(created(delegation))
}

#[utoipa::path(
    get,
    path = "/api/v1/delegations",
    responses(
        (status = 200, description = "Delegations granted by and to the caller", body = ApiResponse<DelegationOverview>)
    ),
    tag = "delegations"
)]
pub async fn list_delegations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<DelegationOverview> {
    let overview = state.services.delegations.list(&user).await?;
    Ok(Json(ApiResponse::success(overview)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/delegations/{id}",
    params(("id" = Uuid, Path, description = "Delegation ID")),
    responses(
        (status = 200, description = "Delegation revoked", body = ApiResponse<user_delegation::Model>),
        (status = 403, description = "Not the delegator", body = crate::errors::ErrorResponse),
        (status = 404, description = "Delegation not found", body = crate::errors::ErrorResponse)
    ),
    tag = "delegations"
)]
pub async fn revoke_delegation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<user_delegation::Model> {
    let revoked = state.services.delegations.revoke(&user, id).await?;
    Ok(Json(ApiResponse::success(revoked)))
}
