//! Supplier Onboarding API
//!
//! Supplier initiation, the two-gate approval workflow, the public supplier
//! form with versioned document submissions, and AI-assisted document review.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod migrator;
pub mod models;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{extract::DefaultBodyLimit, extract::State, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{roles, AuthRouterExt, AuthService};
use crate::db::DbPool;
use crate::events::EventSender;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Arc<EventSender>,
    pub services: handlers::AppServices,
}

/// Envelope wrapping every JSON body the API returns.
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    pub meta: ResponseMeta,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    fn envelope(data: Option<T>, message: Option<String>, errors: Option<Vec<String>>) -> Self {
        Self {
            success: data.is_some(),
            data,
            message,
            errors,
            meta: ResponseMeta {
                request_id: crate::tracing::current_request_id().map(|rid| rid.0),
                timestamp: Utc::now(),
            },
        }
    }

    pub fn success(data: T) -> Self {
        Self::envelope(Some(data), None, None)
    }

    pub fn error(message: String) -> Self {
        Self::envelope(None, Some(message), None)
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self::envelope(None, Some("Validation failed".to_string()), Some(errors))
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    // Requester-facing workflow: any signed-in user
    let workflow = Router::new()
        .merge(handlers::initiations::initiation_routes())
        .merge(handlers::delegations::delegation_routes())
        .merge(handlers::suppliers::final_approval_routes())
        .with_auth();

    // Review of submitted suppliers
    let review = Router::new()
        .merge(handlers::suppliers::supplier_routes())
        .merge(handlers::ai_analysis::ai_analysis_routes())
        .with_any_role(roles::REVIEWERS);

    let admin = handlers::reminders::reminder_routes().with_any_role(&[roles::ADMIN]);

    // Public: suppliers hold an onboarding token, not an account
    let supplier_form = handlers::supplier_form::supplier_form_routes();

    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(workflow)
        .merge(review)
        .merge(admin)
        .merge(supplier_form)
}

/// Full application router with the request-scoped layers applied.
pub fn app_router(state: AppState, auth_service: Arc<AuthService>) -> Router {
    let body_limit = state.config.max_body_size;
    Router::<AppState>::new()
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            auth::inject_auth_service,
        ))
        .layer(axum::middleware::from_fn(
            crate::tracing::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "aiBackend": state.config.ai_backend.base_url,
        "emailEnabled": state.config.email.enabled,
        "startedAt": Utc::now(),
    })))
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let database = db::check_connection(&state.db).await;
    if let Err(e) = &database {
        ::tracing::warn!(error = %e, "database probe failed");
    }
    let verdict = if database.is_ok() { "healthy" } else { "unhealthy" };

    Json(ApiResponse::success(json!({
        "status": verdict,
        "database": verdict,
        "checkedAt": Utc::now(),
    })))
}
