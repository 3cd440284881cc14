use axum::{extract::State, response::Json, routing::post, Router};
use chrono::Utc;

use crate::{services::reminders::ReminderSummary, ApiResponse, ApiResult, AppState};

pub fn reminder_routes() -> Router<AppState> {
    Router::new().route("/reminders/check", post(check_reminders))
}

/// Runs the reminder sweep now, outside the background interval.
#[utoipa::path(
    post,
    path = "/api/v1/reminders/check",
    responses(
        (status = 200, description = "Reminders sent, per kind", body = ApiResponse<ReminderSummary>),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse)
    ),
    tag = "reminders"
)]
pub async fn check_reminders(State(state): State<AppState>) -> ApiResult<ReminderSummary> {
    let summary = state.services.reminders.check(Utc::now()).await?;
    Ok(Json(ApiResponse::success(summary)))
}
