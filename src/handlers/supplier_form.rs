//! Public supplier form. Suppliers are not users of the system; the
//! onboarding token in the emailed link is their only credential.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common::created;
use crate::{
    errors::ServiceError,
    models::DocumentCategory,
    services::onboarding::{
        SubmissionReceipt, SupplierFormContext, SupplierFormFields, SupplierFormSubmission,
        UploadedFile,
    },
    ApiResponse, ApiResult, AppState,
};

/// One uploaded document, carried inline as base64.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormFile {
    pub category: DocumentCategory,
    pub file_name: String,
    pub content_type: String,
    pub content_base64: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupplierFormRequest {
    pub onboarding_token: Option<String>,
    #[serde(flatten)]
    pub fields: SupplierFormFields,
    #[serde(default)]
    pub files: Vec<FormFile>,
}

impl TryFrom<SupplierFormRequest> for SupplierFormSubmission {
    type Error = ServiceError;

    fn try_from(request: SupplierFormRequest) -> Result<Self, Self::Error> {
        let files = request
            .files
            .into_iter()
            .map(|file| {
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(file.content_base64.trim())
                    .map_err(|e| {
                        ServiceError::BadRequest(format!(
                            "File {} is not valid base64: {}",
                            file.file_name, e
                        ))
                    })?;
                Ok(UploadedFile {
                    category: file.category,
                    file_name: file.file_name,
                    content_type: file.content_type,
                    bytes: Bytes::from(decoded),
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(SupplierFormSubmission {
            onboarding_token: request
                .onboarding_token
                .filter(|token| !token.trim().is_empty()),
            fields: request.fields,
            files,
        })
    }
}

pub fn supplier_form_routes() -> Router<AppState> {
    Router::new()
        .route("/supplier-form/submit", post(submit_supplier_form))
        .route("/supplier-form/:token", get(get_supplier_form))
}

#[utoipa::path(
    get,
    path = "/api/v1/supplier-form/{token}",
    params(("token" = String, Path, description = "Onboarding token from the supplier email")),
    responses(
        (status = 200, description = "Form context and document checklist", body = ApiResponse<SupplierFormContext>),
        (status = 404, description = "Unknown token", body = crate::errors::ErrorResponse)
    ),
    tag = "supplier-form"
)]
pub async fn get_supplier_form(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<SupplierFormContext> {
    let context = state.services.onboarding.form_context(&token).await?;
    Ok(Json(ApiResponse::success(context)))
}

#[utoipa::path(
    post,
    path = "/api/v1/supplier-form/submit",
    request_body = SupplierFormRequest,
    responses(
        (status = 201, description = "Submission stored as a new version", body = ApiResponse<SubmissionReceipt>),
        (status = 400, description = "Invalid fields or non-PDF upload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown token", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already used by another supplier", body = crate::errors::ErrorResponse)
    ),
    tag = "supplier-form"
)]
pub async fn submit_supplier_form(
    State(state): State<AppState>,
    Json(payload): Json<SupplierFormRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let submission = SupplierFormSubmission::try_from(payload)?;
    let receipt = state
        .services
        .onboarding
        .submit_supplier_form(submission)
        .await?;
    Ok(created(receipt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn request(content: &str) -> SupplierFormRequest {
        SupplierFormRequest {
            onboarding_token: Some("  ".to_string()),
            fields: SupplierFormFields::default(),
            files: vec![FormFile {
                category: DocumentCategory::CompanyRegistration,
                file_name: "cipc.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                content_base64: content.to_string(),
            }],
        }
    }

    #[test]
    fn decodes_inline_files_and_drops_blank_token() {
        let submission = SupplierFormSubmission::try_from(request("JVBERi0xLjQ=")).unwrap();
        assert!(submission.onboarding_token.is_none());
        assert_eq!(submission.files.len(), 1);
        assert_eq!(&submission.files[0].bytes[..], b"%PDF-1.4");
        assert!(submission.files[0].is_pdf());
    }

    #[test]
    fn rejects_malformed_base64() {
        let result = SupplierFormSubmission::try_from(request("not base64!"));
        assert_matches!(result, Err(ServiceError::BadRequest(_)));
    }
}
