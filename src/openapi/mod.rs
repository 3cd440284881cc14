use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Supplier Onboarding API",
        version = "1.0.0",
        description = r#"
# Supplier Onboarding

Requesters initiate supplier onboarding; a line manager and then procurement
approve the request. Once both gates pass the supplier receives a tokenised
link to the public form, where they submit company details and PDF documents.
Reviewers can request revisions, run AI-assisted document analysis, and
approve or reject the supplier.

## Authentication

Every endpoint except `/supplier-form/*`, `/health` and `/status` requires a
bearer JWT:

```
Authorization: Bearer <your-jwt-token>
```

## Errors

Errors share one body shape and carry the request id from `x-request-id`.
"#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "initiations", description = "Supplier initiation and the approval gates"),
        (name = "delegations", description = "Temporary hand-over of approval authority"),
        (name = "supplier-form", description = "Public supplier form"),
        (name = "suppliers", description = "Review of onboarded suppliers"),
        (name = "ai-analysis", description = "Background document analysis jobs"),
        (name = "reminders", description = "Chasing work left waiting")
    ),
    paths(
        // Initiations
        crate::handlers::initiations::create_initiation,
        crate::handlers::initiations::update_initiation,
        crate::handlers::initiations::submit_initiation,
        crate::handlers::initiations::resend_invitation,
        crate::handlers::initiations::list_initiations,
        crate::handlers::initiations::get_initiation,
        crate::handlers::initiations::delete_initiation,
        crate::handlers::initiations::pending_approvals,
        crate::handlers::initiations::manager_decision,
        crate::handlers::initiations::procurement_decision,
        crate::handlers::initiations::decide,

        // Delegations
        crate::handlers::delegations::create_delegation,
        crate::handlers::delegations::list_delegations,
        crate::handlers::delegations::revoke_delegation,

        // Supplier form
        crate::handlers::supplier_form::get_supplier_form,
        crate::handlers::supplier_form::submit_supplier_form,

        // Suppliers
        crate::handlers::suppliers::list_suppliers,
        crate::handlers::suppliers::get_supplier,
        crate::handlers::suppliers::request_revision,
        crate::handlers::suppliers::request_final_approval,
        crate::handlers::suppliers::update_status,

        // AI analysis
        crate::handlers::ai_analysis::start_analysis,
        crate::handlers::ai_analysis::latest_analysis,
        crate::handlers::ai_analysis::get_job,
        crate::handlers::ai_analysis::cancel_job,

        // Reminders
        crate::handlers::reminders::check_reminders,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::handlers::initiations::CreateInitiationRequest,
            crate::services::initiations::InitiationInput,
            crate::services::initiations::DecisionRequest,
            crate::services::initiations::DecisionAction,
            crate::services::delegations::CreateDelegationRequest,
            crate::handlers::supplier_form::SupplierFormRequest,
            crate::handlers::supplier_form::FormFile,
            crate::services::onboarding::RevisionRequest,
            crate::services::onboarding::StatusUpdateRequest,
            crate::handlers::ai_analysis::CancelJobRequest,
            crate::services::reminders::ReminderSummary,
            crate::models::DocumentCategory,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
