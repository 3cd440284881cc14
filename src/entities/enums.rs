//! String-backed workflow enums shared by the entities and the HTTP layer.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[sea_orm(string_value = "ADMIN")]
    Admin,
    #[sea_orm(string_value = "USER")]
    User,
    #[sea_orm(string_value = "MANAGER")]
    Manager,
    #[sea_orm(string_value = "APPROVER")]
    Approver,
    #[sea_orm(string_value = "PROCUREMENT_MANAGER")]
    ProcurementManager,
    #[sea_orm(string_value = "PROCUREMENT_SPECIALIST")]
    ProcurementSpecialist,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseType {
    #[sea_orm(string_value = "REGULAR")]
    Regular,
    #[sea_orm(string_value = "ONCE_OFF")]
    OnceOff,
    #[sea_orm(string_value = "SHARED_IP")]
    SharedIp,
}

impl PurchaseType {
    pub fn label(&self) -> &'static str {
        match self {
            PurchaseType::Regular => "Regular Purchase",
            PurchaseType::OnceOff => "Once-off Purchase",
            PurchaseType::SharedIp => "Shared IP",
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[strum(serialize_all = "UPPERCASE")]
pub enum PaymentMethod {
    /// Cash on delivery
    #[sea_orm(string_value = "COD")]
    #[serde(rename = "COD")]
    Cod,
    /// Account
    #[sea_orm(string_value = "AC")]
    #[serde(rename = "AC")]
    Ac,
}

/// Business units an initiation can be raised for. Stored as a JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum BusinessUnit {
    #[serde(rename = "SCHAUENBURG_SYSTEMS_200")]
    SchauenburgSystems200,
    #[serde(rename = "SCHAUENBURG_PTY_LTD_300")]
    SchauenburgPtyLtd300,
}

impl BusinessUnit {
    pub fn label(&self) -> &'static str {
        match self {
            BusinessUnit::SchauenburgSystems200 => "Schauenburg Systems 200",
            BusinessUnit::SchauenburgPtyLtd300 => "Schauenburg (Pty) Ltd 300",
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InitiationStatus {
    #[sea_orm(string_value = "DRAFT")]
    Draft,
    #[sea_orm(string_value = "SUBMITTED")]
    Submitted,
    #[sea_orm(string_value = "MANAGER_APPROVED")]
    ManagerApproved,
    #[sea_orm(string_value = "PROCUREMENT_APPROVED")]
    ProcurementApproved,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
    #[sea_orm(string_value = "SUPPLIER_EMAILED")]
    SupplierEmailed,
}

impl InitiationStatus {
    /// Statuses from which the owner may edit and (re)submit.
    pub fn is_editable(&self) -> bool {
        matches!(self, InitiationStatus::Draft | InitiationStatus::Rejected)
    }

    /// Initiations that block a new request for the same supplier.
    pub fn is_active(&self) -> bool {
        !self.is_editable()
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DelegationType {
    #[sea_orm(string_value = "MANAGER_APPROVALS")]
    ManagerApprovals,
    #[sea_orm(string_value = "PROCUREMENT_APPROVALS")]
    ProcurementApprovals,
    #[sea_orm(string_value = "ALL_APPROVALS")]
    AllApprovals,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplierStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "UNDER_REVIEW")]
    UnderReview,
    #[sea_orm(string_value = "AWAITING_FINAL_APPROVAL")]
    AwaitingFinalApproval,
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
    #[sea_orm(string_value = "SUSPENDED")]
    Suspended,
    #[sea_orm(string_value = "INACTIVE")]
    Inactive,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(40))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OnboardingStep {
    #[sea_orm(string_value = "INITIATE")]
    Initiate,
    #[sea_orm(string_value = "PENDING_SUPPLIER_RESPONSE")]
    PendingSupplierResponse,
    #[sea_orm(string_value = "REVIEW")]
    Review,
    #[sea_orm(string_value = "REVISION_REQUESTED")]
    RevisionRequested,
    #[sea_orm(string_value = "AWAITING_FINAL_APPROVAL")]
    AwaitingFinalApproval,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(40))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    #[sea_orm(string_value = "INITIATED")]
    Initiated,
    #[sea_orm(string_value = "EMAIL_SENT")]
    EmailSent,
    #[sea_orm(string_value = "AWAITING_RESPONSE")]
    AwaitingResponse,
    #[sea_orm(string_value = "DOCUMENTS_RECEIVED")]
    DocumentsReceived,
    #[sea_orm(string_value = "UNDER_REVIEW")]
    UnderReview,
    #[sea_orm(string_value = "REVISION_NEEDED")]
    RevisionNeeded,
    #[sea_orm(string_value = "AWAITING_FINAL_APPROVAL")]
    AwaitingFinalApproval,
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
}

impl OverallStatus {
    /// Maps a supplier review status onto the onboarding summary status.
    pub fn for_supplier_status(status: SupplierStatus) -> Self {
        match status {
            SupplierStatus::Approved => OverallStatus::Approved,
            SupplierStatus::Rejected => OverallStatus::Rejected,
            SupplierStatus::AwaitingFinalApproval => OverallStatus::AwaitingFinalApproval,
            SupplierStatus::Pending
            | SupplierStatus::UnderReview
            | SupplierStatus::Suspended
            | SupplierStatus::Inactive => OverallStatus::UnderReview,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "IN_PROGRESS")]
    InProgress,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::InProgress)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AiMode {
    #[sea_orm(string_value = "ollama")]
    Ollama,
    #[sea_orm(string_value = "simplified")]
    Simplified,
    #[sea_orm(string_value = "unknown")]
    Unknown,
}

impl AiMode {
    pub fn from_reported(mode: Option<&str>) -> Self {
        match mode {
            Some("ollama") => AiMode::Ollama,
            Some("simplified") => AiMode::Simplified,
            _ => AiMode::Unknown,
        }
    }
}

/// Kind of overdue item a reminder sweep chases.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(40))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderType {
    #[sea_orm(string_value = "MANAGER_APPROVAL_PENDING")]
    ManagerApprovalPending,
    #[sea_orm(string_value = "PROCUREMENT_APPROVAL_PENDING")]
    ProcurementApprovalPending,
    #[sea_orm(string_value = "SUPPLIER_DOCUMENT_SUBMISSION")]
    SupplierDocumentSubmission,
    #[sea_orm(string_value = "SUPPLIER_REVISION_PENDING")]
    SupplierRevisionPending,
    #[sea_orm(string_value = "PM_REVIEW_PENDING")]
    PmReviewPending,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderStatus {
    #[sea_orm(string_value = "SENT")]
    Sent,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}
