/*!
 * # Supplier Onboarding
 *
 * The supplier-facing half of the workflow: the public form resolved by
 * onboarding token, versioned document submissions, and the reviewer
 * operations that send a supplier back for revision, escalate it for final
 * approval, or decide its status.
 *
 * Every submission appends exactly one entry to `airtable_data`; earlier
 * versions are never rewritten. Files are written before the database
 * transaction and removed again if anything after the first write fails.
 */

use bytes::Bytes;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use slog::{info, warn, Logger};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{roles, AuthUser};
use crate::config::EmailConfig;
use crate::db::{map_unique_violation, DbPool};
use crate::entities::enums::{
    ApprovalStatus, OnboardingStep, OverallStatus, PurchaseType, SupplierStatus, UserRole,
};
use crate::entities::supplier_onboarding::DocumentsToRevise;
use crate::entities::{
    onboarding_timeline, supplier, supplier_initiation, supplier_onboarding, user,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{AirtableData, DocumentCategory, SupplierProfile, VersionEntry};
use crate::notifications::{templates, Notifier};
use crate::services::document_requirements::{
    mandatory_documents, missing_mandatory, optional_documents, required_documents,
};
use crate::services::document_store::{
    document_key, package_key, sanitize_file_name, DocumentStore,
};
use crate::services::duplicate_guard;
use crate::services::package::{PackageGenerator, PackageSnapshot};

const DUPLICATE_EMAIL: &str = "A supplier with this email address already exists";

/// `SUP-{millis}-{6 uppercase alphanumerics}`
pub fn generate_supplier_code() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("SUP-{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Appends an audit entry for an onboarding.
pub async fn record_timeline<C: ConnectionTrait>(
    db: &C,
    onboarding_id: Uuid,
    step: OnboardingStep,
    status: impl ToString,
    action: &str,
    description: String,
    performed_by: Option<Uuid>,
) -> Result<onboarding_timeline::Model, ServiceError> {
    Ok(onboarding_timeline::ActiveModel {
        onboarding_id: Set(onboarding_id),
        step: Set(step),
        status: Set(status.to_string()),
        action: Set(action.to_string()),
        description: Set(description),
        performed_by: Set(performed_by),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

/// Active procurement managers, or the active admins when there are none.
pub async fn procurement_recipients<C: ConnectionTrait>(
    db: &C,
) -> Result<Vec<user::Model>, ServiceError> {
    let managers = user::Entity::find()
        .filter(user::Column::Role.eq(UserRole::ProcurementManager))
        .filter(user::Column::IsActive.eq(true))
        .all(db)
        .await?;
    if !managers.is_empty() {
        return Ok(managers);
    }
    Ok(user::Entity::find()
        .filter(user::Column::Role.eq(UserRole::Admin))
        .filter(user::Column::IsActive.eq(true))
        .all(db)
        .await?)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A file as received from the form, before storage.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub category: DocumentCategory,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    /// PDF by extension and by declared MIME type.
    pub fn is_pdf(&self) -> bool {
        let extension_ok = self.file_name.to_ascii_lowercase().ends_with(".pdf");
        let mime_ok = self
            .content_type
            .split(';')
            .next()
            .map(|m| m.trim().eq_ignore_ascii_case("application/pdf"))
            .unwrap_or(false);
        extension_ok && mime_ok
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct SupplierFormFields {
    #[validate(length(max = 255))]
    pub company_name: String,
    pub contact_email: String,
    #[validate(length(max = 255))]
    pub contact_person: String,
    pub contact_phone: Option<String>,
    pub registration_number: Option<String>,
    pub vat_number: Option<String>,
    pub profile: SupplierProfile,
}

#[derive(Debug, Clone, Default)]
pub struct SupplierFormSubmission {
    pub onboarding_token: Option<String>,
    pub fields: SupplierFormFields,
    pub files: Vec<UploadedFile>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub supplier_id: Uuid,
    pub supplier_code: String,
    pub version: u32,
    pub files_stored: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub category: DocumentCategory,
    pub label: &'static str,
}

impl From<DocumentCategory> for ChecklistItem {
    fn from(category: DocumentCategory) -> Self {
        Self {
            category,
            label: category.label(),
        }
    }
}

/// What the public form needs to render for a token.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupplierFormContext {
    pub supplier_name: String,
    pub contact_person: String,
    pub contact_email: String,
    pub purchase_type: Option<PurchaseType>,
    pub credit_application: bool,
    pub revision_requested: bool,
    pub revision_notes: Option<String>,
    pub documents_to_revise: Vec<DocumentCategory>,
    pub required_documents: Vec<ChecklistItem>,
    pub optional_documents: Vec<ChecklistItem>,
    pub submitted_versions: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RevisionRequest {
    #[validate(length(max = 5000))]
    pub revision_notes: String,
    #[serde(default)]
    pub documents_to_revise: Vec<DocumentCategory>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub status: SupplierStatus,
    #[validate(length(max = 2000))]
    pub rejection_reason: Option<String>,
    #[validate(length(max = 255))]
    pub credit_controller: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeOutcome {
    pub supplier: supplier::Model,
    pub package_key: Option<String>,
    pub supplier_notified: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupplierDetail {
    pub supplier: supplier::Model,
    pub onboarding: Option<supplier_onboarding::Model>,
    pub initiation: Option<supplier_initiation::Model>,
    pub timeline: Vec<onboarding_timeline::Model>,
    pub mandatory_documents: Vec<DocumentCategory>,
    pub missing_documents: Vec<DocumentCategory>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupplierFilter {
    pub status: Option<SupplierStatus>,
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct OnboardingService {
    db: Arc<DbPool>,
    store: Arc<dyn DocumentStore>,
    packages: Arc<dyn PackageGenerator>,
    notifier: Notifier,
    email: EmailConfig,
    event_sender: Arc<EventSender>,
    logger: Logger,
}

impl OnboardingService {
    pub fn new(
        db: Arc<DbPool>,
        store: Arc<dyn DocumentStore>,
        packages: Arc<dyn PackageGenerator>,
        notifier: Notifier,
        email: EmailConfig,
        event_sender: Arc<EventSender>,
        logger: Logger,
    ) -> Self {
        Self {
            db,
            store,
            packages,
            notifier,
            email,
            event_sender,
            logger,
        }
    }

    async fn find_supplier(&self, supplier_id: Uuid) -> Result<supplier::Model, ServiceError> {
        supplier::Entity::find_by_id(supplier_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Supplier not found".to_string()))
    }

    async fn find_onboarding(
        &self,
        supplier_id: Uuid,
    ) -> Result<Option<(supplier_onboarding::Model, Option<supplier_initiation::Model>)>, ServiceError>
    {
        Ok(supplier_onboarding::Entity::find()
            .filter(supplier_onboarding::Column::SupplierId.eq(supplier_id))
            .find_also_related(supplier_initiation::Entity)
            .one(&*self.db)
            .await?)
    }

    /// Resolves the public form for an onboarding token.
    #[instrument(skip(self, token))]
    pub async fn form_context(&self, token: &str) -> Result<SupplierFormContext, ServiceError> {
        let db = &*self.db;
        let onboarding = supplier_onboarding::Entity::find()
            .filter(supplier_onboarding::Column::OnboardingToken.eq(token))
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("Invalid or expired onboarding link".to_string())
            })?;
        let supplier = self.find_supplier(onboarding.supplier_id).await?;
        let initiation = match onboarding.initiation_id {
            Some(id) => supplier_initiation::Entity::find_by_id(id).one(db).await?,
            None => None,
        };

        let (purchase_type, credit_application) = match &initiation {
            Some(i) => (Some(i.purchase_type), i.credit_application),
            None => (None, false),
        };
        let checklist_type = purchase_type.unwrap_or(PurchaseType::Regular);

        Ok(SupplierFormContext {
            supplier_name: initiation
                .as_ref()
                .map(|i| i.supplier_name.clone())
                .unwrap_or_else(|| supplier.company_name.clone()),
            contact_person: supplier.contact_person.clone(),
            contact_email: supplier.contact_email.clone(),
            purchase_type,
            credit_application,
            revision_requested: onboarding.revision_requested,
            revision_notes: onboarding.revision_notes.clone(),
            documents_to_revise: onboarding.documents_to_revise.0.clone(),
            required_documents: required_documents(checklist_type, credit_application)
                .into_iter()
                .map(ChecklistItem::from)
                .collect(),
            optional_documents: optional_documents(checklist_type, credit_application)
                .into_iter()
                .map(ChecklistItem::from)
                .collect(),
            submitted_versions: supplier.airtable_data.all_versions().len(),
        })
    }

    /// Records a supplier form submission as a new document version.
    #[instrument(skip(self, submission), fields(files = submission.files.len()))]
    pub async fn submit_supplier_form(
        &self,
        submission: SupplierFormSubmission,
    ) -> Result<SubmissionReceipt, ServiceError> {
        let SupplierFormSubmission {
            onboarding_token,
            fields,
            files,
        } = submission;

        let mut problems = Vec::new();
        if fields.company_name.trim().is_empty() {
            problems.push("Name of business is required".to_string());
        }
        if fields.contact_email.trim().is_empty() {
            problems.push("Email address is required".to_string());
        } else if !validator::validate_email(fields.contact_email.trim()) {
            problems.push("Email address is invalid".to_string());
        }
        if !problems.is_empty() {
            return Err(ServiceError::ValidationFailed(problems));
        }
        fields.validate()?;

        let rejected: Vec<&str> = files
            .iter()
            .filter(|f| !f.is_pdf())
            .map(|f| f.file_name.as_str())
            .collect();
        if !rejected.is_empty() {
            return Err(ServiceError::BadRequest(format!(
                "Only PDF files are accepted. Rejected: {}",
                rejected.join(", ")
            )));
        }

        let db = &*self.db;
        let existing = match onboarding_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            Some(token) => {
                let (onboarding, supplier) = supplier_onboarding::Entity::find()
                    .filter(supplier_onboarding::Column::OnboardingToken.eq(token))
                    .find_also_related(supplier::Entity)
                    .one(db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound("Invalid or expired onboarding link".to_string())
                    })?;
                let supplier = supplier.ok_or_else(|| {
                    ServiceError::InternalError("Onboarding record has no supplier".to_string())
                })?;
                Some((onboarding, supplier))
            }
            None => {
                duplicate_guard::check_supplier_email(db, &fields.contact_email).await?;
                None
            }
        };

        let version = existing
            .as_ref()
            .map(|(onboarding, _)| onboarding.next_submission_version())
            .unwrap_or(1);
        let supplier_code = existing
            .as_ref()
            .map(|(_, supplier)| supplier.supplier_code.clone())
            .unwrap_or_else(generate_supplier_code);

        let (uploaded_files, written) = self.store_files(&supplier_code, version, files).await?;
        let entry = VersionEntry {
            version,
            uploaded_files,
            date: Utc::now(),
        };
        let files_stored = entry.file_count();

        let supplier = match self
            .persist_submission(existing, fields, supplier_code, entry)
            .await
        {
            Ok(supplier) => supplier,
            Err(e) => {
                self.discard(&written).await;
                return Err(e);
            }
        };

        info!(self.logger, "supplier form submitted";
            "supplier_id" => %supplier.id,
            "supplier_code" => &supplier.supplier_code,
            "version" => version,
            "files" => files_stored);

        match procurement_recipients(db).await {
            Ok(recipients) => {
                let url = self.email.review_link(supplier.id);
                let messages = recipients
                    .iter()
                    .map(|u| templates::submission_received(&u.email, &supplier, version, &url))
                    .collect();
                self.notifier.notify_all(messages).await;
            }
            Err(e) => {
                warn!(self.logger, "could not load submission recipients"; "error" => %e);
            }
        }
        self.event_sender
            .send_or_log(Event::SupplierFormSubmitted {
                supplier_id: supplier.id,
                version,
            })
            .await;

        Ok(SubmissionReceipt {
            supplier_id: supplier.id,
            supplier_code: supplier.supplier_code,
            version,
            files_stored,
        })
    }

    async fn store_files(
        &self,
        supplier_code: &str,
        version: u32,
        files: Vec<UploadedFile>,
    ) -> Result<(BTreeMap<DocumentCategory, Vec<String>>, Vec<String>), ServiceError> {
        let stamp = Utc::now().timestamp_millis();
        let mut uploaded: BTreeMap<DocumentCategory, Vec<String>> = BTreeMap::new();
        let mut written = Vec::new();

        for file in files {
            let names = uploaded.entry(file.category).or_default();
            let base = sanitize_file_name(&file.file_name);
            let mut stored_name = format!("{}-{}", stamp, base);
            let mut n = 1;
            while names.contains(&stored_name) {
                stored_name = format!("{}-{}-{}", stamp, n, base);
                n += 1;
            }

            let key = document_key(supplier_code, version, file.category, &stored_name);
            if let Err(e) = self.store.write(&key, file.bytes).await {
                self.discard(&written).await;
                return Err(e.into());
            }
            written.push(key);
            names.push(stored_name);
        }
        Ok((uploaded, written))
    }

    async fn discard(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.store.delete(key).await {
                warn!(self.logger, "could not remove orphaned document"; "key" => key, "error" => %e);
            }
        }
    }

    async fn persist_submission(
        &self,
        existing: Option<(supplier_onboarding::Model, supplier::Model)>,
        fields: SupplierFormFields,
        supplier_code: String,
        entry: VersionEntry,
    ) -> Result<supplier::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let version = entry.version;
        let categories = entry.uploaded_files.len();
        let total_files = entry.file_count();

        let (supplier, onboarding) = match existing {
            Some((onboarding, supplier)) => {
                // Re-read under lock: the copies loaded before the files were
                // stored may be stale by now.
                let supplier = supplier::Entity::find_by_id(supplier.id)
                    .lock_exclusive()
                    .one(&txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Supplier not found".to_string()))?;
                let onboarding = supplier_onboarding::Entity::find_by_id(onboarding.id)
                    .lock_exclusive()
                    .one(&txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound("Onboarding record not found".to_string())
                    })?;
                if onboarding.next_submission_version() != version {
                    return Err(ServiceError::ConcurrentModification(onboarding.id));
                }

                let mut data = supplier.airtable_data.clone();
                data.append(entry);
                let mut active: supplier::ActiveModel = supplier.into();
                apply_form_fields(&mut active, fields);
                active.airtable_data = Set(data);
                active.status = Set(SupplierStatus::UnderReview);
                let supplier = active
                    .update(&txn)
                    .await
                    .map_err(|e| map_unique_violation(e, DUPLICATE_EMAIL))?;

                let mut active: supplier_onboarding::ActiveModel = onboarding.into();
                active.supplier_form_submitted = Set(true);
                active.supplier_form_submitted_at = Set(Some(now));
                active.revision_requested = Set(false);
                active.revision_notes = Set(None);
                active.documents_to_revise = Set(DocumentsToRevise::default());
                active.approval_status = Set(ApprovalStatus::Pending);
                active.current_step = Set(OnboardingStep::Review);
                active.overall_status = Set(OverallStatus::DocumentsReceived);
                (supplier, active.update(&txn).await?)
            }
            None => {
                let mut data = AirtableData::default();
                data.append(entry);
                let mut active = supplier::ActiveModel {
                    supplier_code: Set(supplier_code),
                    contact_person: Set(String::new()),
                    status: Set(SupplierStatus::UnderReview),
                    airtable_data: Set(data),
                    created_by_id: Set(None),
                    approved_at: Set(None),
                    approved_by_id: Set(None),
                    rejection_reason: Set(None),
                    credit_controller: Set(None),
                    ..Default::default()
                };
                apply_form_fields(&mut active, fields);
                let supplier = active
                    .insert(&txn)
                    .await
                    .map_err(|e| map_unique_violation(e, DUPLICATE_EMAIL))?;

                let onboarding = supplier_onboarding::ActiveModel {
                    supplier_id: Set(supplier.id),
                    initiation_id: Set(None),
                    onboarding_token: Set(format!(
                        "form_{}_{}",
                        supplier.id.simple(),
                        now.timestamp_millis()
                    )),
                    current_step: Set(OnboardingStep::Review),
                    overall_status: Set(OverallStatus::DocumentsReceived),
                    approval_status: Set(ApprovalStatus::Pending),
                    revision_count: Set(0),
                    revision_requested: Set(false),
                    revision_notes: Set(None),
                    revision_requested_at: Set(None),
                    documents_to_revise: Set(DocumentsToRevise::default()),
                    supplier_form_submitted: Set(true),
                    supplier_form_submitted_at: Set(Some(now)),
                    email_sent: Set(false),
                    email_sent_at: Set(None),
                    completed_at: Set(None),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
                (supplier, onboarding)
            }
        };

        record_timeline(
            &txn,
            onboarding.id,
            OnboardingStep::PendingSupplierResponse,
            OverallStatus::DocumentsReceived,
            "Supplier form submitted",
            format!(
                "{} submitted version {} with {} document categories ({} files)",
                supplier.company_name, version, categories, total_files
            ),
            None,
        )
        .await?;

        txn.commit().await?;
        Ok(supplier)
    }

    /// Sends a supplier back to fix their submission.
    #[instrument(skip(self, actor, request), fields(actor_id = %actor.user_id))]
    pub async fn request_revision(
        &self,
        actor: &AuthUser,
        supplier_id: Uuid,
        request: RevisionRequest,
    ) -> Result<supplier_onboarding::Model, ServiceError> {
        if !actor.has_any_role(&[roles::ADMIN, roles::PROCUREMENT_MANAGER]) {
            return Err(ServiceError::Forbidden(
                "Only administrators and procurement managers can request revisions".to_string(),
            ));
        }
        request.validate()?;
        let notes = request.revision_notes.trim().to_string();
        if notes.is_empty() {
            return Err(ServiceError::ValidationFailed(vec![
                "Revision notes are required".to_string(),
            ]));
        }

        let supplier = self.find_supplier(supplier_id).await?;
        let (onboarding, initiation) = self.find_onboarding(supplier_id).await?.ok_or_else(|| {
            ServiceError::NotFound("Supplier has no onboarding record".to_string())
        })?;

        let now = Utc::now();
        let documents = request.documents_to_revise;
        let txn = self.db.begin().await?;
        supplier_onboarding::Entity::update_many()
            .col_expr(
                supplier_onboarding::Column::RevisionCount,
                Expr::col(supplier_onboarding::Column::RevisionCount).add(1),
            )
            .set(supplier_onboarding::ActiveModel {
                revision_requested: Set(true),
                revision_notes: Set(Some(notes.clone())),
                revision_requested_at: Set(Some(now)),
                documents_to_revise: Set(DocumentsToRevise(documents.clone())),
                current_step: Set(OnboardingStep::PendingSupplierResponse),
                overall_status: Set(OverallStatus::RevisionNeeded),
                updated_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(supplier_onboarding::Column::Id.eq(onboarding.id))
            .exec(&txn)
            .await?;

        let requested_by = if actor.has_role(roles::PROCUREMENT_MANAGER) {
            "Procurement Manager".to_string()
        } else {
            actor.name.clone().unwrap_or_else(|| "Admin".to_string())
        };
        record_timeline(
            &txn,
            onboarding.id,
            OnboardingStep::Review,
            OverallStatus::RevisionNeeded,
            "Revision requested",
            format!("Revision requested by {}: {}", requested_by, notes),
            Some(actor.user_id),
        )
        .await?;
        let updated = supplier_onboarding::Entity::find_by_id(onboarding.id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Onboarding record not found".to_string()))?;
        txn.commit().await?;

        info!(self.logger, "revision requested";
            "supplier_id" => %supplier_id,
            "revision_count" => updated.revision_count,
            "documents" => documents.len());

        let link = self.email.onboarding_link(&updated.onboarding_token);
        let mut messages = vec![templates::revision_requested_supplier(
            &supplier, &notes, &documents, &link,
        )];
        if let Some(initiation) = initiation {
            if let Some(initiator) = user::Entity::find_by_id(initiation.initiated_by_id)
                .one(&*self.db)
                .await?
            {
                messages.push(templates::revision_requested_initiator(
                    &initiator.email,
                    &supplier,
                    &notes,
                ));
            }
        }
        self.notifier.notify_all(messages).await;
        self.event_sender
            .send_or_log(Event::RevisionRequested {
                supplier_id,
                revision_count: updated.revision_count,
            })
            .await;
        Ok(updated)
    }

    /// The initiator escalates a reviewed supplier to procurement for sign-off.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn request_final_approval(
        &self,
        actor: &AuthUser,
        supplier_id: Uuid,
    ) -> Result<supplier::Model, ServiceError> {
        let supplier = self.find_supplier(supplier_id).await?;
        let (onboarding, initiation) = self.find_onboarding(supplier_id).await?.ok_or_else(|| {
            ServiceError::NotFound("Supplier has no onboarding record".to_string())
        })?;
        if initiation.map(|i| i.initiated_by_id) != Some(actor.user_id) {
            return Err(ServiceError::Forbidden(
                "Only the initiator can request final approval".to_string(),
            ));
        }
        if !onboarding.supplier_form_submitted {
            return Err(ServiceError::InvalidOperation(
                "The supplier has not submitted their form yet".to_string(),
            ));
        }
        if supplier.status != SupplierStatus::UnderReview {
            return Err(ServiceError::InvalidStatus(format!(
                "Final approval can only be requested while the supplier is under review (current: {})",
                supplier.status
            )));
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let result = supplier::Entity::update_many()
            .set(supplier::ActiveModel {
                status: Set(SupplierStatus::AwaitingFinalApproval),
                updated_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(supplier::Column::Id.eq(supplier_id))
            .filter(supplier::Column::Status.eq(SupplierStatus::UnderReview))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(supplier_id));
        }

        let mut active: supplier_onboarding::ActiveModel = onboarding.into();
        active.current_step = Set(OnboardingStep::AwaitingFinalApproval);
        active.overall_status = Set(OverallStatus::AwaitingFinalApproval);
        active.revision_requested = Set(false);
        active.revision_notes = Set(None);
        let onboarding = active.update(&txn).await?;

        let requested_by = actor.name.clone().unwrap_or_else(|| "Initiator".to_string());
        record_timeline(
            &txn,
            onboarding.id,
            OnboardingStep::Review,
            OverallStatus::AwaitingFinalApproval,
            "Final approval requested",
            format!("Final approval requested by {}", requested_by),
            Some(actor.user_id),
        )
        .await?;
        let supplier = supplier::Entity::find_by_id(supplier_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Supplier not found".to_string()))?;
        txn.commit().await?;

        info!(self.logger, "final approval requested";
            "supplier_id" => %supplier_id, "requested_by" => %actor.user_id);

        match procurement_recipients(&*self.db).await {
            Ok(recipients) => {
                let url = self.email.review_link(supplier.id);
                let messages = recipients
                    .iter()
                    .map(|u| {
                        templates::final_approval_requested(&u.email, &supplier, &requested_by, &url)
                    })
                    .collect();
                self.notifier.notify_all(messages).await;
            }
            Err(e) => {
                warn!(self.logger, "could not load final approval recipients"; "error" => %e);
            }
        }
        self.event_sender
            .send_or_log(Event::FinalApprovalRequested(supplier_id))
            .await;
        Ok(supplier)
    }

    /// Reviewer decision on a supplier's status.
    #[instrument(skip(self, actor, request), fields(actor_id = %actor.user_id, status = %request.status))]
    pub async fn update_status(
        &self,
        actor: &AuthUser,
        supplier_id: Uuid,
        request: StatusUpdateRequest,
    ) -> Result<StatusChangeOutcome, ServiceError> {
        if !actor.is_reviewer() {
            return Err(ServiceError::Forbidden(
                "You are not allowed to change supplier status".to_string(),
            ));
        }
        request.validate()?;
        let new_status = request.status;
        let approving = new_status == SupplierStatus::Approved;
        if approving && !actor.has_any_role(&[roles::ADMIN, roles::PROCUREMENT_MANAGER]) {
            return Err(ServiceError::Forbidden(
                "Only administrators and procurement managers can approve suppliers".to_string(),
            ));
        }
        let rejection_reason = non_blank(request.rejection_reason);
        if new_status == SupplierStatus::Rejected && rejection_reason.is_none() {
            return Err(ServiceError::ValidationFailed(vec![
                "A rejection reason is required".to_string(),
            ]));
        }

        let supplier = self.find_supplier(supplier_id).await?;
        let onboarding = self.find_onboarding(supplier_id).await?;
        let old_status = supplier.status;
        if old_status == new_status {
            return Err(ServiceError::InvalidStatus(format!(
                "Supplier is already {}",
                new_status
            )));
        }
        if approving
            && !onboarding
                .as_ref()
                .map(|(o, _)| o.supplier_form_submitted)
                .unwrap_or(false)
        {
            return Err(ServiceError::InvalidOperation(
                "Cannot approve a supplier that has not submitted their form".to_string(),
            ));
        }

        let now = Utc::now();
        let mut changes = supplier::ActiveModel {
            status: Set(new_status),
            updated_at: Set(Some(now)),
            ..Default::default()
        };
        match new_status {
            SupplierStatus::Approved => {
                changes.approved_at = Set(Some(now));
                changes.approved_by_id = Set(Some(actor.user_id));
                changes.rejection_reason = Set(None);
                if let Some(controller) = non_blank(request.credit_controller) {
                    changes.credit_controller = Set(Some(controller));
                }
            }
            SupplierStatus::Rejected => {
                changes.rejection_reason = Set(rejection_reason.clone());
            }
            _ => {}
        }

        let txn = self.db.begin().await?;
        let result = supplier::Entity::update_many()
            .set(changes)
            .filter(supplier::Column::Id.eq(supplier_id))
            .filter(supplier::Column::Status.eq(old_status))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(supplier_id));
        }

        if let Some((onboarding, _)) = &onboarding {
            let mut active: supplier_onboarding::ActiveModel = onboarding.clone().into();
            active.overall_status = Set(OverallStatus::for_supplier_status(new_status));
            match new_status {
                SupplierStatus::Approved => {
                    active.current_step = Set(OnboardingStep::Completed);
                    active.approval_status = Set(ApprovalStatus::Approved);
                    active.completed_at = Set(Some(now));
                }
                SupplierStatus::Rejected => {
                    active.approval_status = Set(ApprovalStatus::Rejected);
                }
                _ => {}
            }
            let onboarding = active.update(&txn).await?;

            let mut description = format!("Supplier status changed from {} to {}", old_status, new_status);
            if let Some(reason) = &rejection_reason {
                description.push_str(&format!(". Reason: {}", reason));
            }
            record_timeline(
                &txn,
                onboarding.id,
                onboarding.current_step,
                new_status,
                "Status updated",
                description,
                Some(actor.user_id),
            )
            .await?;
        }

        let supplier = supplier::Entity::find_by_id(supplier_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Supplier not found".to_string()))?;
        txn.commit().await?;

        info!(self.logger, "supplier status changed";
            "supplier_id" => %supplier_id,
            "from" => %old_status,
            "to" => %new_status,
            "by" => %actor.user_id);

        let (package_key, supplier_notified) = if approving {
            let initiation = onboarding.and_then(|(_, initiation)| initiation);
            let package_key = self.store_package(&supplier, initiation).await;
            let notified = self
                .notifier
                .notify(templates::supplier_approved(&supplier, package_key.as_deref()))
                .await;
            (package_key, notified)
        } else {
            (None, false)
        };

        self.event_sender
            .send_or_log(Event::SupplierStatusChanged {
                supplier_id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;

        Ok(StatusChangeOutcome {
            supplier,
            package_key,
            supplier_notified,
        })
    }

    /// Renders and stores the approval package. Failures are logged only.
    async fn store_package(
        &self,
        supplier: &supplier::Model,
        initiation: Option<supplier_initiation::Model>,
    ) -> Option<String> {
        let snapshot = PackageSnapshot {
            documents: PackageSnapshot::latest_documents(supplier),
            supplier: supplier.clone(),
            initiation,
            credit_controller: supplier.credit_controller.clone(),
            generated_at: Utc::now(),
        };
        let rendered = match self.packages.render(&snapshot) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(self.logger, "approval package rendering failed";
                    "supplier_id" => %supplier.id, "error" => %e);
                return None;
            }
        };
        let key = package_key(&supplier.supplier_code, &rendered.file_name);
        match self.store.write(&key, rendered.bytes).await {
            Ok(()) => Some(key),
            Err(e) => {
                warn!(self.logger, "approval package could not be stored";
                    "supplier_id" => %supplier.id, "error" => %e);
                None
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn list_suppliers(
        &self,
        filter: SupplierFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<supplier::Model>, u64), ServiceError> {
        let mut query = supplier::Entity::find().order_by_desc(supplier::Column::CreatedAt);
        if let Some(status) = filter.status {
            query = query.filter(supplier::Column::Status.eq(status));
        }
        if let Some(search) = non_blank(filter.search) {
            query = query.filter(
                Condition::any()
                    .add(supplier::Column::CompanyName.contains(&search))
                    .add(supplier::Column::ContactEmail.contains(&search))
                    .add(supplier::Column::SupplierCode.contains(&search)),
            );
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let suppliers = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((suppliers, total))
    }

    #[instrument(skip(self))]
    pub async fn supplier_detail(&self, supplier_id: Uuid) -> Result<SupplierDetail, ServiceError> {
        let supplier = self.find_supplier(supplier_id).await?;
        let (onboarding, initiation) = match self.find_onboarding(supplier_id).await? {
            Some((onboarding, initiation)) => (Some(onboarding), initiation),
            None => (None, None),
        };
        let timeline = match &onboarding {
            Some(o) => {
                onboarding_timeline::Entity::find()
                    .filter(onboarding_timeline::Column::OnboardingId.eq(o.id))
                    .order_by_asc(onboarding_timeline::Column::CreatedAt)
                    .all(&*self.db)
                    .await?
            }
            None => Vec::new(),
        };

        let uploaded: BTreeSet<DocumentCategory> = supplier.airtable_data.union_of_categories();
        let (purchase_type, credit) = match &initiation {
            Some(i) => (i.purchase_type, i.credit_application),
            None => (
                crate::services::document_requirements::infer_purchase_type(&uploaded),
                false,
            ),
        };

        Ok(SupplierDetail {
            mandatory_documents: mandatory_documents(purchase_type, credit)
                .into_iter()
                .collect(),
            missing_documents: missing_mandatory(purchase_type, credit, &uploaded),
            supplier,
            onboarding,
            initiation,
            timeline,
        })
    }
}

fn apply_form_fields(active: &mut supplier::ActiveModel, fields: SupplierFormFields) {
    active.company_name = Set(fields.company_name.trim().to_string());
    active.contact_email = Set(fields.contact_email.trim().to_string());
    let person = fields.contact_person.trim();
    if !person.is_empty() {
        active.contact_person = Set(person.to_string());
    }
    active.contact_phone = Set(non_blank(fields.contact_phone));
    active.registration_number = Set(non_blank(fields.registration_number));
    active.vat_number = Set(non_blank(fields.vat_number));
    active.profile = Set(fields.profile);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, mime: &str) -> UploadedFile {
        UploadedFile {
            category: DocumentCategory::TaxClearance,
            file_name: name.to_string(),
            content_type: mime.to_string(),
            bytes: Bytes::from_static(b"%PDF-1.4"),
        }
    }

    #[test]
    fn pdf_check_needs_extension_and_mime() {
        assert!(file("tax.PDF", "application/pdf").is_pdf());
        assert!(file("tax.pdf", "application/pdf; charset=binary").is_pdf());
        assert!(!file("tax.pdf", "image/png").is_pdf());
        assert!(!file("tax.docx", "application/pdf").is_pdf());
    }

    #[test]
    fn supplier_codes_follow_format() {
        let code = generate_supplier_code();
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "SUP");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }
}
