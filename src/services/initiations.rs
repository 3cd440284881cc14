/*!
 * # Supplier Initiations
 *
 * Requests to onboard a supplier, from draft through the two approval gates.
 *
 * ```text
 * DRAFT ──submit──▶ SUBMITTED ──manager──▶ MANAGER_APPROVED ──procurement──▶ PROCUREMENT_APPROVED
 *   ▲                   │                        │                                  │ email sent
 *   └──── REJECTED ◀────┴────────────────────────┘                                  ▼
 *                                                                           SUPPLIER_EMAILED
 * ```
 *
 * A procurement gate row only exists once the manager gate has been approved.
 * Each gate is decided with a conditional update on `status = PENDING` inside
 * the same transaction that advances the initiation, so a second concurrent
 * decision fails with `NotPending` instead of being applied twice.
 */

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use slog::{info, warn, Logger};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{roles, AuthUser};
use crate::config::{EmailConfig, WorkflowConfig};
use crate::db::{map_unique_violation, DbPool};
use crate::entities::enums::{
    ApprovalStatus, BusinessUnit, InitiationStatus, OnboardingStep, OverallStatus, PaymentMethod,
    PurchaseType, SupplierStatus, UserRole,
};
use crate::entities::supplier_initiation::BusinessUnits;
use crate::entities::supplier_onboarding::DocumentsToRevise;
use crate::entities::{
    manager_approval, onboarding_timeline, procurement_approval, supplier, supplier_initiation,
    supplier_onboarding, user, user_delegation,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{AirtableData, AnnualPurchaseValue, SupplierProfile};
use crate::notifications::{templates, Notifier};
use crate::services::approval_authorization::{
    authorize, can_approve_as_manager, can_approve_as_procurement, resolve_manager_approver,
    ApprovalStage, Authority, Gate,
};
use crate::services::delegations::{active_delegates, effective_for_delegate};
use crate::services::duplicate_guard;
use crate::services::onboarding::{generate_supplier_code, record_timeline};

/// Initiation form fields. Everything is optional so drafts can be saved
/// half-filled; completeness is checked on submission.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitiationInput {
    #[validate(length(max = 255))]
    pub requester_name: Option<String>,
    #[validate(length(max = 255))]
    pub supplier_name: Option<String>,
    #[validate(email)]
    pub supplier_email: Option<String>,
    #[validate(length(max = 255))]
    pub supplier_contact_person: Option<String>,
    pub business_units: Option<Vec<BusinessUnit>>,
    #[validate(length(max = 255))]
    pub product_service_category: Option<String>,
    pub purchase_type: Option<PurchaseType>,
    pub payment_method: Option<PaymentMethod>,
    pub cod_reason: Option<String>,
    pub annual_purchase_value: Option<AnnualPurchaseValue>,
    pub credit_application: Option<bool>,
    pub credit_application_reason: Option<String>,
    pub onboarding_reason: Option<String>,
    pub relationship_declaration: Option<String>,
    pub process_read_understood: Option<bool>,
    pub due_diligence_completed: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub action: DecisionAction,
    #[validate(length(max = 2000))]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiationDetail {
    pub initiation: supplier_initiation::Model,
    pub manager_approval: Option<manager_approval::Model>,
    pub procurement_approval: Option<procurement_approval::Model>,
    pub can_approve_as_manager: bool,
    pub can_approve_as_procurement: bool,
}

/// A gate the caller can decide right now.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    pub stage: ApprovalStage,
    pub approval_id: Uuid,
    pub assigned_approver_id: Uuid,
    pub delegated: bool,
    pub initiation: supplier_initiation::Model,
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Everything that stops an initiation from being submitted, in form order.
pub fn submission_problems(initiation: &supplier_initiation::Model) -> Vec<String> {
    let mut problems = Vec::new();
    let required = [
        (&initiation.requester_name, "Requester name"),
        (&initiation.supplier_name, "Supplier name"),
        (&initiation.supplier_email, "Supplier email"),
        (&initiation.supplier_contact_person, "Supplier contact person"),
        (&initiation.product_service_category, "Product/service category"),
        (&initiation.onboarding_reason, "Reason for onboarding"),
        (&initiation.relationship_declaration, "Relationship declaration"),
    ];
    for (value, label) in required {
        if blank(value) {
            problems.push(format!("{} is required", label));
        }
    }
    if !blank(&initiation.supplier_email)
        && !validator::validate_email(initiation.supplier_email.trim())
    {
        problems.push("Supplier email is invalid".to_string());
    }
    if initiation.business_units.is_empty() {
        problems.push("At least one business unit is required".to_string());
    }
    if !initiation.process_read_understood {
        problems.push("You must confirm the onboarding process has been read and understood".to_string());
    }
    if !initiation.due_diligence_completed {
        problems.push("You must confirm due diligence has been completed".to_string());
    }

    match initiation.payment_method {
        None => problems.push("Payment method is required".to_string()),
        Some(PaymentMethod::Cod)
            if initiation.cod_reason.as_deref().map(blank).unwrap_or(true) =>
        {
            problems.push("A reason is required for COD payment".to_string())
        }
        Some(_) => {}
    }
    if initiation.purchase_type == PurchaseType::Regular
        && initiation
            .annual_purchase_value
            .map(|v| v <= Decimal::ZERO)
            .unwrap_or(true)
    {
        problems.push("Annual purchase value is required for regular purchases".to_string());
    }
    if initiation.purchase_type != PurchaseType::OnceOff
        && !initiation.credit_application
        && initiation
            .credit_application_reason
            .as_deref()
            .map(blank)
            .unwrap_or(true)
    {
        problems.push("A reason is required when no credit application is made".to_string());
    }
    problems
}

fn apply_input(active: &mut supplier_initiation::ActiveModel, input: InitiationInput) {
    if let Some(v) = trimmed(input.requester_name) {
        active.requester_name = Set(v);
    }
    if let Some(v) = input.supplier_name {
        active.supplier_name = Set(v.trim().to_string());
    }
    if let Some(v) = input.supplier_email {
        active.supplier_email = Set(v.trim().to_string());
    }
    if let Some(v) = input.supplier_contact_person {
        active.supplier_contact_person = Set(v.trim().to_string());
    }
    if let Some(v) = input.business_units {
        active.business_units = Set(BusinessUnits(v));
    }
    if let Some(v) = input.product_service_category {
        active.product_service_category = Set(v.trim().to_string());
    }
    if let Some(v) = input.purchase_type {
        active.purchase_type = Set(v);
    }
    if let Some(v) = input.payment_method {
        active.payment_method = Set(Some(v));
    }
    if input.cod_reason.is_some() {
        active.cod_reason = Set(trimmed(input.cod_reason));
    }
    if let Some(v) = input.annual_purchase_value {
        active.annual_purchase_value = Set(Some(v.normalize()));
    }
    if let Some(v) = input.credit_application {
        active.credit_application = Set(v);
    }
    if input.credit_application_reason.is_some() {
        active.credit_application_reason = Set(trimmed(input.credit_application_reason));
    }
    if let Some(v) = input.onboarding_reason {
        active.onboarding_reason = Set(v.trim().to_string());
    }
    if let Some(v) = input.relationship_declaration {
        active.relationship_declaration = Set(v.trim().to_string());
    }
    if let Some(v) = input.process_read_understood {
        active.process_read_understood = Set(v);
    }
    if let Some(v) = input.due_diligence_completed {
        active.due_diligence_completed = Set(v);
    }
}

fn blank_initiation(initiated_by_id: Uuid, requester_name: String) -> supplier_initiation::ActiveModel {
    supplier_initiation::ActiveModel {
        initiated_by_id: Set(initiated_by_id),
        requester_name: Set(requester_name),
        supplier_name: Set(String::new()),
        supplier_email: Set(String::new()),
        supplier_contact_person: Set(String::new()),
        business_units: Set(BusinessUnits::default()),
        product_service_category: Set(String::new()),
        purchase_type: Set(PurchaseType::Regular),
        payment_method: Set(None),
        cod_reason: Set(None),
        annual_purchase_value: Set(None),
        credit_application: Set(false),
        credit_application_reason: Set(None),
        onboarding_reason: Set(String::new()),
        relationship_declaration: Set(String::new()),
        process_read_understood: Set(false),
        due_diligence_completed: Set(false),
        status: Set(InitiationStatus::Draft),
        submitted_at: Set(None),
        email_sent: Set(false),
        email_sent_at: Set(None),
        ..Default::default()
    }
}

#[derive(Clone)]
pub struct InitiationService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    notifier: Notifier,
    email: EmailConfig,
    workflow: WorkflowConfig,
    logger: Logger,
}

impl InitiationService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        notifier: Notifier,
        email: EmailConfig,
        workflow: WorkflowConfig,
        logger: Logger,
    ) -> Self {
        Self {
            db,
            event_sender,
            notifier,
            email,
            workflow,
            logger,
        }
    }

    async fn find<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<supplier_initiation::Model, ServiceError> {
        supplier_initiation::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Supplier initiation {} not found", id)))
    }

    async fn gates<C: ConnectionTrait>(
        db: &C,
        initiation_id: Uuid,
    ) -> Result<(Option<manager_approval::Model>, Option<procurement_approval::Model>), ServiceError>
    {
        let manager = manager_approval::Entity::find()
            .filter(manager_approval::Column::InitiationId.eq(initiation_id))
            .one(db)
            .await?;
        let procurement = procurement_approval::Entity::find()
            .filter(procurement_approval::Column::InitiationId.eq(initiation_id))
            .one(db)
            .await?;
        Ok((manager, procurement))
    }

    /// Creates an initiation as a draft, or submits it straight away.
    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id, submit))]
    pub async fn create(
        &self,
        actor: &AuthUser,
        input: InitiationInput,
        submit: bool,
    ) -> Result<supplier_initiation::Model, ServiceError> {
        input.validate()?;
        let requester = actor.name.clone().unwrap_or_default();
        let mut active = blank_initiation(actor.user_id, requester);
        apply_input(&mut active, input);

        let txn = self.db.begin().await?;
        let draft = active.insert(&txn).await?;
        if !submit {
            txn.commit().await?;
            info!(self.logger, "initiation draft created";
                "initiation_id" => %draft.id, "user_id" => %actor.user_id);
            self.event_sender
                .send_or_log(Event::InitiationDraftSaved(draft.id))
                .await;
            return Ok(draft);
        }

        let (submitted, approver_id) = self.submit_in(&txn, draft).await?;
        txn.commit().await?;
        self.after_submit(&submitted, approver_id).await;
        Ok(submitted)
    }

    /// Creates a draft when `id` is `None`, otherwise merges the given fields
    /// into the caller's DRAFT or REJECTED initiation. Saving always leaves the
    /// initiation in DRAFT.
    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id))]
    pub async fn save_draft(
        &self,
        actor: &AuthUser,
        id: Option<Uuid>,
        input: InitiationInput,
    ) -> Result<supplier_initiation::Model, ServiceError> {
        let Some(id) = id else {
            return self.create(actor, input, false).await;
        };
        input.validate()?;

        let existing = Self::find(&*self.db, id).await?;
        if existing.initiated_by_id != actor.user_id {
            return Err(ServiceError::Forbidden(
                "Only the initiator can edit this request".to_string(),
            ));
        }
        if !existing.status.is_editable() {
            return Err(ServiceError::InvalidStatus(format!(
                "Initiation cannot be edited while {}",
                existing.status
            )));
        }

        let mut active: supplier_initiation::ActiveModel = existing.into();
        apply_input(&mut active, input);
        active.status = Set(InitiationStatus::Draft);
        let saved = active.update(&*self.db).await?;

        info!(self.logger, "initiation draft saved"; "initiation_id" => %saved.id);
        self.event_sender
            .send_or_log(Event::InitiationDraftSaved(saved.id))
            .await;
        Ok(saved)
    }

    /// Submits a DRAFT or REJECTED initiation and opens a fresh manager gate.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn submit(
        &self,
        actor: &AuthUser,
        id: Uuid,
    ) -> Result<supplier_initiation::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let initiation = Self::find(&txn, id).await?;
        if initiation.initiated_by_id != actor.user_id {
            return Err(ServiceError::Forbidden(
                "Only the initiator can submit this request".to_string(),
            ));
        }
        if !initiation.status.is_editable() {
            return Err(ServiceError::InvalidStatus(format!(
                "Only draft or rejected initiations can be submitted (current: {})",
                initiation.status
            )));
        }

        let (submitted, approver_id) = self.submit_in(&txn, initiation).await?;
        txn.commit().await?;
        self.after_submit(&submitted, approver_id).await;
        Ok(submitted)
    }

    async fn submit_in<C: ConnectionTrait>(
        &self,
        txn: &C,
        initiation: supplier_initiation::Model,
    ) -> Result<(supplier_initiation::Model, Uuid), ServiceError> {
        let problems = submission_problems(&initiation);
        if !problems.is_empty() {
            return Err(ServiceError::ValidationFailed(problems));
        }
        duplicate_guard::check_initiation(
            txn,
            &initiation.supplier_name,
            &initiation.supplier_email,
            Some(initiation.id),
        )
        .await?;

        manager_approval::Entity::delete_many()
            .filter(manager_approval::Column::InitiationId.eq(initiation.id))
            .exec(txn)
            .await?;
        procurement_approval::Entity::delete_many()
            .filter(procurement_approval::Column::InitiationId.eq(initiation.id))
            .exec(txn)
            .await?;

        let initiator = user::Entity::find_by_id(initiation.initiated_by_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Initiator not found".to_string()))?;
        let manager = match initiator.manager_id {
            Some(manager_id) => user::Entity::find_by_id(manager_id).one(txn).await?,
            None => None,
        };
        let fallback = user::Entity::find()
            .filter(user::Column::Role.eq(UserRole::Manager))
            .filter(user::Column::IsActive.eq(true))
            .filter(user::Column::Id.ne(initiator.id))
            .order_by_asc(user::Column::CreatedAt)
            .one(txn)
            .await?;
        let approver_id = resolve_manager_approver(
            &initiator,
            manager.as_ref(),
            fallback.as_ref(),
            self.workflow.manager_fallback,
        )?;

        manager_approval::ActiveModel {
            initiation_id: Set(initiation.id),
            approver_id: Set(approver_id),
            status: Set(ApprovalStatus::Pending),
            decided_by_id: Set(None),
            approved_at: Set(None),
            comments: Set(None),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(|e| map_unique_violation(e, "A manager approval is already open for this initiation"))?;

        let now = Utc::now();
        let result = supplier_initiation::Entity::update_many()
            .set(supplier_initiation::ActiveModel {
                status: Set(InitiationStatus::Submitted),
                submitted_at: Set(Some(now)),
                updated_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(supplier_initiation::Column::Id.eq(initiation.id))
            .filter(
                supplier_initiation::Column::Status
                    .is_in([InitiationStatus::Draft, InitiationStatus::Rejected]),
            )
            .exec(txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(initiation.id));
        }

        Ok((Self::find(txn, initiation.id).await?, approver_id))
    }

    async fn after_submit(&self, initiation: &supplier_initiation::Model, approver_id: Uuid) {
        info!(self.logger, "initiation submitted";
            "initiation_id" => %initiation.id,
            "supplier_name" => &initiation.supplier_name,
            "manager_approver_id" => %approver_id);
        self.notify_approvers(ApprovalStage::Manager, approver_id, initiation)
            .await;
        self.event_sender
            .send_or_log(Event::InitiationSubmitted {
                initiation_id: initiation.id,
                manager_approver_id: approver_id,
            })
            .await;
    }

    /// Emails the assigned approver and everyone currently delegated to act for them.
    async fn notify_approvers(
        &self,
        stage: ApprovalStage,
        approver_id: Uuid,
        initiation: &supplier_initiation::Model,
    ) {
        let db = &*self.db;
        let approver = match user::Entity::find_by_id(approver_id).one(db).await {
            Ok(Some(approver)) => approver,
            Ok(None) => return,
            Err(e) => {
                warn!(self.logger, "could not load approver for notification"; "error" => %e);
                return;
            }
        };
        let url = self.email.approvals_link();
        let mut messages = vec![templates::approval_required(
            stage,
            &approver.email,
            initiation,
            &url,
            None,
        )];
        match active_delegates(db, approver_id, stage, Utc::now()).await {
            Ok(delegates) => messages.extend(delegates.iter().map(|d| {
                templates::approval_required(stage, &d.email, initiation, &url, Some(&approver.name))
            })),
            Err(e) => warn!(self.logger, "could not load delegates for notification"; "error" => %e),
        }
        self.notifier.notify_all(messages).await;
    }

    async fn notify_initiator(
        &self,
        initiation: &supplier_initiation::Model,
        stage: ApprovalStage,
        approved: bool,
        comments: Option<&str>,
    ) {
        match user::Entity::find_by_id(initiation.initiated_by_id)
            .one(&*self.db)
            .await
        {
            Ok(Some(initiator)) => {
                self.notifier
                    .notify(templates::decision_for_initiator(
                        &initiator.email,
                        initiation,
                        stage,
                        approved,
                        comments,
                    ))
                    .await;
            }
            Ok(None) => {}
            Err(e) => warn!(self.logger, "could not load initiator for notification"; "error" => %e),
        }
    }

    /// Manager-stage decision by the assigned manager or an active delegate.
    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn manager_decision(
        &self,
        actor: &AuthUser,
        id: Uuid,
        request: DecisionRequest,
    ) -> Result<supplier_initiation::Model, ServiceError> {
        request.validate()?;
        let approved = request.action == DecisionAction::Approve;
        let comments = trimmed(request.comments);
        let now = Utc::now();

        let txn = self.db.begin().await?;
        let initiation = Self::find(&txn, id).await?;
        let (gate, _) = Self::gates(&txn, id).await?;
        let delegations = effective_for_delegate(&txn, actor.user_id, now).await?;
        let authority = authorize(
            ApprovalStage::Manager,
            initiation.initiated_by_id,
            gate.as_ref().map(Gate::from),
            actor.user_id,
            &delegations,
            now,
        )
        .map_err(|d| d.into_service_error(ApprovalStage::Manager))?;
        let gate = gate.ok_or_else(|| {
            ServiceError::InvalidOperation("No manager approval is open".to_string())
        })?;

        let result = manager_approval::Entity::update_many()
            .set(manager_approval::ActiveModel {
                status: Set(decided(approved)),
                decided_by_id: Set(Some(actor.user_id)),
                approved_at: Set(Some(now)),
                comments: Set(comments.clone()),
                updated_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(manager_approval::Column::Id.eq(gate.id))
            .filter(manager_approval::Column::Status.eq(ApprovalStatus::Pending))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotPending(gate.id));
        }

        let procurement_approver = if approved {
            let approver = user::Entity::find()
                .filter(user::Column::Role.eq(UserRole::ProcurementManager))
                .filter(user::Column::IsActive.eq(true))
                .filter(user::Column::Id.ne(initiation.initiated_by_id))
                .order_by_desc(user::Column::CreatedAt)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::InvalidOperation(
                        "No procurement manager is available to approve this initiation"
                            .to_string(),
                    )
                })?;
            procurement_approval::ActiveModel {
                initiation_id: Set(id),
                approver_id: Set(approver.id),
                status: Set(ApprovalStatus::Pending),
                decided_by_id: Set(None),
                approved_at: Set(None),
                comments: Set(None),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                map_unique_violation(e, "A procurement approval already exists for this initiation")
            })?;
            Some(approver.id)
        } else {
            None
        };

        let next = if approved {
            InitiationStatus::ManagerApproved
        } else {
            InitiationStatus::Rejected
        };
        let initiation =
            Self::advance(&txn, id, InitiationStatus::Submitted, next, now).await?;
        txn.commit().await?;

        info!(self.logger, "manager decision recorded";
            "initiation_id" => %id,
            "approved" => approved,
            "decided_by" => %actor.user_id,
            "delegated" => matches!(authority, Authority::Delegated { .. }));

        self.notify_initiator(&initiation, ApprovalStage::Manager, approved, comments.as_deref())
            .await;
        if let Some(approver_id) = procurement_approver {
            self.notify_approvers(ApprovalStage::Procurement, approver_id, &initiation)
                .await;
        }
        self.event_sender
            .send_or_log(Event::ManagerDecided {
                initiation_id: id,
                approved,
            })
            .await;
        Ok(initiation)
    }

    /// Procurement-stage decision. Approval creates the supplier and its
    /// onboarding record, then emails the supplier their onboarding link.
    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn procurement_decision(
        &self,
        actor: &AuthUser,
        id: Uuid,
        request: DecisionRequest,
    ) -> Result<supplier_initiation::Model, ServiceError> {
        request.validate()?;
        let approved = request.action == DecisionAction::Approve;
        let comments = trimmed(request.comments);
        let now = Utc::now();

        let txn = self.db.begin().await?;
        let initiation = Self::find(&txn, id).await?;
        let (_, gate) = Self::gates(&txn, id).await?;
        let delegations = effective_for_delegate(&txn, actor.user_id, now).await?;
        let authority = authorize(
            ApprovalStage::Procurement,
            initiation.initiated_by_id,
            gate.as_ref().map(Gate::from),
            actor.user_id,
            &delegations,
            now,
        )
        .map_err(|d| d.into_service_error(ApprovalStage::Procurement))?;
        let gate = gate.ok_or_else(|| {
            ServiceError::InvalidOperation("No procurement approval is open".to_string())
        })?;

        let result = procurement_approval::Entity::update_many()
            .set(procurement_approval::ActiveModel {
                status: Set(decided(approved)),
                decided_by_id: Set(Some(actor.user_id)),
                approved_at: Set(Some(now)),
                comments: Set(comments.clone()),
                updated_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(procurement_approval::Column::Id.eq(gate.id))
            .filter(procurement_approval::Column::Status.eq(ApprovalStatus::Pending))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotPending(gate.id));
        }

        let next = if approved {
            InitiationStatus::ProcurementApproved
        } else {
            InitiationStatus::Rejected
        };
        let initiation =
            Self::advance(&txn, id, InitiationStatus::ManagerApproved, next, now).await?;
        let onboarding = if approved {
            Some(self.open_onboarding(&txn, &initiation, actor.user_id, now).await?)
        } else {
            None
        };
        txn.commit().await?;

        info!(self.logger, "procurement decision recorded";
            "initiation_id" => %id,
            "approved" => approved,
            "decided_by" => %actor.user_id,
            "delegated" => matches!(authority, Authority::Delegated { .. }));

        self.notify_initiator(
            &initiation,
            ApprovalStage::Procurement,
            approved,
            comments.as_deref(),
        )
        .await;
        self.event_sender
            .send_or_log(Event::ProcurementDecided {
                initiation_id: id,
                approved,
            })
            .await;

        match onboarding {
            Some(onboarding) => self.email_supplier(initiation, onboarding).await,
            None => Ok(initiation),
        }
    }

    /// Creates the PENDING supplier and its onboarding record for an approved initiation.
    async fn open_onboarding<C: ConnectionTrait>(
        &self,
        txn: &C,
        initiation: &supplier_initiation::Model,
        approved_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<supplier_onboarding::Model, ServiceError> {
        let supplier = supplier::ActiveModel {
            supplier_code: Set(generate_supplier_code()),
            company_name: Set(initiation.supplier_name.clone()),
            contact_person: Set(initiation.supplier_contact_person.clone()),
            contact_email: Set(initiation.supplier_email.clone()),
            contact_phone: Set(None),
            registration_number: Set(None),
            vat_number: Set(None),
            profile: Set(SupplierProfile::default()),
            status: Set(SupplierStatus::Pending),
            airtable_data: Set(AirtableData::default()),
            created_by_id: Set(Some(initiation.initiated_by_id)),
            approved_at: Set(None),
            approved_by_id: Set(None),
            rejection_reason: Set(None),
            credit_controller: Set(None),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(|e| map_unique_violation(e, "A supplier with this email address already exists"))?;

        let onboarding = supplier_onboarding::ActiveModel {
            supplier_id: Set(supplier.id),
            initiation_id: Set(Some(initiation.id)),
            onboarding_token: Set(format!(
                "init_{}_{}",
                initiation.id.simple(),
                now.timestamp_millis()
            )),
            current_step: Set(OnboardingStep::PendingSupplierResponse),
            overall_status: Set(OverallStatus::AwaitingResponse),
            approval_status: Set(ApprovalStatus::Pending),
            revision_count: Set(0),
            revision_requested: Set(false),
            revision_notes: Set(None),
            revision_requested_at: Set(None),
            documents_to_revise: Set(DocumentsToRevise::default()),
            supplier_form_submitted: Set(false),
            supplier_form_submitted_at: Set(None),
            email_sent: Set(false),
            email_sent_at: Set(None),
            completed_at: Set(None),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(|e| map_unique_violation(e, "An onboarding already exists for this initiation"))?;

        record_timeline(
            txn,
            onboarding.id,
            OnboardingStep::Initiate,
            OverallStatus::Initiated,
            "Initiation approved",
            format!(
                "Supplier {} created from approved initiation",
                supplier.supplier_code
            ),
            Some(approved_by),
        )
        .await?;
        Ok(onboarding)
    }

    /// Sends the onboarding invitation. A failed send leaves the initiation
    /// PROCUREMENT_APPROVED with `email_sent = false`; see [`Self::resend_invitation`].
    async fn email_supplier(
        &self,
        initiation: supplier_initiation::Model,
        onboarding: supplier_onboarding::Model,
    ) -> Result<supplier_initiation::Model, ServiceError> {
        let link = self.email.onboarding_link(&onboarding.onboarding_token);
        let delivered = match self
            .notifier
            .deliver(templates::onboarding_invitation(&initiation, &link))
            .await
        {
            Ok(receipt) if receipt.success => true,
            Ok(_) => {
                warn!(self.logger, "onboarding invitation rejected by dispatcher";
                    "initiation_id" => %initiation.id);
                false
            }
            Err(e) => {
                warn!(self.logger, "onboarding invitation failed";
                    "initiation_id" => %initiation.id, "error" => %e);
                false
            }
        };
        if !delivered {
            return Ok(initiation);
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let initiation = Self::advance(
            &txn,
            initiation.id,
            InitiationStatus::ProcurementApproved,
            InitiationStatus::SupplierEmailed,
            now,
        )
        .await?;
        supplier_initiation::Entity::update_many()
            .set(supplier_initiation::ActiveModel {
                email_sent: Set(true),
                email_sent_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(supplier_initiation::Column::Id.eq(initiation.id))
            .exec(&txn)
            .await?;
        supplier_onboarding::Entity::update_many()
            .set(supplier_onboarding::ActiveModel {
                email_sent: Set(true),
                email_sent_at: Set(Some(now)),
                overall_status: Set(OverallStatus::EmailSent),
                updated_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(supplier_onboarding::Column::Id.eq(onboarding.id))
            .exec(&txn)
            .await?;
        let initiation = Self::find(&txn, initiation.id).await?;
        txn.commit().await?;

        info!(self.logger, "supplier emailed";
            "initiation_id" => %initiation.id, "supplier_id" => %onboarding.supplier_id);
        self.event_sender
            .send_or_log(Event::SupplierEmailed {
                initiation_id: initiation.id,
                supplier_id: onboarding.supplier_id,
            })
            .await;
        Ok(initiation)
    }

    /// Retries the onboarding invitation after a failed send. The initiation
    /// is returned unchanged when the dispatcher fails again.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn resend_invitation(
        &self,
        actor: &AuthUser,
        id: Uuid,
    ) -> Result<supplier_initiation::Model, ServiceError> {
        let initiation = Self::find(&*self.db, id).await?;
        if initiation.initiated_by_id != actor.user_id
            && !actor.has_any_role(&[roles::ADMIN, roles::PROCUREMENT_MANAGER])
        {
            return Err(ServiceError::Forbidden(
                "Only the initiator, an administrator or a procurement manager can resend the invitation"
                    .to_string(),
            ));
        }
        if initiation.status != InitiationStatus::ProcurementApproved || initiation.email_sent {
            return Err(ServiceError::InvalidStatus(format!(
                "The invitation can only be resent while procurement approved and unsent (current: {})",
                initiation.status
            )));
        }
        let onboarding = supplier_onboarding::Entity::find()
            .filter(supplier_onboarding::Column::InitiationId.eq(id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("No onboarding exists for this initiation".to_string())
            })?;

        info!(self.logger, "resending onboarding invitation";
            "initiation_id" => %id, "requested_by" => %actor.user_id);
        self.email_supplier(initiation, onboarding).await
    }

    /// Moves an initiation from `from` to `to`, failing if someone else moved it first.
    async fn advance<C: ConnectionTrait>(
        txn: &C,
        id: Uuid,
        from: InitiationStatus,
        to: InitiationStatus,
        now: DateTime<Utc>,
    ) -> Result<supplier_initiation::Model, ServiceError> {
        let result = supplier_initiation::Entity::update_many()
            .set(supplier_initiation::ActiveModel {
                status: Set(to),
                updated_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(supplier_initiation::Column::Id.eq(id))
            .filter(supplier_initiation::Column::Status.eq(from))
            .exec(txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(id));
        }
        Self::find(txn, id).await
    }

    /// Decides whichever gate is currently pending.
    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn decide(
        &self,
        actor: &AuthUser,
        id: Uuid,
        request: DecisionRequest,
    ) -> Result<supplier_initiation::Model, ServiceError> {
        Self::find(&*self.db, id).await?;
        match Self::gates(&*self.db, id).await? {
            (_, Some(procurement)) if procurement.is_pending() => {
                self.procurement_decision(actor, id, request).await
            }
            (Some(manager), _) if manager.is_pending() => {
                self.manager_decision(actor, id, request).await
            }
            (_, Some(procurement)) => Err(ServiceError::NotPending(procurement.id)),
            (Some(manager), None) => Err(ServiceError::NotPending(manager.id)),
            (None, None) => Err(ServiceError::InvalidOperation(
                "This initiation has no open approval".to_string(),
            )),
        }
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get(&self, actor: &AuthUser, id: Uuid) -> Result<InitiationDetail, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();
        let initiation = Self::find(db, id).await?;
        let (manager, procurement) = Self::gates(db, id).await?;
        let delegations = effective_for_delegate(db, actor.user_id, now).await?;

        let approvers: Vec<Uuid> = manager
            .iter()
            .map(|m| m.approver_id)
            .chain(procurement.iter().map(|p| p.approver_id))
            .collect();
        let allowed = initiation.initiated_by_id == actor.user_id
            || actor.is_reviewer()
            || approvers.contains(&actor.user_id)
            || delegations
                .iter()
                .any(|d| approvers.contains(&d.delegator_id));
        if !allowed {
            return Err(ServiceError::Forbidden(
                "You do not have access to this initiation".to_string(),
            ));
        }

        Ok(InitiationDetail {
            can_approve_as_manager: can_approve_as_manager(
                &initiation,
                manager.as_ref(),
                actor.user_id,
                &delegations,
                now,
            ),
            can_approve_as_procurement: can_approve_as_procurement(
                &initiation,
                procurement.as_ref(),
                actor.user_id,
                &delegations,
                now,
            ),
            initiation,
            manager_approval: manager,
            procurement_approval: procurement,
        })
    }

    /// The caller's own initiations, newest first.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn list(
        &self,
        actor: &AuthUser,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<supplier_initiation::Model>, u64), ServiceError> {
        let paginator = supplier_initiation::Entity::find()
            .filter(supplier_initiation::Column::InitiatedById.eq(actor.user_id))
            .order_by_desc(supplier_initiation::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn pending_approvals(
        &self,
        actor: &AuthUser,
    ) -> Result<Vec<PendingApproval>, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();
        let delegations = effective_for_delegate(db, actor.user_id, now).await?;
        let acting_for = |covers: fn(&user_delegation::Model) -> bool| {
            let mut ids: HashSet<Uuid> = delegations
                .iter()
                .filter(|d| covers(d))
                .map(|d| d.delegator_id)
                .collect();
            ids.insert(actor.user_id);
            ids.into_iter().collect::<Vec<_>>()
        };
        let manager_for = acting_for(user_delegation::Model::covers_manager_approvals);
        let procurement_for = acting_for(user_delegation::Model::covers_procurement_approvals);

        let mut pending = Vec::new();
        let manager_gates = manager_approval::Entity::find()
            .filter(manager_approval::Column::Status.eq(ApprovalStatus::Pending))
            .filter(manager_approval::Column::ApproverId.is_in(manager_for))
            .order_by_asc(manager_approval::Column::CreatedAt)
            .find_also_related(supplier_initiation::Entity)
            .all(db)
            .await?;
        for (gate, initiation) in manager_gates {
            if let Some(initiation) = initiation.filter(|i| i.initiated_by_id != actor.user_id) {
                pending.push(PendingApproval {
                    stage: ApprovalStage::Manager,
                    approval_id: gate.id,
                    assigned_approver_id: gate.approver_id,
                    delegated: gate.approver_id != actor.user_id,
                    initiation,
                });
            }
        }

        let procurement_gates = procurement_approval::Entity::find()
            .filter(procurement_approval::Column::Status.eq(ApprovalStatus::Pending))
            .filter(procurement_approval::Column::ApproverId.is_in(procurement_for))
            .order_by_asc(procurement_approval::Column::CreatedAt)
            .find_also_related(supplier_initiation::Entity)
            .all(db)
            .await?;
        for (gate, initiation) in procurement_gates {
            if let Some(initiation) = initiation.filter(|i| i.initiated_by_id != actor.user_id) {
                pending.push(PendingApproval {
                    stage: ApprovalStage::Procurement,
                    approval_id: gate.id,
                    assigned_approver_id: gate.approver_id,
                    delegated: gate.approver_id != actor.user_id,
                    initiation,
                });
            }
        }
        Ok(pending)
    }

    /// Deletes an initiation together with its approvals and any onboarding
    /// that has not yet received a supplier form.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete(&self, actor: &AuthUser, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let initiation = Self::find(&txn, id).await?;
        let owner = initiation.initiated_by_id == actor.user_id;

        if initiation.status == InitiationStatus::SupplierEmailed {
            return Err(ServiceError::InvalidOperation(
                "Initiations whose supplier has been emailed cannot be deleted".to_string(),
            ));
        }
        if !actor.is_admin() {
            if !owner {
                return Err(ServiceError::Forbidden(
                    "Only the initiator or an administrator can delete this initiation"
                        .to_string(),
                ));
            }
            if !initiation.status.is_editable() {
                return Err(ServiceError::InvalidStatus(format!(
                    "Only draft or rejected initiations can be deleted (current: {})",
                    initiation.status
                )));
            }
        }

        let onboarding = supplier_onboarding::Entity::find()
            .filter(supplier_onboarding::Column::InitiationId.eq(id))
            .one(&txn)
            .await?;
        if let Some(onboarding) = onboarding {
            if onboarding.supplier_form_submitted {
                return Err(ServiceError::InvalidOperation(
                    "The supplier has already submitted their onboarding form".to_string(),
                ));
            }
            onboarding_timeline::Entity::delete_many()
                .filter(onboarding_timeline::Column::OnboardingId.eq(onboarding.id))
                .exec(&txn)
                .await?;
            supplier_onboarding::Entity::delete_by_id(onboarding.id)
                .exec(&txn)
                .await?;
            supplier::Entity::delete_many()
                .filter(supplier::Column::Id.eq(onboarding.supplier_id))
                .filter(supplier::Column::Status.eq(SupplierStatus::Pending))
                .exec(&txn)
                .await?;
        }

        manager_approval::Entity::delete_many()
            .filter(manager_approval::Column::InitiationId.eq(id))
            .exec(&txn)
            .await?;
        procurement_approval::Entity::delete_many()
            .filter(procurement_approval::Column::InitiationId.eq(id))
            .exec(&txn)
            .await?;
        supplier_initiation::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        info!(self.logger, "initiation deleted";
            "initiation_id" => %id, "deleted_by" => %actor.user_id, "status" => %initiation.status);
        self.event_sender
            .send_or_log(Event::InitiationDeleted(id))
            .await;
        Ok(())
    }
}

fn decided(approved: bool) -> ApprovalStatus {
    if approved {
        ApprovalStatus::Approved
    } else {
        ApprovalStatus::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::enums::BusinessUnit;

    fn complete() -> supplier_initiation::Model {
        supplier_initiation::Model {
            id: Uuid::new_v4(),
            initiated_by_id: Uuid::new_v4(),
            requester_name: "Rea Requester".into(),
            supplier_name: "Acme Mining Supplies".into(),
            supplier_email: "sales@acme.example".into(),
            supplier_contact_person: "Jane Dlamini".into(),
            business_units: BusinessUnits(vec![BusinessUnit::SchauenburgSystems200]),
            product_service_category: "Conveyor parts".into(),
            purchase_type: PurchaseType::Regular,
            payment_method: Some(PaymentMethod::Ac),
            cod_reason: None,
            annual_purchase_value: Some(Decimal::from(500_000)),
            credit_application: true,
            credit_application_reason: None,
            onboarding_reason: "Replacement supplier".into(),
            relationship_declaration: "None".into(),
            process_read_understood: true,
            due_diligence_completed: true,
            status: InitiationStatus::Draft,
            submitted_at: None,
            email_sent: false,
            email_sent_at: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn complete_initiation_has_no_problems() {
        assert!(submission_problems(&complete()).is_empty());
    }

    #[test]
    fn once_off_needs_no_credit_reason_or_value() {
        let mut i = complete();
        i.purchase_type = PurchaseType::OnceOff;
        i.credit_application = false;
        i.annual_purchase_value = None;
        assert!(submission_problems(&i).is_empty());
    }

    #[test]
    fn regular_without_credit_needs_reason() {
        let mut i = complete();
        i.credit_application = false;
        let problems = submission_problems(&i);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("credit application"));
    }

    #[test]
    fn cod_needs_reason_and_checkboxes_are_required() {
        let mut i = complete();
        i.payment_method = Some(PaymentMethod::Cod);
        i.process_read_understood = false;
        i.business_units = BusinessUnits::default();
        let problems = submission_problems(&i);
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn regular_requires_positive_annual_value() {
        let mut i = complete();
        i.annual_purchase_value = Some(Decimal::ZERO);
        assert_eq!(submission_problems(&i).len(), 1);
    }

    #[test]
    fn draft_input_merges_only_present_fields() {
        let mut active = blank_initiation(Uuid::new_v4(), "Rea".into());
        apply_input(
            &mut active,
            InitiationInput {
                supplier_name: Some("  Acme  ".into()),
                annual_purchase_value: Some(AnnualPurchaseValue::Bucket(
                    crate::models::AnnualValueBucket::UpTo100k,
                )),
                ..Default::default()
            },
        );
        assert_eq!(active.supplier_name, Set("Acme".to_string()));
        assert_eq!(active.annual_purchase_value, Set(Some(Decimal::from(100_000))));
        assert_eq!(active.requester_name, Set("Rea".to_string()));
    }
}
