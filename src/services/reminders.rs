/*!
 * # Reminders
 *
 * A sweep that chases work left waiting longer than
 * `workflow.reminder_after_hours`: pending approval gates, invitations the
 * supplier has not answered, open revision requests and submitted suppliers
 * nobody has reviewed.
 *
 * Every reminder is recorded in `reminder_logs` keyed by type, reference and
 * recipient. A recipient gets one reminder per waiting period; a failed send
 * is retried by the next sweep.
 */

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Serialize;
use slog::{info, warn, Logger};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{EmailConfig, WorkflowConfig};
use crate::db::DbPool;
use crate::entities::enums::{
    ApprovalStatus, OverallStatus, ReminderStatus, ReminderType, SupplierStatus,
};
use crate::entities::{
    manager_approval, procurement_approval, reminder_log, supplier, supplier_initiation,
    supplier_onboarding, user,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::notifications::{templates, EmailMessage, Notifier};
use crate::services::approval_authorization::ApprovalStage;
use crate::services::onboarding::procurement_recipients;

/// Reminders delivered by one sweep, per kind, plus the sends that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSummary {
    pub manager_approvals: usize,
    pub procurement_approvals: usize,
    pub supplier_documents: usize,
    pub supplier_revisions: usize,
    pub pm_reviews: usize,
    pub failed: usize,
}

impl ReminderSummary {
    fn count(&mut self, kind: ReminderType) {
        let slot = match kind {
            ReminderType::ManagerApprovalPending => &mut self.manager_approvals,
            ReminderType::ProcurementApprovalPending => &mut self.procurement_approvals,
            ReminderType::SupplierDocumentSubmission => &mut self.supplier_documents,
            ReminderType::SupplierRevisionPending => &mut self.supplier_revisions,
            ReminderType::PmReviewPending => &mut self.pm_reviews,
        };
        *slot += 1;
    }

    pub fn delivered(&self) -> usize {
        self.manager_approvals
            + self.procurement_approvals
            + self.supplier_documents
            + self.supplier_revisions
            + self.pm_reviews
    }
}

/// One overdue item and the message chasing it.
struct DueReminder {
    kind: ReminderType,
    reference_id: Uuid,
    waiting_since: DateTime<Utc>,
    message: EmailMessage,
}

fn waiting_hours(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - since).num_hours()
}

async fn users_by_id(
    db: &DbPool,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, user::Model>, ServiceError> {
    let ids: Vec<Uuid> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(user::Entity::find()
        .filter(user::Column::Id.is_in(ids))
        .filter(user::Column::IsActive.eq(true))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect())
}

#[derive(Clone)]
pub struct ReminderService {
    db: Arc<DbPool>,
    notifier: Notifier,
    email: EmailConfig,
    workflow: WorkflowConfig,
    event_sender: Arc<EventSender>,
    logger: Logger,
}

impl ReminderService {
    pub fn new(
        db: Arc<DbPool>,
        notifier: Notifier,
        email: EmailConfig,
        workflow: WorkflowConfig,
        event_sender: Arc<EventSender>,
        logger: Logger,
    ) -> Self {
        Self {
            db,
            notifier,
            email,
            workflow,
            event_sender,
            logger,
        }
    }

    /// Sends a reminder for every item waiting since before
    /// `now - reminder_after_hours` that has not already been chased.
    /// Delivery is best-effort: failures are logged and counted, never
    /// returned as errors.
    #[instrument(skip(self))]
    pub async fn check(&self, now: DateTime<Utc>) -> Result<ReminderSummary, ServiceError> {
        let cutoff = now - self.workflow.reminder_threshold();

        let mut due = self.pending_manager_gates(cutoff, now).await?;
        due.extend(self.pending_procurement_gates(cutoff, now).await?);
        due.extend(self.unanswered_invitations(cutoff).await?);
        due.extend(self.open_revisions(cutoff).await?);
        due.extend(self.unreviewed_submissions(cutoff, now).await?);

        let mut logs = Vec::with_capacity(due.len());
        let mut outstanding = Vec::with_capacity(due.len());
        for reminder in due {
            let existing = reminder_log::Entity::find()
                .filter(reminder_log::Column::ReminderType.eq(reminder.kind))
                .filter(reminder_log::Column::ReferenceId.eq(reminder.reference_id))
                .filter(reminder_log::Column::RecipientEmail.eq(reminder.message.to.clone()))
                .one(&*self.db)
                .await?;
            let already_sent = existing.as_ref().is_some_and(|log| {
                log.status == ReminderStatus::Sent
                    && log.sent_at.is_some_and(|at| at >= reminder.waiting_since)
            });
            if !already_sent {
                logs.push(existing);
                outstanding.push(reminder);
            }
        }

        let outcomes = self
            .notifier
            .notify_each(outstanding.iter().map(|r| r.message.clone()).collect())
            .await;

        let mut summary = ReminderSummary::default();
        for ((reminder, existing), delivered) in outstanding.into_iter().zip(logs).zip(outcomes) {
            if delivered {
                summary.count(reminder.kind);
            } else {
                summary.failed += 1;
            }
            self.record(reminder, existing, delivered, now).await?;
        }

        info!(self.logger, "reminder sweep finished";
            "delivered" => summary.delivered(),
            "failed" => summary.failed,
            "cutoff" => %cutoff);
        self.event_sender
            .send_or_log(Event::RemindersSent {
                delivered: summary.delivered(),
                failed: summary.failed,
            })
            .await;
        Ok(summary)
    }

    async fn record(
        &self,
        reminder: DueReminder,
        existing: Option<reminder_log::Model>,
        delivered: bool,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let (status, error_message, sent_at) = if delivered {
            (ReminderStatus::Sent, None, Some(now))
        } else {
            warn!(self.logger, "reminder not delivered";
                "kind" => %reminder.kind,
                "reference_id" => %reminder.reference_id,
                "to" => &reminder.message.to);
            (
                ReminderStatus::Failed,
                Some("Email delivery failed".to_string()),
                None,
            )
        };
        match existing {
            Some(log) => {
                let mut active: reminder_log::ActiveModel = log.into();
                active.status = Set(status);
                active.error_message = Set(error_message);
                if sent_at.is_some() {
                    active.sent_at = Set(sent_at);
                }
                active.update(&*self.db).await?;
            }
            None => {
                reminder_log::ActiveModel {
                    reminder_type: Set(reminder.kind),
                    reference_id: Set(reminder.reference_id),
                    recipient_email: Set(reminder.message.to),
                    status: Set(status),
                    error_message: Set(error_message),
                    sent_at: Set(sent_at),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?;
            }
        }
        Ok(())
    }

    async fn pending_manager_gates(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueReminder>, ServiceError> {
        let gates = manager_approval::Entity::find()
            .filter(manager_approval::Column::Status.eq(ApprovalStatus::Pending))
            .filter(manager_approval::Column::CreatedAt.lte(cutoff))
            .order_by_asc(manager_approval::Column::CreatedAt)
            .find_also_related(supplier_initiation::Entity)
            .all(&*self.db)
            .await?;
        let approvers = users_by_id(&self.db, gates.iter().map(|(g, _)| g.approver_id)).await?;
        let url = self.email.approvals_link();

        Ok(gates
            .into_iter()
            .filter_map(|(gate, initiation)| {
                let initiation = initiation?;
                let approver = approvers.get(&gate.approver_id)?;
                Some(DueReminder {
                    kind: ReminderType::ManagerApprovalPending,
                    reference_id: gate.id,
                    waiting_since: gate.created_at,
                    message: templates::approval_reminder(
                        ApprovalStage::Manager,
                        &approver.email,
                        &initiation,
                        &url,
                        waiting_hours(gate.created_at, now),
                    ),
                })
            })
            .collect())
    }

    async fn pending_procurement_gates(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueReminder>, ServiceError> {
        let gates = procurement_approval::Entity::find()
            .filter(procurement_approval::Column::Status.eq(ApprovalStatus::Pending))
            .filter(procurement_approval::Column::CreatedAt.lte(cutoff))
            .order_by_asc(procurement_approval::Column::CreatedAt)
            .find_also_related(supplier_initiation::Entity)
            .all(&*self.db)
            .await?;
        let approvers = users_by_id(&self.db, gates.iter().map(|(g, _)| g.approver_id)).await?;
        let url = self.email.approvals_link();

        Ok(gates
            .into_iter()
            .filter_map(|(gate, initiation)| {
                let initiation = initiation?;
                let approver = approvers.get(&gate.approver_id)?;
                Some(DueReminder {
                    kind: ReminderType::ProcurementApprovalPending,
                    reference_id: gate.id,
                    waiting_since: gate.created_at,
                    message: templates::approval_reminder(
                        ApprovalStage::Procurement,
                        &approver.email,
                        &initiation,
                        &url,
                        waiting_hours(gate.created_at, now),
                    ),
                })
            })
            .collect())
    }

    /// Invitations sent before the cutoff with no supplier form yet.
    async fn unanswered_invitations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DueReminder>, ServiceError> {
        let onboardings = supplier_onboarding::Entity::find()
            .filter(supplier_onboarding::Column::EmailSent.eq(true))
            .filter(supplier_onboarding::Column::SupplierFormSubmitted.eq(false))
            .filter(
                supplier_onboarding::Column::OverallStatus
                    .is_in([OverallStatus::EmailSent, OverallStatus::AwaitingResponse]),
            )
            .filter(supplier_onboarding::Column::EmailSentAt.lte(cutoff))
            .find_also_related(supplier::Entity)
            .all(&*self.db)
            .await?;

        Ok(onboardings
            .into_iter()
            .filter_map(|(onboarding, supplier)| {
                let supplier = supplier?;
                let waiting_since = onboarding.email_sent_at?;
                let link = self.email.onboarding_link(&onboarding.onboarding_token);
                Some(DueReminder {
                    kind: ReminderType::SupplierDocumentSubmission,
                    reference_id: onboarding.id,
                    waiting_since,
                    message: templates::document_submission_reminder(&supplier, &link),
                })
            })
            .collect())
    }

    async fn open_revisions(&self, cutoff: DateTime<Utc>) -> Result<Vec<DueReminder>, ServiceError> {
        let onboardings = supplier_onboarding::Entity::find()
            .filter(supplier_onboarding::Column::RevisionRequested.eq(true))
            .filter(supplier_onboarding::Column::RevisionRequestedAt.lte(cutoff))
            .find_also_related(supplier::Entity)
            .all(&*self.db)
            .await?;

        Ok(onboardings
            .into_iter()
            .filter_map(|(onboarding, supplier)| {
                let supplier = supplier?;
                let waiting_since = onboarding.revision_requested_at?;
                let link = self.email.onboarding_link(&onboarding.onboarding_token);
                Some(DueReminder {
                    kind: ReminderType::SupplierRevisionPending,
                    reference_id: onboarding.id,
                    waiting_since,
                    message: templates::revision_reminder(
                        &supplier,
                        &onboarding.documents_to_revise.0,
                        &link,
                    ),
                })
            })
            .collect())
    }

    /// Submitted suppliers still under review, one reminder per procurement
    /// recipient.
    async fn unreviewed_submissions(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueReminder>, ServiceError> {
        let suppliers = supplier::Entity::find()
            .filter(
                supplier::Column::Status
                    .is_in([SupplierStatus::UnderReview, SupplierStatus::AwaitingFinalApproval]),
            )
            .find_also_related(supplier_onboarding::Entity)
            .all(&*self.db)
            .await?;
        let waiting: Vec<_> = suppliers
            .into_iter()
            .filter_map(|(supplier, onboarding)| {
                let onboarding = onboarding?;
                if !onboarding.supplier_form_submitted || onboarding.revision_requested {
                    return None;
                }
                let since = onboarding.supplier_form_submitted_at.filter(|at| *at <= cutoff)?;
                Some((supplier, since))
            })
            .collect();
        if waiting.is_empty() {
            return Ok(Vec::new());
        }

        let recipients = procurement_recipients(&*self.db).await?;
        let mut due = Vec::new();
        for (supplier, since) in waiting {
            let url = self.email.review_link(supplier.id);
            for recipient in &recipients {
                due.push(DueReminder {
                    kind: ReminderType::PmReviewPending,
                    reference_id: supplier.id,
                    waiting_since: since,
                    message: templates::review_reminder(
                        &recipient.email,
                        &supplier,
                        &url,
                        waiting_hours(since, now),
                    ),
                });
            }
        }
        Ok(due)
    }
}
