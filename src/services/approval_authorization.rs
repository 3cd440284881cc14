/*!
 * # Approval Authorization
 *
 * Pure predicates deciding who may act on an approval gate. The initiator of a
 * request can never decide either of its gates; otherwise the directly
 * assigned approver, or a delegate holding an effective delegation of the
 * right type from that approver, may decide while the gate is PENDING.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::ManagerFallbackPolicy;
use crate::entities::enums::ApprovalStatus;
use crate::entities::{
    manager_approval, procurement_approval, supplier_initiation, user, user_delegation,
};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStage {
    Manager,
    Procurement,
}

impl ApprovalStage {
    pub fn label(&self) -> &'static str {
        match self {
            ApprovalStage::Manager => "manager",
            ApprovalStage::Procurement => "procurement",
        }
    }

    fn covered_by(&self, delegation: &user_delegation::Model) -> bool {
        match self {
            ApprovalStage::Manager => delegation.covers_manager_approvals(),
            ApprovalStage::Procurement => delegation.covers_procurement_approvals(),
        }
    }
}

/// The parts of an approval row the predicates look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
    pub id: Uuid,
    pub approver_id: Uuid,
    pub status: ApprovalStatus,
}

impl From<&manager_approval::Model> for Gate {
    fn from(m: &manager_approval::Model) -> Self {
        Self {
            id: m.id,
            approver_id: m.approver_id,
            status: m.status,
        }
    }
}

impl From<&procurement_approval::Model> for Gate {
    fn from(m: &procurement_approval::Model) -> Self {
        Self {
            id: m.id,
            approver_id: m.approver_id,
            status: m.status,
        }
    }
}

/// How a permitted user came to hold the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Assigned,
    Delegated { delegation_id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    SelfApproval,
    NoGate,
    NotPending(Uuid),
    NotAssigned,
}

impl Denial {
    pub fn into_service_error(self, stage: ApprovalStage) -> ServiceError {
        match self {
            Denial::SelfApproval => ServiceError::Forbidden(
                "You cannot approve your own supplier initiation".to_string(),
            ),
            Denial::NoGate => ServiceError::Forbidden(format!(
                "No {} approval is open for this initiation",
                stage.label()
            )),
            Denial::NotPending(id) => ServiceError::NotPending(id),
            Denial::NotAssigned => ServiceError::Forbidden(format!(
                "You are not authorized to make the {} decision for this initiation",
                stage.label()
            )),
        }
    }
}

/// Core check shared by both stages.
pub fn authorize(
    stage: ApprovalStage,
    initiated_by_id: Uuid,
    gate: Option<Gate>,
    user_id: Uuid,
    delegations: &[user_delegation::Model],
    now: DateTime<Utc>,
) -> Result<Authority, Denial> {
    if user_id == initiated_by_id {
        return Err(Denial::SelfApproval);
    }
    let gate = gate.ok_or(Denial::NoGate)?;
    if gate.status != ApprovalStatus::Pending {
        return Err(Denial::NotPending(gate.id));
    }
    if gate.approver_id == user_id {
        return Ok(Authority::Assigned);
    }

    delegations
        .iter()
        .find(|d| {
            d.delegate_id == user_id
                && d.delegator_id == gate.approver_id
                && stage.covered_by(d)
                && d.is_effective_at(now)
        })
        .map(|d| Authority::Delegated {
            delegation_id: d.id,
        })
        .ok_or(Denial::NotAssigned)
}

pub fn can_approve_as_manager(
    initiation: &supplier_initiation::Model,
    approval: Option<&manager_approval::Model>,
    user_id: Uuid,
    delegations: &[user_delegation::Model],
    now: DateTime<Utc>,
) -> bool {
    authorize(
        ApprovalStage::Manager,
        initiation.initiated_by_id,
        approval.map(Gate::from),
        user_id,
        delegations,
        now,
    )
    .is_ok()
}

pub fn can_approve_as_procurement(
    initiation: &supplier_initiation::Model,
    approval: Option<&procurement_approval::Model>,
    user_id: Uuid,
    delegations: &[user_delegation::Model],
    now: DateTime<Utc>,
) -> bool {
    authorize(
        ApprovalStage::Procurement,
        initiation.initiated_by_id,
        approval.map(Gate::from),
        user_id,
        delegations,
        now,
    )
    .is_ok()
}

/// Picks the manager-stage approver for an initiator.
///
/// `manager` is the initiator's configured manager row, `fallback` the first
/// active MANAGER in the system. The fallback is only used when the policy
/// allows it.
pub fn resolve_manager_approver(
    initiator: &user::Model,
    manager: Option<&user::Model>,
    fallback: Option<&user::Model>,
    policy: ManagerFallbackPolicy,
) -> Result<Uuid, ServiceError> {
    if let Some(manager) = manager.filter(|m| m.is_active && m.id != initiator.id) {
        return Ok(manager.id);
    }

    match policy {
        ManagerFallbackPolicy::Reject => Err(ServiceError::InvalidOperation(
            "No manager configured for this user. Please contact an administrator.".to_string(),
        )),
        ManagerFallbackPolicy::FirstActiveManager => fallback
            .filter(|m| m.is_active && m.id != initiator.id)
            .map(|m| {
                tracing::warn!(
                    initiator_id = %initiator.id,
                    fallback_manager_id = %m.id,
                    "initiator has no active manager; assigning fallback approver"
                );
                m.id
            })
            .ok_or_else(|| {
                ServiceError::InvalidOperation(
                    "No active manager available to approve this initiation".to_string(),
                )
            }),
    }
}
