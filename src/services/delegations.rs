use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use slog::{info, Logger};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::db::DbPool;
use crate::entities::enums::DelegationType;
use crate::entities::{user, user_delegation};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::approval_authorization::ApprovalStage;

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDelegationRequest {
    pub delegate_id: Uuid,
    pub delegation_type: DelegationType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Delegations the caller granted and the ones granted to them.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DelegationOverview {
    pub granted: Vec<user_delegation::Model>,
    pub received: Vec<user_delegation::Model>,
}

/// Delegations currently in force for `delegate_id`, of any type.
pub async fn effective_for_delegate<C: ConnectionTrait>(
    db: &C,
    delegate_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<user_delegation::Model>, ServiceError> {
    Ok(user_delegation::Entity::find()
        .filter(user_delegation::Column::DelegateId.eq(delegate_id))
        .filter(user_delegation::Column::IsActive.eq(true))
        .filter(user_delegation::Column::StartDate.lte(now))
        .filter(user_delegation::Column::EndDate.gte(now))
        .all(db)
        .await?)
}

/// Users currently acting for `delegator_id` at the given stage.
pub async fn active_delegates<C: ConnectionTrait>(
    db: &C,
    delegator_id: Uuid,
    stage: ApprovalStage,
    now: DateTime<Utc>,
) -> Result<Vec<user::Model>, ServiceError> {
    let stage_type = match stage {
        ApprovalStage::Manager => DelegationType::ManagerApprovals,
        ApprovalStage::Procurement => DelegationType::ProcurementApprovals,
    };
    let delegations = user_delegation::Entity::find()
        .filter(user_delegation::Column::DelegatorId.eq(delegator_id))
        .filter(user_delegation::Column::IsActive.eq(true))
        .filter(user_delegation::Column::StartDate.lte(now))
        .filter(user_delegation::Column::EndDate.gte(now))
        .filter(
            Condition::any()
                .add(user_delegation::Column::DelegationType.eq(stage_type))
                .add(user_delegation::Column::DelegationType.eq(DelegationType::AllApprovals)),
        )
        .all(db)
        .await?;
    if delegations.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = delegations.iter().map(|d| d.delegate_id).collect();
    Ok(user::Entity::find()
        .filter(user::Column::Id.is_in(ids))
        .filter(user::Column::IsActive.eq(true))
        .all(db)
        .await?)
}

#[derive(Clone)]
pub struct DelegationService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    logger: Logger,
}

impl DelegationService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, logger: Logger) -> Self {
        Self {
            db,
            event_sender,
            logger,
        }
    }

    #[instrument(skip(self, actor), fields(delegator_id = %actor.user_id))]
    pub async fn create(
        &self,
        actor: &AuthUser,
        request: CreateDelegationRequest,
    ) -> Result<user_delegation::Model, ServiceError> {
        request.validate()?;
        if request.delegate_id == actor.user_id {
            return Err(ServiceError::BadRequest(
                "You cannot delegate approvals to yourself".to_string(),
            ));
        }
        if request.end_date <= request.start_date {
            return Err(ServiceError::BadRequest(
                "End date must be after start date".to_string(),
            ));
        }

        let db = &*self.db;
        let delegate = user::Entity::find_by_id(request.delegate_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Delegate user not found".to_string()))?;
        if !delegate.is_active {
            return Err(ServiceError::BadRequest(
                "Delegate user is not active".to_string(),
            ));
        }

        let delegation = user_delegation::ActiveModel {
            delegator_id: Set(actor.user_id),
            delegate_id: Set(delegate.id),
            delegation_type: Set(request.delegation_type),
            start_date: Set(request.start_date),
            end_date: Set(request.end_date),
            is_active: Set(true),
            reason: Set(request.reason.filter(|r| !r.trim().is_empty())),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(self.logger, "delegation created";
            "delegation_id" => %delegation.id,
            "delegator_id" => %actor.user_id,
            "delegate_id" => %delegate.id,
            "type" => %delegation.delegation_type);
        self.event_sender
            .send_or_log(Event::DelegationCreated(delegation.id))
            .await;
        Ok(delegation)
    }

    /// Lists the caller's delegations. Entries whose window has closed are
    /// switched off on the way out.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn list(&self, actor: &AuthUser) -> Result<DelegationOverview, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();

        let expired = user_delegation::Entity::update_many()
            .col_expr(
                user_delegation::Column::IsActive,
                sea_orm::sea_query::Expr::value(false),
            )
            .col_expr(
                user_delegation::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(Some(now)),
            )
            .filter(user_delegation::Column::IsActive.eq(true))
            .filter(user_delegation::Column::EndDate.lt(now))
            .filter(
                Condition::any()
                    .add(user_delegation::Column::DelegatorId.eq(actor.user_id))
                    .add(user_delegation::Column::DelegateId.eq(actor.user_id)),
            )
            .exec(db)
            .await?;
        if expired.rows_affected > 0 {
            info!(self.logger, "expired delegations deactivated";
                "user_id" => %actor.user_id, "count" => expired.rows_affected);
        }

        let granted = user_delegation::Entity::find()
            .filter(user_delegation::Column::DelegatorId.eq(actor.user_id))
            .order_by_desc(user_delegation::Column::CreatedAt)
            .all(db)
            .await?;
        let received = user_delegation::Entity::find()
            .filter(user_delegation::Column::DelegateId.eq(actor.user_id))
            .order_by_desc(user_delegation::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(DelegationOverview { granted, received })
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn revoke(
        &self,
        actor: &AuthUser,
        delegation_id: Uuid,
    ) -> Result<user_delegation::Model, ServiceError> {
        let db = &*self.db;
        let delegation = user_delegation::Entity::find_by_id(delegation_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Delegation not found".to_string()))?;
        if delegation.delegator_id != actor.user_id && !actor.is_admin() {
            return Err(ServiceError::Forbidden(
                "Only the delegator or an administrator can revoke this delegation".to_string(),
            ));
        }

        let mut active: user_delegation::ActiveModel = delegation.into();
        active.is_active = Set(false);
        let revoked = active.update(db).await?;

        info!(self.logger, "delegation revoked";
            "delegation_id" => %revoked.id, "revoked_by" => %actor.user_id);
        self.event_sender
            .send_or_log(Event::DelegationRevoked(revoked.id))
            .await;
        Ok(revoked)
    }
}
