use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::DelegationType;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "user_delegations")]
#[schema(as = UserDelegation)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub delegator_id: Uuid,
    pub delegate_id: Uuid,
    pub delegation_type: DelegationType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Active flag set and `now` within the inclusive window.
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= now && now <= self.end_date
    }

    pub fn covers_manager_approvals(&self) -> bool {
        matches!(
            self.delegation_type,
            DelegationType::ManagerApprovals | DelegationType::AllApprovals
        )
    }

    pub fn covers_procurement_approvals(&self) -> bool {
        matches!(
            self.delegation_type,
            DelegationType::ProcurementApprovals | DelegationType::AllApprovals
        )
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::DelegatorId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Delegator,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::DelegateId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Delegate,
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr> {
        let mut model = self;
        if insert {
            if model.id.is_not_set() {
                model.id = Set(Uuid::new_v4());
            }
            if model.created_at.is_not_set() {
                model.created_at = Set(Utc::now());
            }
        } else {
            model.updated_at = Set(Some(Utc::now()));
        }
        Ok(model)
    }
}
