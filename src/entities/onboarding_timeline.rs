use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::OnboardingStep;

/// Immutable audit entry on an onboarding. Rows are inserted, never updated.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "onboarding_timeline")]
#[schema(as = OnboardingTimelineEntry)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub onboarding_id: Uuid,
    pub step: OnboardingStep,
    pub status: String,
    pub action: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub performed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::supplier_onboarding::Entity",
        from = "Column::OnboardingId",
        to = "super::supplier_onboarding::Column::Id",
        on_delete = "Cascade"
    )]
    Onboarding,
}

impl Related<super::supplier_onboarding::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Onboarding.def()
    }
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
        }
        Ok(model)
    }
}
