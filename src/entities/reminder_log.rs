use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::{ReminderStatus, ReminderType};

/// Delivery record for one overdue-item reminder. `reference_id` points at
/// the approval, onboarding or supplier the reminder is about.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "reminder_logs")]
#[schema(as = ReminderLog)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub reminder_type: ReminderType,
    pub reference_id: Uuid,
    pub recipient_email: String,
    pub status: ReminderStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr> {
        let mut model = self;
        let now = Utc::now();
        if insert {
            if model.id.is_not_set() {
                model.id = Set(Uuid::new_v4());
            }
            if model.created_at.is_not_set() {
                model.created_at = Set(now);
            }
        } else {
            model.updated_at = Set(Some(now));
        }
        Ok(model)
    }
}
