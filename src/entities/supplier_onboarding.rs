use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{FromJsonQueryResult, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::{ApprovalStatus, OnboardingStep, OverallStatus};
use crate::models::DocumentCategory;

#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
pub struct DocumentsToRevise(pub Vec<DocumentCategory>);

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "supplier_onboardings")]
#[schema(as = SupplierOnboarding)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub supplier_id: Uuid,
    #[sea_orm(unique)]
    pub initiation_id: Option<Uuid>,
    #[sea_orm(unique)]
    pub onboarding_token: String,
    pub current_step: OnboardingStep,
    pub overall_status: OverallStatus,
    pub approval_status: ApprovalStatus,
    pub revision_count: i32,
    pub revision_requested: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub revision_notes: Option<String>,
    pub revision_requested_at: Option<DateTime<Utc>>,
    #[sea_orm(column_type = "Json")]
    pub documents_to_revise: DocumentsToRevise,
    pub supplier_form_submitted: bool,
    pub supplier_form_submitted_at: Option<DateTime<Utc>>,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Version number the next supplier submission is stored under.
    pub fn next_submission_version(&self) -> u32 {
        if self.revision_count > 0 {
            self.revision_count as u32 + 1
        } else {
            1
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::supplier::Entity",
        from = "Column::SupplierId",
        to = "super::supplier::Column::Id",
        on_delete = "Cascade"
    )]
    Supplier,
    #[sea_orm(
        belongs_to = "super::supplier_initiation::Entity",
        from = "Column::InitiationId",
        to = "super::supplier_initiation::Column::Id",
        on_delete = "SetNull"
    )]
    Initiation,
    #[sea_orm(has_many = "super::onboarding_timeline::Entity")]
    Timeline,
}

impl Related<super::supplier::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Supplier.def()
    }
}

impl Related<super::supplier_initiation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Initiation.def()
    }
}

impl Related<super::onboarding_timeline::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Timeline.def()
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
        } else {
            model.updated_at = Set(Some(Utc::now()));
        }
        Ok(model)
    }
}
