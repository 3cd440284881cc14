use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::SupplierStatus;
use crate::models::{AirtableData, SupplierProfile};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "suppliers")]
#[schema(as = Supplier)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub supplier_code: String,
    pub company_name: String,
    pub contact_person: String,
    #[sea_orm(unique)]
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub registration_number: Option<String>,
    pub vat_number: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub profile: SupplierProfile,
    pub status: SupplierStatus,
    #[sea_orm(column_type = "Json")]
    pub airtable_data: AirtableData,
    pub created_by_id: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by_id: Option<Uuid>,
    #[sea_orm(column_type = "Text", nullable)]
    pub rejection_reason: Option<String>,
    pub credit_controller: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::supplier_onboarding::Entity")]
    Onboarding,
    #[sea_orm(has_many = "super::ai_analysis_job::Entity")]
    AiAnalysisJobs,
}

impl Related<super::supplier_onboarding::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Onboarding.def()
    }
}

impl Related<super::ai_analysis_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AiAnalysisJobs.def()
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
