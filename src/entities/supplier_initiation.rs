use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{FromJsonQueryResult, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::{BusinessUnit, InitiationStatus, PaymentMethod, PurchaseType};

/// Business units an initiation covers, stored as a JSON array.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
pub struct BusinessUnits(pub Vec<BusinessUnit>);

impl BusinessUnits {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "supplier_initiations")]
#[schema(as = SupplierInitiation)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub initiated_by_id: Uuid,
    pub requester_name: String,
    pub supplier_name: String,
    pub supplier_email: String,
    pub supplier_contact_person: String,
    #[sea_orm(column_type = "Json")]
    pub business_units: BusinessUnits,
    pub product_service_category: String,
    pub purchase_type: PurchaseType,
    pub payment_method: Option<PaymentMethod>,
    #[sea_orm(column_type = "Text", nullable)]
    pub cod_reason: Option<String>,
    pub annual_purchase_value: Option<Decimal>,
    pub credit_application: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub credit_application_reason: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub onboarding_reason: String,
    #[sea_orm(column_type = "Text")]
    pub relationship_declaration: String,
    pub process_read_understood: bool,
    pub due_diligence_completed: bool,
    pub status: InitiationStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::InitiatedById",
        to = "super::user::Column::Id",
        on_delete = "Restrict"
    )]
    InitiatedBy,
    #[sea_orm(has_one = "super::manager_approval::Entity")]
    ManagerApproval,
    #[sea_orm(has_one = "super::procurement_approval::Entity")]
    ProcurementApproval,
    #[sea_orm(has_one = "super::supplier_onboarding::Entity")]
    SupplierOnboarding,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InitiatedBy.def()
    }
}

impl Related<super::manager_approval::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ManagerApproval.def()
    }
}

impl Related<super::procurement_approval::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProcurementApproval.def()
    }
}

impl Related<super::supplier_onboarding::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SupplierOnboarding.def()
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
