use sea_orm::sea_query::{Expr, Func};
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::enums::InitiationStatus;
use crate::entities::{supplier, supplier_initiation};
use crate::errors::{ConflictDetails, ConflictKind, ServiceError};

fn normalized(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

fn lower_eq<C: ColumnTrait>(column: C, value: &str) -> sea_orm::sea_query::SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).eq(value)
}

/// Rejects a new or edited initiation that collides with an existing supplier or
/// with another initiation still moving through approval.
///
/// Matching is case-insensitive on supplier name and email. Blank values are
/// skipped so partially filled drafts are not blocked on empty strings.
#[instrument(skip(db))]
pub async fn check_initiation<C: ConnectionTrait>(
    db: &C,
    supplier_name: &str,
    supplier_email: &str,
    excluding_initiation: Option<Uuid>,
) -> Result<(), ServiceError> {
    let name = normalized(supplier_name);
    let email = normalized(supplier_email);
    if name.is_none() && email.is_none() {
        return Ok(());
    }

    let mut supplier_match = Condition::any();
    if let Some(name) = &name {
        supplier_match = supplier_match.add(lower_eq(supplier::Column::CompanyName, name));
    }
    if let Some(email) = &email {
        supplier_match = supplier_match.add(lower_eq(supplier::Column::ContactEmail, email));
    }

    if let Some(existing) = supplier::Entity::find()
        .filter(supplier_match)
        .one(db)
        .await?
    {
        debug!(supplier_id = %existing.id, "initiation collides with existing supplier");
        return Err(supplier_conflict(&existing, email.as_deref()));
    }

    let mut initiation_match = Condition::any();
    if let Some(name) = &name {
        initiation_match =
            initiation_match.add(lower_eq(supplier_initiation::Column::SupplierName, name));
    }
    if let Some(email) = &email {
        initiation_match =
            initiation_match.add(lower_eq(supplier_initiation::Column::SupplierEmail, email));
    }

    let mut query = supplier_initiation::Entity::find()
        .filter(initiation_match)
        .filter(
            supplier_initiation::Column::Status
                .is_not_in([InitiationStatus::Draft, InitiationStatus::Rejected]),
        );
    if let Some(id) = excluding_initiation {
        query = query.filter(supplier_initiation::Column::Id.ne(id));
    }

    if let Some(existing) = query.one(db).await? {
        debug!(initiation_id = %existing.id, "initiation collides with active initiation");
        return Err(ServiceError::DuplicateConflict(ConflictDetails {
            kind: ConflictKind::Initiation,
            reason: format!(
                "An onboarding request for \"{}\" is already in progress (status: {}). \
                 Please check with the requester before creating another.",
                existing.supplier_name, existing.status
            ),
            existing_id: existing.id,
            reference: existing.supplier_name.clone(),
            status: existing.status.to_string(),
        }));
    }

    Ok(())
}

/// Email-only check used for standalone supplier submissions without a token.
#[instrument(skip(db))]
pub async fn check_supplier_email<C: ConnectionTrait>(
    db: &C,
    email: &str,
) -> Result<(), ServiceError> {
    let Some(email) = normalized(email) else {
        return Ok(());
    };
    match supplier::Entity::find()
        .filter(lower_eq(supplier::Column::ContactEmail, &email))
        .one(db)
        .await?
    {
        Some(existing) => Err(ServiceError::DuplicateConflict(ConflictDetails {
            kind: ConflictKind::Supplier,
            reason: "A supplier with this email address already exists".to_string(),
            existing_id: existing.id,
            reference: existing.supplier_code.clone(),
            status: existing.status.to_string(),
        })),
        None => Ok(()),
    }
}

fn supplier_conflict(existing: &supplier::Model, email: Option<&str>) -> ServiceError {
    let by_email = email.is_some_and(|e| existing.contact_email.to_lowercase() == e);
    let field = if by_email { "email" } else { "name" };
    ServiceError::DuplicateConflict(ConflictDetails {
        kind: ConflictKind::Supplier,
        reason: format!(
            "A supplier with this {} already exists ({}, status: {})",
            field, existing.supplier_code, existing.status
        ),
        existing_id: existing.id,
        reference: existing.supplier_code.clone(),
        status: existing.status.to_string(),
    })
}
