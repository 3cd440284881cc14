//! Domain value types shared across services that are not tables of their own.

pub mod annual_value;
pub mod documents;

pub use annual_value::{AnnualPurchaseValue, AnnualValueBucket};
pub use documents::{AirtableData, DocumentCategory, ResponsiblePerson, SupplierProfile, VersionEntry};
