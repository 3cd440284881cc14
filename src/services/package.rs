//! Approval package rendering. Layout is the generator's concern; the
//! workflow only hands over a snapshot and stores the bytes it gets back.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

use crate::entities::{supplier, supplier_initiation};
use crate::errors::ServiceError;
use crate::models::DocumentCategory;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDocument {
    pub category: DocumentCategory,
    pub version: u32,
    pub file_name: String,
}

/// Everything the approval package shows, captured at approval time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSnapshot {
    pub supplier: supplier::Model,
    pub initiation: Option<supplier_initiation::Model>,
    pub documents: Vec<PackageDocument>,
    pub credit_controller: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl PackageSnapshot {
    /// Latest file per category across all submitted versions.
    pub fn latest_documents(supplier: &supplier::Model) -> Vec<PackageDocument> {
        let mut documents = Vec::new();
        for version in supplier.airtable_data.all_versions().iter().rev() {
            for (category, files) in &version.uploaded_files {
                if documents
                    .iter()
                    .any(|d: &PackageDocument| d.category == *category)
                {
                    continue;
                }
                documents.extend(files.iter().map(|name| PackageDocument {
                    category: *category,
                    version: version.version,
                    file_name: name.clone(),
                }));
            }
        }
        documents.sort_by(|a, b| a.category.cmp(&b.category));
        documents
    }
}

pub struct RenderedPackage {
    pub file_name: String,
    pub bytes: Bytes,
}

pub trait PackageGenerator: Send + Sync {
    fn render(&self, snapshot: &PackageSnapshot) -> Result<RenderedPackage, ServiceError>;
}

/// Plain-text approval summary.
#[derive(Debug, Default, Clone)]
pub struct SummaryPackageGenerator;

impl PackageGenerator for SummaryPackageGenerator {
    fn render(&self, snapshot: &PackageSnapshot) -> Result<RenderedPackage, ServiceError> {
        let supplier = &snapshot.supplier;
        let mut out = String::new();
        let fmt_err = |e: std::fmt::Error| ServiceError::InternalError(e.to_string());

        writeln!(out, "SUPPLIER APPROVAL PACKAGE").map_err(fmt_err)?;
        writeln!(out, "Generated: {}", snapshot.generated_at.to_rfc3339()).map_err(fmt_err)?;
        writeln!(out).map_err(fmt_err)?;
        writeln!(out, "Supplier code: {}", supplier.supplier_code).map_err(fmt_err)?;
        writeln!(out, "Company: {}", supplier.company_name).map_err(fmt_err)?;
        writeln!(out, "Contact: {} <{}>", supplier.contact_person, supplier.contact_email)
            .map_err(fmt_err)?;
        if let Some(reg) = &supplier.registration_number {
            writeln!(out, "Registration number: {}", reg).map_err(fmt_err)?;
        }
        if let Some(controller) = &snapshot.credit_controller {
            writeln!(out, "Credit controller: {}", controller).map_err(fmt_err)?;
        }

        if let Some(initiation) = &snapshot.initiation {
            writeln!(out).map_err(fmt_err)?;
            writeln!(out, "Requested by: {}", initiation.requester_name).map_err(fmt_err)?;
            writeln!(out, "Purchase type: {}", initiation.purchase_type.label()).map_err(fmt_err)?;
            writeln!(
                out,
                "Credit application: {}",
                if initiation.credit_application { "Yes" } else { "No" }
            )
            .map_err(fmt_err)?;
            writeln!(out, "Reason for onboarding: {}", initiation.onboarding_reason)
                .map_err(fmt_err)?;
        }

        writeln!(out).map_err(fmt_err)?;
        writeln!(out, "Documents:").map_err(fmt_err)?;
        for doc in &snapshot.documents {
            writeln!(
                out,
                "- {} (v{}): {}",
                doc.category.label(),
                doc.version,
                doc.file_name
            )
            .map_err(fmt_err)?;
        }

        Ok(RenderedPackage {
            file_name: format!("{}-approval-summary.txt", supplier.supplier_code),
            bytes: Bytes::from(out),
        })
    }
}
