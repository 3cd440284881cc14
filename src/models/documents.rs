//! Document categories and the append-only version history kept on each supplier.

use chrono::{DateTime, Utc};
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use utoipa::ToSchema;

/// Closed set of document categories a supplier can upload.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum DocumentCategory {
    CompanyRegistration,
    Cm29Directors,
    ShareholderCerts,
    ProofOfShareholding,
    BbbeeAccreditation,
    BbbeeScorecard,
    TaxClearance,
    VatCertificate,
    BankConfirmation,
    Nda,
    HealthSafety,
    CreditApplication,
    QualityCert,
    GoodStanding,
    SectorRegistrations,
    Organogram,
    CompanyProfile,
}

impl DocumentCategory {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentCategory::CompanyRegistration => "Company Registration Documents",
            DocumentCategory::Cm29Directors => "CM29 - List of Directors",
            DocumentCategory::ShareholderCerts => "Shareholder Certificates",
            DocumentCategory::ProofOfShareholding => "Proof of Shareholding",
            DocumentCategory::BbbeeAccreditation => "B-BBEE Certificate",
            DocumentCategory::BbbeeScorecard => "B-BBEE Scorecard Report",
            DocumentCategory::TaxClearance => "Tax Clearance Certificate",
            DocumentCategory::VatCertificate => "VAT Registration Certificate",
            DocumentCategory::BankConfirmation => "Bank Confirmation Letter",
            DocumentCategory::Nda => "Non-Disclosure Agreement (NDA)",
            DocumentCategory::HealthSafety => "Health and Safety Policy",
            DocumentCategory::CreditApplication => "Credit Application Form",
            DocumentCategory::QualityCert => "Quality Certification",
            DocumentCategory::GoodStanding => "Letter of Good Standing",
            DocumentCategory::SectorRegistrations => "Sector Registrations",
            DocumentCategory::Organogram => "Updated Company Organogram",
            DocumentCategory::CompanyProfile => "Company Profile",
        }
    }
}

/// One submission's worth of files, keyed by category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub version: u32,
    pub uploaded_files: BTreeMap<DocumentCategory, Vec<String>>,
    pub date: DateTime<Utc>,
}

impl VersionEntry {
    pub fn categories(&self) -> impl Iterator<Item = DocumentCategory> + '_ {
        self.uploaded_files
            .iter()
            .filter(|(_, files)| !files.is_empty())
            .map(|(category, _)| *category)
    }

    pub fn file_count(&self) -> usize {
        self.uploaded_files.values().map(Vec::len).sum()
    }
}

/// Document history stored on a supplier. Entries are only ever appended.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct AirtableData {
    #[serde(default)]
    all_versions: Vec<VersionEntry>,
}

impl AirtableData {
    pub fn all_versions(&self) -> &[VersionEntry] {
        &self.all_versions
    }

    pub fn append(&mut self, entry: VersionEntry) {
        self.all_versions.push(entry);
    }

    pub fn latest(&self) -> Option<&VersionEntry> {
        self.all_versions.last()
    }

    pub fn is_empty(&self) -> bool {
        self.all_versions.is_empty()
    }

    /// Every category uploaded in any version.
    pub fn union_of_categories(&self) -> BTreeSet<DocumentCategory> {
        self.all_versions
            .iter()
            .flat_map(VersionEntry::categories)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponsiblePerson {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Company, banking and contact details captured by the supplier form.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
#[serde(rename_all = "camelCase", default)]
pub struct SupplierProfile {
    pub trading_name: Option<String>,
    pub physical_address: Option<String>,
    pub postal_address: Option<String>,
    pub associated_company: Option<String>,
    pub associated_company_registration_no: Option<String>,
    pub associated_company_branch_name: Option<String>,
    pub branches_contact_numbers: Option<String>,
    pub nature_of_business: Option<String>,
    pub products_and_services: Option<String>,
    pub bbbee_status: Option<String>,
    pub number_of_employees: Option<u32>,
    pub bank_account_name: Option<String>,
    pub bank_name: Option<String>,
    pub branch_name: Option<String>,
    pub branch_number: Option<String>,
    pub account_number: Option<String>,
    pub type_of_account: Option<String>,
    pub rp_banking: ResponsiblePerson,
    pub rp_quality: ResponsiblePerson,
    pub rp_she: ResponsiblePerson,
    pub rp_bbbee: ResponsiblePerson,
    pub quality_management_cert: bool,
    pub she_certification: bool,
    pub authorization_agreement: bool,
}
