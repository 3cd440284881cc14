//! Per-document results and the supplier-level compliance and risk scores
//! derived from them. Nothing in here touches storage or the network.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use utoipa::ToSchema;

use crate::entities::enums::PurchaseType;
use crate::models::{DocumentCategory, SupplierProfile};
use crate::services::ai_backend::ProcessedDocument;
use crate::services::document_requirements::{
    mandatory_documents, missing_mandatory, optional_documents,
};

const MISMATCH_MARKERS: &[&str] = &["DOCUMENT TYPE MISMATCH DETECTED", "MISMATCH DETECTED"];

pub const BASIC_CHECK_CONFIDENCE: f64 = 75.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Analyzed,
    BasicCheck,
}

/// Outcome for a single uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResult {
    pub file_name: String,
    pub status: ResultStatus,
    pub confidence: f64,
    pub findings: String,
    pub compliance_status: String,
    pub risk_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub extracted_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_mode: Option<String>,
    #[serde(default)]
    pub document_type_mismatch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type_detected: Option<String>,
}

impl DocumentResult {
    pub fn analyzed<R: Rng + ?Sized>(
        file_name: &str,
        processed: &ProcessedDocument,
        rng: &mut R,
    ) -> Self {
        let findings = processed
            .analysis_results
            .clone()
            .unwrap_or_else(|| "Document analyzed successfully".to_string());
        let mismatch = detect_mismatch(&findings, processed.document_type_mismatch);
        let ai_mode = match &processed.ai_processing {
            Some(Value::String(mode)) => mode.clone(),
            _ => "ollama".to_string(),
        };
        Self {
            file_name: file_name.to_string(),
            status: ResultStatus::Analyzed,
            confidence: confidence(mismatch, rng),
            findings,
            compliance_status: processed
                .compliance_results
                .clone()
                .unwrap_or_else(|| "Compliant".to_string()),
            risk_level: processed
                .risk_assessment
                .clone()
                .unwrap_or_else(|| "Low Risk".to_string()),
            extracted_data: Some(
                processed
                    .extracted_data
                    .clone()
                    .unwrap_or_else(|| Value::Object(Default::default())),
            ),
            ai_mode: Some(ai_mode),
            document_type_mismatch: mismatch,
            document_type_detected: processed.document_type_detected.clone(),
        }
    }

    /// Result recorded when the backend could not analyse the file.
    pub fn basic_check(file_name: &str, reason: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            status: ResultStatus::BasicCheck,
            confidence: BASIC_CHECK_CONFIDENCE,
            findings: format!(
                "Document received and validated (AI analysis unavailable: {})",
                reason
            ),
            compliance_status: "Pending manual review".to_string(),
            risk_level: "To be determined".to_string(),
            extracted_data: None,
            ai_mode: None,
            document_type_mismatch: false,
            document_type_detected: None,
        }
    }

    /// "Expected: X, Actual: Y" when the findings spell out the mismatch.
    pub fn mismatch_summary(&self) -> Option<String> {
        let grab = |label: &str| {
            self.findings.lines().find_map(|line| {
                line.find(label)
                    .map(|at| line[at + label.len()..].trim().to_string())
            })
        };
        match (grab("Expected:"), grab("Actual:")) {
            (Some(expected), Some(actual)) => {
                Some(format!("Expected: {}, Actual: {}", expected, actual))
            }
            _ => None,
        }
    }
}

pub fn detect_mismatch(findings: &str, flagged_by_backend: bool) -> bool {
    flagged_by_backend
        || MISMATCH_MARKERS.iter().any(|m| findings.contains(m))
        || (findings.contains("Expected:") && findings.contains("Actual:"))
}

/// 85-100 for a document that is what it claims to be, 20-35 otherwise.
pub fn confidence<R: Rng + ?Sized>(mismatch: bool, rng: &mut R) -> f64 {
    let base = if mismatch { 20.0 } else { 85.0 };
    base + rng.gen::<f64>() * 15.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedMissing {
    pub doc: DocumentCategory,
    pub cert_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceCheck {
    pub required_documents: usize,
    pub provided_documents: usize,
    pub missing_documents: Vec<DocumentCategory>,
    pub claimed_but_missing: Vec<ClaimedMissing>,
    pub compliance_score: f64,
    pub average_document_quality: f64,
    pub total_documents_analyzed: usize,
    pub optional_documents: Vec<DocumentCategory>,
    pub optional_docs_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompanyVerification {
    Verified,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceHistory {
    NoIssues,
    IssuesFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub document_completeness: RiskLevel,
    pub document_quality: RiskLevel,
    pub company_verification: CompanyVerification,
    pub compliance_history: ComplianceHistory,
}

impl RiskAssessment {
    pub fn penalty(&self) -> f64 {
        let completeness = match self.document_completeness {
            RiskLevel::High => 15.0,
            RiskLevel::Medium => 8.0,
            RiskLevel::Low => 0.0,
        };
        let quality = match self.document_quality {
            RiskLevel::High => 10.0,
            RiskLevel::Medium => 5.0,
            RiskLevel::Low => 0.0,
        };
        let verification = match self.company_verification {
            CompanyVerification::Pending => 5.0,
            CompanyVerification::Verified => 0.0,
        };
        let history = match self.compliance_history {
            ComplianceHistory::IssuesFound => 10.0,
            ComplianceHistory::NoIssues => 0.0,
        };
        completeness + quality + verification + history
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RiskFindings {
    pub high: Vec<String>,
    pub medium: Vec<String>,
}

pub type DocumentAnalysis = BTreeMap<DocumentCategory, Vec<DocumentResult>>;

/// Stored as the job's `results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResults {
    pub document_analysis: DocumentAnalysis,
    pub compliance_check: ComplianceCheck,
    pub risk_assessment: RiskAssessment,
    pub risk_findings: RiskFindings,
    pub overall_score: f64,
    pub insights: Vec<String>,
}

/// What the supplier declared and uploaded, across every version.
#[derive(Debug, Clone, Copy)]
pub struct SupplierFacts<'a> {
    pub purchase_type: PurchaseType,
    pub credit_application: bool,
    pub uploaded: &'a BTreeSet<DocumentCategory>,
    pub profile: &'a SupplierProfile,
    pub registration_number: Option<&'a str>,
}

fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

pub fn claimed_but_missing(
    profile: &SupplierProfile,
    uploaded: &BTreeSet<DocumentCategory>,
) -> Vec<ClaimedMissing> {
    let mut claimed = Vec::new();
    if profile.quality_management_cert && !uploaded.contains(&DocumentCategory::QualityCert) {
        claimed.push(ClaimedMissing {
            doc: DocumentCategory::QualityCert,
            cert_name: "Quality Management Certification".to_string(),
        });
    }
    if profile.she_certification && !uploaded.contains(&DocumentCategory::HealthSafety) {
        claimed.push(ClaimedMissing {
            doc: DocumentCategory::HealthSafety,
            cert_name: "Safety, Health and Environment (SHE) Certification".to_string(),
        });
    }
    claimed
}

/// Mean confidence over documents the backend actually analysed.
pub fn average_quality(analysis: &DocumentAnalysis) -> (f64, usize) {
    let scores: Vec<f64> = analysis
        .values()
        .flatten()
        .filter(|r| r.status == ResultStatus::Analyzed && r.confidence > 0.0)
        .map(|r| r.confidence)
        .collect();
    if scores.is_empty() {
        (0.0, 0)
    } else {
        (scores.iter().sum::<f64>() / scores.len() as f64, scores.len())
    }
}

pub fn compliance_check(facts: &SupplierFacts<'_>, analysis: &DocumentAnalysis) -> ComplianceCheck {
    let required = mandatory_documents(facts.purchase_type, facts.credit_application).len();
    let missing = missing_mandatory(facts.purchase_type, facts.credit_application, facts.uploaded);
    let provided = required - missing.len();
    let (average, analysed) = average_quality(analysis);

    let base = if required == 0 {
        100.0
    } else {
        provided as f64 / required as f64 * 100.0
    };
    let optional: Vec<DocumentCategory> =
        optional_documents(facts.purchase_type, facts.credit_application)
            .into_iter()
            .filter(|c| facts.uploaded.contains(c))
            .collect();

    ComplianceCheck {
        required_documents: required,
        provided_documents: provided,
        missing_documents: missing,
        claimed_but_missing: claimed_but_missing(facts.profile, facts.uploaded),
        compliance_score: clamp_score(base + (average - 80.0) * 0.1),
        average_document_quality: average,
        total_documents_analyzed: analysed,
        optional_docs_count: optional.len(),
        optional_documents: optional,
    }
}

pub fn risk_findings(analysis: &DocumentAnalysis) -> RiskFindings {
    let mut findings = RiskFindings::default();
    for (category, results) in analysis {
        for result in results {
            let level = result.risk_level.to_lowercase();
            let line = format!("{}: {}", category, result.findings);
            if level.contains("high") {
                findings.high.push(line);
            } else if level.contains("medium") {
                findings.medium.push(line);
            }
        }
    }
    findings
}

pub fn risk_assessment(
    check: &ComplianceCheck,
    findings: &RiskFindings,
    registration_number: Option<&str>,
) -> RiskAssessment {
    let missing = check.missing_documents.len();
    let total_missing = missing + check.claimed_but_missing.len();

    let document_completeness = if missing >= 3 || !findings.high.is_empty() {
        RiskLevel::High
    } else if total_missing > 0 || !findings.medium.is_empty() {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    let document_quality = if check.average_document_quality < 75.0 {
        RiskLevel::High
    } else if check.average_document_quality < 85.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    let verified = registration_number.is_some_and(|r| !r.trim().is_empty());

    RiskAssessment {
        document_completeness,
        document_quality,
        company_verification: if verified {
            CompanyVerification::Verified
        } else {
            CompanyVerification::Pending
        },
        compliance_history: if findings.high.is_empty() {
            ComplianceHistory::NoIssues
        } else {
            ComplianceHistory::IssuesFound
        },
    }
}

pub fn overall_score(check: &ComplianceCheck, risk: &RiskAssessment) -> f64 {
    let claimed_penalty = 2.0 * check.claimed_but_missing.len() as f64;
    clamp_score(check.compliance_score - risk.penalty() - claimed_penalty)
}

pub fn insights(overall: f64, check: &ComplianceCheck, has_nda: bool) -> Vec<String> {
    const NDA_CHECK: &str = "MANUAL CHECK REQUIRED: Verify NDA is signed and initialed on all pages";
    let mut out = Vec::new();
    if overall >= 80.0 {
        out.push("Supplier demonstrates strong compliance and documentation quality".to_string());
        out.push("All critical requirements met".to_string());
        if has_nda {
            out.push(NDA_CHECK.to_string());
        }
        out.push("Recommended for approval after NDA verification".to_string());
    } else if overall >= 60.0 {
        out.push("Supplier meets basic requirements with some concerns".to_string());
        if !check.missing_documents.is_empty() {
            let names: Vec<String> = check
                .missing_documents
                .iter()
                .map(ToString::to_string)
                .collect();
            out.push(format!("Request missing documents: {}", names.join(", ")));
        }
        if check.average_document_quality < 85.0 {
            out.push("Consider requesting higher quality document scans".to_string());
        }
        if has_nda {
            out.push(NDA_CHECK.to_string());
        }
        out.push("Recommend revision before approval".to_string());
    } else {
        out.push("Significant compliance gaps identified".to_string());
        out.push("Multiple required documents missing or inadequate".to_string());
        if has_nda {
            out.push(NDA_CHECK.to_string());
        }
        out.push("Not recommended for approval - revision required".to_string());
    }
    if has_nda {
        out.push(
            "Remember: AI cannot verify handwritten signatures - manual review essential for NDA"
                .to_string(),
        );
    }
    out
}

/// Scores the analysed documents against everything the supplier has uploaded.
pub fn score(facts: &SupplierFacts<'_>, document_analysis: DocumentAnalysis) -> AnalysisResults {
    let check = compliance_check(facts, &document_analysis);
    let findings = risk_findings(&document_analysis);
    let risk = risk_assessment(&check, &findings, facts.registration_number);
    let overall = overall_score(&check, &risk);
    let insights = insights(
        overall,
        &check,
        facts.uploaded.contains(&DocumentCategory::Nda),
    );
    AnalysisResults {
        document_analysis,
        compliance_check: check,
        risk_assessment: risk,
        risk_findings: findings,
        overall_score: overall,
        insights,
    }
}
