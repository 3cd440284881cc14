//! Message bodies for workflow notifications.

use crate::entities::{supplier, supplier_initiation};
use crate::models::DocumentCategory;
use crate::services::approval_authorization::ApprovalStage;

use super::EmailMessage;

const SIGNATURE: &str = "Best regards,\nProcurement Team";

fn request_summary(initiation: &supplier_initiation::Model) -> String {
    let units = initiation
        .business_units
        .0
        .iter()
        .map(|u| u.label())
        .collect::<Vec<_>>()
        .join(", ");
    let mut lines = vec![
        format!("- Supplier: {}", initiation.supplier_name),
        format!("- Email: {}", initiation.supplier_email),
        format!("- Business Unit(s): {}", units),
        format!(
            "- Product/Service Category: {}",
            initiation.product_service_category
        ),
        format!("- Requested by: {}", initiation.requester_name),
        format!("- Purchase Type: {}", initiation.purchase_type.label()),
    ];
    if let Some(value) = initiation.annual_purchase_value {
        lines.push(format!("- Annual Purchase Value: R{}", value.round_dp(2)));
    }
    let credit = if initiation.credit_application {
        "Yes".to_string()
    } else {
        match &initiation.credit_application_reason {
            Some(reason) => format!("No (Reason: {})", reason),
            None => "No".to_string(),
        }
    };
    lines.push(format!("- Credit Application: {}", credit));
    format!(
        "{}\n\nReason for Onboarding:\n{}",
        lines.join("\n"),
        initiation.onboarding_reason
    )
}

/// Approval request to the assigned approver, or to a delegate acting for them.
pub fn approval_required(
    stage: ApprovalStage,
    to: &str,
    initiation: &supplier_initiation::Model,
    approvals_url: &str,
    delegate_for: Option<&str>,
) -> EmailMessage {
    let subject = match delegate_for {
        Some(_) => "Supplier Approval Required - New Onboarding Request (Delegated)",
        None => "Supplier Approval Required - New Onboarding Request",
    };
    let note = delegate_for
        .map(|name| format!("\nNote: you are acting as a delegate for {}.\n", name))
        .unwrap_or_default();
    let content = format!(
        "A supplier initiation request requires your {} approval.\n\n{}\n{}\nReview the request at {}\n\n{}",
        stage.label(),
        request_summary(initiation),
        note,
        approvals_url,
        SIGNATURE
    );
    EmailMessage::new(to, subject, content)
        .with_metadata("initiationId", initiation.id.to_string())
        .with_metadata("supplierName", initiation.supplier_name.clone())
}

pub fn decision_for_initiator(
    to: &str,
    initiation: &supplier_initiation::Model,
    stage: ApprovalStage,
    approved: bool,
    comments: Option<&str>,
) -> EmailMessage {
    let outcome = if approved { "approved" } else { "rejected" };
    let next = match (stage, approved) {
        (ApprovalStage::Manager, true) => "The request now awaits procurement approval.",
        (ApprovalStage::Procurement, true) => {
            "The supplier will be emailed an onboarding link to submit their documents."
        }
        (_, false) => "You may update the request and resubmit it.",
    };
    let comments = comments
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!("\nComments: {}\n", c))
        .unwrap_or_default();
    EmailMessage::new(
        to,
        format!(
            "Supplier Initiation {} - {}",
            if approved { "Approved" } else { "Rejected" },
            initiation.supplier_name
        ),
        format!(
            "Your supplier initiation for {} was {} at the {} stage.\n{}\n{}\n\n{}",
            initiation.supplier_name,
            outcome,
            stage.label(),
            comments,
            next,
            SIGNATURE
        ),
    )
    .with_metadata("initiationId", initiation.id.to_string())
}

pub fn onboarding_invitation(initiation: &supplier_initiation::Model, link: &str) -> EmailMessage {
    EmailMessage::new(
        &initiation.supplier_email,
        "Supplier Onboarding - Documentation Required",
        format!(
            "Dear {},\n\nYou have been invited to register as a supplier. Please complete the \
             onboarding form and upload the requested documents using the link below:\n\n{}\n\n{}",
            initiation.supplier_contact_person, link, SIGNATURE
        ),
    )
    .with_metadata("initiationId", initiation.id.to_string())
    .with_metadata("supplierName", initiation.supplier_name.clone())
}

pub fn submission_received(
    to: &str,
    supplier: &supplier::Model,
    version: u32,
    review_url: &str,
) -> EmailMessage {
    let kind = if version > 1 {
        format!("a revised submission (version {})", version)
    } else {
        "their onboarding documents".to_string()
    };
    EmailMessage::new(
        to,
        format!("Supplier Documents Received - {}", supplier.company_name),
        format!(
            "{} ({}) has submitted {}.\n\nReview the submission at {}\n\n{}",
            supplier.company_name, supplier.supplier_code, kind, review_url, SIGNATURE
        ),
    )
    .with_metadata("supplierId", supplier.id.to_string())
}

fn document_list(documents: &[DocumentCategory]) -> String {
    documents
        .iter()
        .map(|d| format!("- {}", d.label()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn revision_requested_supplier(
    supplier: &supplier::Model,
    notes: &str,
    documents: &[DocumentCategory],
    link: &str,
) -> EmailMessage {
    let docs = if documents.is_empty() {
        String::new()
    } else {
        format!("\nDocuments to revise:\n{}\n", document_list(documents))
    };
    EmailMessage::new(
        &supplier.contact_email,
        "Supplier Onboarding - Revision Required",
        format!(
            "Dear {},\n\nYour onboarding submission needs some changes.\n\nNotes:\n{}\n{}\n\
             Please resubmit using the link below:\n{}\n\n{}",
            supplier.contact_person, notes, docs, link, SIGNATURE
        ),
    )
    .with_metadata("supplierId", supplier.id.to_string())
}

pub fn revision_requested_initiator(
    to: &str,
    supplier: &supplier::Model,
    notes: &str,
) -> EmailMessage {
    EmailMessage::new(
        to,
        format!("Revision Requested - {}", supplier.company_name),
        format!(
            "A revision was requested from {} ({}).\n\nNotes:\n{}\n\n{}",
            supplier.company_name, supplier.supplier_code, notes, SIGNATURE
        ),
    )
    .with_metadata("supplierId", supplier.id.to_string())
}

pub fn final_approval_requested(
    to: &str,
    supplier: &supplier::Model,
    requested_by: &str,
    review_url: &str,
) -> EmailMessage {
    EmailMessage::new(
        to,
        format!("Final Approval Requested - {}", supplier.company_name),
        format!(
            "{} has requested final approval for {} ({}).\n\nReview at {}\n\n{}",
            requested_by, supplier.company_name, supplier.supplier_code, review_url, SIGNATURE
        ),
    )
    .with_metadata("supplierId", supplier.id.to_string())
}

pub fn supplier_approved(supplier: &supplier::Model, package_path: Option<&str>) -> EmailMessage {
    let mut message = EmailMessage::new(
        &supplier.contact_email,
        "Supplier Onboarding Approved",
        format!(
            "Dear {},\n\n{} has been approved as a supplier. Your supplier code is {}.\n\n{}",
            supplier.contact_person, supplier.company_name, supplier.supplier_code, SIGNATURE
        ),
    )
    .with_metadata("supplierId", supplier.id.to_string());
    if let Some(path) = package_path {
        message = message.with_metadata("approvalPackage", path);
    }
    message
}

/// Reminder to an approver whose gate has been waiting past the threshold.
pub fn approval_reminder(
    stage: ApprovalStage,
    to: &str,
    initiation: &supplier_initiation::Model,
    approvals_url: &str,
    waiting_hours: i64,
) -> EmailMessage {
    EmailMessage::new(
        to,
        format!("Reminder: Approval Pending - {}", initiation.supplier_name),
        format!(
            "A supplier initiation has been awaiting your {} approval for {} hours.\n\n{}\n\n\
             Review the request at {}\n\n{}",
            stage.label(),
            waiting_hours,
            request_summary(initiation),
            approvals_url,
            SIGNATURE
        ),
    )
    .with_metadata("initiationId", initiation.id.to_string())
    .with_metadata("reminder", "true")
}

pub fn document_submission_reminder(supplier: &supplier::Model, link: &str) -> EmailMessage {
    EmailMessage::new(
        &supplier.contact_email,
        "Reminder: Supplier Onboarding Documents Outstanding",
        format!(
            "Dear {},\n\nWe have not yet received the onboarding documents for {}. Please \
             complete the onboarding form using the link below:\n\n{}\n\n{}",
            supplier.contact_person, supplier.company_name, link, SIGNATURE
        ),
    )
    .with_metadata("supplierId", supplier.id.to_string())
    .with_metadata("reminder", "true")
}

pub fn revision_reminder(
    supplier: &supplier::Model,
    documents: &[DocumentCategory],
    link: &str,
) -> EmailMessage {
    let docs = if documents.is_empty() {
        String::new()
    } else {
        format!("\nDocuments to revise:\n{}\n", document_list(documents))
    };
    EmailMessage::new(
        &supplier.contact_email,
        "Reminder: Supplier Onboarding Revision Outstanding",
        format!(
            "Dear {},\n\nThe revision requested on your onboarding submission is still \
             outstanding.\n{}\nPlease resubmit using the link below:\n{}\n\n{}",
            supplier.contact_person, docs, link, SIGNATURE
        ),
    )
    .with_metadata("supplierId", supplier.id.to_string())
    .with_metadata("reminder", "true")
}

/// Reminder to procurement that a submitted supplier still awaits review.
pub fn review_reminder(
    to: &str,
    supplier: &supplier::Model,
    review_url: &str,
    waiting_hours: i64,
) -> EmailMessage {
    EmailMessage::new(
        to,
        format!("Reminder: Supplier Review Pending - {}", supplier.company_name),
        format!(
            "{} ({}) submitted their onboarding documents {} hours ago and is awaiting \
             review.\n\nReview the submission at {}\n\n{}",
            supplier.company_name, supplier.supplier_code, waiting_hours, review_url, SIGNATURE
        ),
    )
    .with_metadata("supplierId", supplier.id.to_string())
    .with_metadata("reminder", "true")
}
