mod common;

use assert_matches::assert_matches;
use bytes::Bytes;
use supplier_onboarding_api::{
    entities::enums::{OverallStatus, SupplierStatus},
    errors::ServiceError,
    models::DocumentCategory,
    services::onboarding::{
        RevisionRequest, StatusUpdateRequest, SupplierFormFields, SupplierFormSubmission,
        UploadedFile,
    },
};

use common::{actor, pdf, TestApp};

fn form(token: Option<&str>, email: &str, files: Vec<UploadedFile>) -> SupplierFormSubmission {
    SupplierFormSubmission {
        onboarding_token: token.map(str::to_string),
        fields: SupplierFormFields {
            company_name: "Acme Conveyors (Pty) Ltd".to_string(),
            contact_email: email.to_string(),
            contact_person: "Thabo Contact".to_string(),
            registration_number: Some("2019/123456/07".to_string()),
            ..Default::default()
        },
        files,
    }
}

fn revision(notes: &str, documents: Vec<DocumentCategory>) -> RevisionRequest {
    RevisionRequest {
        revision_notes: notes.to_string(),
        documents_to_revise: documents,
    }
}

fn status(status: SupplierStatus, reason: Option<&str>) -> StatusUpdateRequest {
    StatusUpdateRequest {
        status,
        rejection_reason: reason.map(str::to_string),
        credit_controller: None,
    }
}

#[tokio::test]
async fn token_submission_records_version_one() {
    let app = TestApp::new().await;
    let emailed = app.emailed_supplier("Acme Conveyors", "sales@acme.test").await;
    let onboarding = &app.state.services.onboarding;

    let receipt = onboarding
        .submit_supplier_form(form(
            Some(&emailed.token),
            "sales@acme.test",
            vec![
                pdf(DocumentCategory::CompanyRegistration, "cipc.pdf"),
                pdf(DocumentCategory::TaxClearance, "tax clearance.pdf"),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(receipt.supplier_id, emailed.supplier_id);
    assert_eq!(receipt.version, 1);
    assert_eq!(receipt.files_stored, 2);

    let keys = app.store.keys();
    assert_eq!(keys.len(), 2);
    let prefix = format!("{}/v1/", receipt.supplier_code);
    assert!(keys.iter().all(|k| k.starts_with(&prefix)));

    let detail = onboarding.supplier_detail(emailed.supplier_id).await.unwrap();
    assert_eq!(detail.supplier.status, SupplierStatus::UnderReview);
    assert_eq!(detail.supplier.airtable_data.all_versions().len(), 1);
    let record = detail.onboarding.expect("onboarding");
    assert!(record.supplier_form_submitted);
    assert_eq!(record.overall_status, OverallStatus::DocumentsReceived);
    assert!(detail
        .missing_documents
        .contains(&DocumentCategory::BankConfirmation));

    assert_eq!(app.mailer.sent_to("procurement@example.com").len(), 2);
}

#[tokio::test]
async fn non_pdf_uploads_are_rejected_without_storing() {
    let app = TestApp::new().await;
    let emailed = app.emailed_supplier("Scanned Docs", "scans@docs.test").await;

    let result = app
        .state
        .services
        .onboarding
        .submit_supplier_form(form(
            Some(&emailed.token),
            "scans@docs.test",
            vec![
                pdf(DocumentCategory::CompanyRegistration, "cipc.pdf"),
                UploadedFile {
                    category: DocumentCategory::TaxClearance,
                    file_name: "tax.png".to_string(),
                    content_type: "image/png".to_string(),
                    bytes: Bytes::from_static(b"\x89PNG"),
                },
            ],
        ))
        .await;
    assert_matches!(result, Err(ServiceError::BadRequest(msg)) if msg.contains("tax.png"));
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let app = TestApp::new().await;
    let result = app
        .state
        .services
        .onboarding
        .submit_supplier_form(form(
            Some("init_missing_0"),
            "ghost@nowhere.test",
            vec![pdf(DocumentCategory::CompanyRegistration, "cipc.pdf")],
        ))
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));

    let context = app.state.services.onboarding.form_context("init_missing_0").await;
    assert_matches!(context, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn missing_company_name_fails_validation() {
    let app = TestApp::new().await;
    let mut submission = form(None, "not-an-email", vec![]);
    submission.fields.company_name = "  ".to_string();

    let result = app
        .state
        .services
        .onboarding
        .submit_supplier_form(submission)
        .await;
    assert_matches!(result, Err(ServiceError::ValidationFailed(problems)) if problems.len() == 2);
}

#[tokio::test]
async fn tokenless_submission_creates_a_supplier_once_per_email() {
    let app = TestApp::new().await;
    let onboarding = &app.state.services.onboarding;

    let receipt = onboarding
        .submit_supplier_form(form(
            None,
            "walkin@direct.test",
            vec![pdf(DocumentCategory::BankConfirmation, "bank.pdf")],
        ))
        .await
        .unwrap();
    assert_eq!(receipt.version, 1);

    let detail = onboarding.supplier_detail(receipt.supplier_id).await.unwrap();
    let record = detail.onboarding.expect("onboarding");
    assert!(record.onboarding_token.starts_with("form_"));
    assert!(record.initiation_id.is_none());

    let again = onboarding
        .submit_supplier_form(form(None, "WALKIN@direct.test", vec![]))
        .await;
    assert_matches!(again, Err(ServiceError::DuplicateConflict(_)));
}

#[tokio::test]
async fn revision_round_trip_adds_version_two() {
    let app = TestApp::new().await;
    let emailed = app.emailed_supplier("Revisable Co", "docs@revisable.test").await;
    let onboarding = &app.state.services.onboarding;

    onboarding
        .submit_supplier_form(form(
            Some(&emailed.token),
            "docs@revisable.test",
            vec![
                pdf(DocumentCategory::CompanyRegistration, "cipc.pdf"),
                pdf(DocumentCategory::TaxClearance, "tax.pdf"),
            ],
        ))
        .await
        .unwrap();

    let updated = onboarding
        .request_revision(
            &actor(&app.users.procurement),
            emailed.supplier_id,
            revision(
                "Please add the outstanding documents",
                vec![DocumentCategory::BankConfirmation],
            ),
        )
        .await
        .unwrap();
    assert_eq!(updated.revision_count, 1);
    assert!(updated.revision_requested);
    assert_eq!(updated.overall_status, OverallStatus::RevisionNeeded);

    let context = onboarding.form_context(&emailed.token).await.unwrap();
    assert!(context.revision_requested);
    assert_eq!(
        context.documents_to_revise,
        vec![DocumentCategory::BankConfirmation]
    );
    assert!(context
        .required_documents
        .iter()
        .any(|item| item.category == DocumentCategory::CreditApplication));

    let supplier_emails = app.mailer.sent_to("docs@revisable.test");
    assert!(supplier_emails
        .iter()
        .any(|m| m.content.contains("outstanding documents")));
    assert!(!app.mailer.sent_to("requester@example.com").is_empty());

    let receipt = onboarding
        .submit_supplier_form(form(
            Some(&emailed.token),
            "docs@revisable.test",
            vec![
                pdf(DocumentCategory::BbbeeAccreditation, "bee.pdf"),
                pdf(DocumentCategory::BankConfirmation, "bank.pdf"),
                pdf(DocumentCategory::CreditApplication, "credit.pdf"),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(receipt.version, 2);

    let detail = onboarding.supplier_detail(emailed.supplier_id).await.unwrap();
    let versions = detail.supplier.airtable_data.all_versions();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version, 1);
    assert_eq!(versions[1].version, 2);
    assert!(detail.missing_documents.is_empty());
    assert!(!detail.onboarding.expect("onboarding").revision_requested);
}

#[tokio::test]
async fn revision_requires_manager_role_and_notes() {
    let app = TestApp::new().await;
    let emailed = app.emailed_supplier("Strict Review", "strict@review.test").await;
    let onboarding = &app.state.services.onboarding;

    let by_specialist = onboarding
        .request_revision(
            &actor(&app.users.specialist),
            emailed.supplier_id,
            revision("Fix it", vec![]),
        )
        .await;
    assert_matches!(by_specialist, Err(ServiceError::Forbidden(_)));

    let blank = onboarding
        .request_revision(
            &actor(&app.users.admin),
            emailed.supplier_id,
            revision("   ", vec![]),
        )
        .await;
    assert_matches!(blank, Err(ServiceError::ValidationFailed(_)));
}

#[tokio::test]
async fn final_approval_is_requested_by_the_initiator_after_submission() {
    let app = TestApp::new().await;
    let emailed = app.emailed_supplier("Sign Off Ltd", "signoff@ltd.test").await;
    let onboarding = &app.state.services.onboarding;
    let initiator = actor(&app.users.requester);

    let too_early = onboarding
        .request_final_approval(&initiator, emailed.supplier_id)
        .await;
    assert_matches!(too_early, Err(ServiceError::InvalidOperation(_)));

    onboarding
        .submit_supplier_form(form(
            Some(&emailed.token),
            "signoff@ltd.test",
            vec![pdf(DocumentCategory::CompanyRegistration, "cipc.pdf")],
        ))
        .await
        .unwrap();

    let not_initiator = onboarding
        .request_final_approval(&actor(&app.users.procurement), emailed.supplier_id)
        .await;
    assert_matches!(not_initiator, Err(ServiceError::Forbidden(_)));

    let supplier = onboarding
        .request_final_approval(&initiator, emailed.supplier_id)
        .await
        .unwrap();
    assert_eq!(supplier.status, SupplierStatus::AwaitingFinalApproval);

    let repeat = onboarding
        .request_final_approval(&initiator, emailed.supplier_id)
        .await;
    assert_matches!(repeat, Err(ServiceError::InvalidStatus(_)));
}

#[tokio::test]
async fn approval_stores_a_package_and_notifies_the_supplier() {
    let app = TestApp::new().await;
    let emailed = app.emailed_supplier("Package Deal", "deal@package.test").await;
    let onboarding = &app.state.services.onboarding;

    let without_form = onboarding
        .update_status(
            &actor(&app.users.procurement),
            emailed.supplier_id,
            status(SupplierStatus::Approved, None),
        )
        .await;
    assert_matches!(without_form, Err(ServiceError::InvalidOperation(_)));

    onboarding
        .submit_supplier_form(form(
            Some(&emailed.token),
            "deal@package.test",
            vec![pdf(DocumentCategory::CompanyRegistration, "cipc.pdf")],
        ))
        .await
        .unwrap();

    let by_specialist = onboarding
        .update_status(
            &actor(&app.users.specialist),
            emailed.supplier_id,
            status(SupplierStatus::Approved, None),
        )
        .await;
    assert_matches!(by_specialist, Err(ServiceError::Forbidden(_)));

    let outcome = onboarding
        .update_status(
            &actor(&app.users.procurement),
            emailed.supplier_id,
            StatusUpdateRequest {
                status: SupplierStatus::Approved,
                rejection_reason: None,
                credit_controller: Some("Credit Desk".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.supplier.status, SupplierStatus::Approved);
    assert_eq!(outcome.supplier.approved_by_id, Some(app.users.procurement.id));
    assert_eq!(outcome.supplier.credit_controller.as_deref(), Some("Credit Desk"));
    assert!(outcome.supplier_notified);
    let package_key = outcome.package_key.expect("package stored");
    assert!(package_key.contains("/package/"));
    assert!(app.store.keys().contains(&package_key));

    let detail = onboarding.supplier_detail(emailed.supplier_id).await.unwrap();
    assert_eq!(
        detail.onboarding.expect("onboarding").overall_status,
        OverallStatus::Approved
    );

    let again = onboarding
        .update_status(
            &actor(&app.users.admin),
            emailed.supplier_id,
            status(SupplierStatus::Approved, None),
        )
        .await;
    assert_matches!(again, Err(ServiceError::InvalidStatus(_)));
}

#[tokio::test]
async fn rejection_needs_a_reason() {
    let app = TestApp::new().await;
    let emailed = app.emailed_supplier("Turned Down", "no@turned.test").await;
    let onboarding = &app.state.services.onboarding;
    let reviewer = actor(&app.users.specialist);

    let missing = onboarding
        .update_status(&reviewer, emailed.supplier_id, status(SupplierStatus::Rejected, Some(" ")))
        .await;
    assert_matches!(missing, Err(ServiceError::ValidationFailed(_)));

    let outcome = onboarding
        .update_status(
            &reviewer,
            emailed.supplier_id,
            status(SupplierStatus::Rejected, Some("Failed vetting")),
        )
        .await
        .unwrap();
    assert_eq!(outcome.supplier.status, SupplierStatus::Rejected);
    assert_eq!(
        outcome.supplier.rejection_reason.as_deref(),
        Some("Failed vetting")
    );
    assert!(outcome.package_key.is_none());
    assert!(!outcome.supplier_notified);
}

#[tokio::test]
async fn concurrent_resubmissions_each_append_a_version() {
    let app = TestApp::new().await;
    let emailed = app.emailed_supplier("Twin Uploads", "twins@uploads.test").await;
    let onboarding = &app.state.services.onboarding;

    let (tax, bank) = tokio::join!(
        onboarding.submit_supplier_form(form(
            Some(&emailed.token),
            "twins@uploads.test",
            vec![pdf(DocumentCategory::TaxClearance, "tax.pdf")],
        )),
        onboarding.submit_supplier_form(form(
            Some(&emailed.token),
            "twins@uploads.test",
            vec![pdf(DocumentCategory::BankConfirmation, "bank.pdf")],
        )),
    );
    let succeeded = [tax.is_ok(), bank.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(succeeded, 2);

    let detail = onboarding.supplier_detail(emailed.supplier_id).await.unwrap();
    let versions = detail.supplier.airtable_data.all_versions();
    assert_eq!(versions.len(), succeeded);

    let categories = detail.supplier.airtable_data.union_of_categories();
    assert!(categories.contains(&DocumentCategory::TaxClearance));
    assert!(categories.contains(&DocumentCategory::BankConfirmation));
    assert!(versions.iter().all(|v| v.file_count() == 1));
    assert_eq!(app.store.keys().len(), 2);
}

#[tokio::test]
async fn revision_requested_mid_submission_is_not_overwritten() {
    let app = TestApp::new().await;
    let emailed = app.emailed_supplier("Late Revision", "late@revision.test").await;
    let onboarding = &app.state.services.onboarding;
    let reviewer = actor(&app.users.procurement);

    onboarding
        .submit_supplier_form(form(
            Some(&emailed.token),
            "late@revision.test",
            vec![pdf(DocumentCategory::CompanyRegistration, "cipc.pdf")],
        ))
        .await
        .unwrap();

    let (resubmitted, revised) = tokio::join!(
        onboarding.submit_supplier_form(form(
            Some(&emailed.token),
            "late@revision.test",
            vec![pdf(DocumentCategory::TaxClearance, "tax.pdf")],
        )),
        onboarding.request_revision(
            &reviewer,
            emailed.supplier_id,
            revision("Tax clearance has expired", vec![DocumentCategory::TaxClearance]),
        ),
    );
    let revised = revised.expect("revision request");
    assert_eq!(revised.revision_count, 1);

    let detail = onboarding.supplier_detail(emailed.supplier_id).await.unwrap();
    let record = detail.onboarding.expect("onboarding");
    assert_eq!(record.revision_count, 1);
    let versions = detail.supplier.airtable_data.all_versions();
    match resubmitted {
        Ok(_) => assert_eq!(versions.len(), 2),
        Err(e) => {
            assert_matches!(e, ServiceError::ConcurrentModification(_));
            assert_eq!(versions.len(), 1);
            assert!(record.revision_requested);
        }
    }
}
