mod common;

use axum::http::{Method, StatusCode};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use supplier_onboarding_api::{
    entities::enums::{ReminderStatus, ReminderType},
    entities::{manager_approval, procurement_approval, reminder_log, supplier_onboarding},
    models::DocumentCategory,
    notifications::EmailMessage,
    services::initiations::{DecisionAction, DecisionRequest},
    services::onboarding::{RevisionRequest, SupplierFormFields, SupplierFormSubmission},
    services::reminders::ReminderSummary,
};
use uuid::Uuid;

use common::{actor, complete_input, pdf, response_json, TestApp};

fn two_days_ago() -> DateTime<Utc> {
    Utc::now() - Duration::hours(48)
}

fn reminders_to(app: &TestApp, address: &str) -> Vec<EmailMessage> {
    app.mailer
        .sent_to(address)
        .into_iter()
        .filter(|m| m.metadata.get("reminder").map(String::as_str) == Some("true"))
        .collect()
}

async fn submit_form(app: &TestApp, token: &str, company: &str, email: &str) {
    app.state
        .services
        .onboarding
        .submit_supplier_form(SupplierFormSubmission {
            onboarding_token: Some(token.to_string()),
            fields: SupplierFormFields {
                company_name: company.to_string(),
                contact_email: email.to_string(),
                contact_person: "Thabo Contact".to_string(),
                ..Default::default()
            },
            files: vec![pdf(DocumentCategory::CompanyRegistration, "cipc.pdf")],
        })
        .await
        .unwrap();
}

async fn backdate_manager_gate(app: &TestApp, initiation_id: Uuid) {
    manager_approval::Entity::update_many()
        .set(manager_approval::ActiveModel {
            created_at: Set(two_days_ago()),
            ..Default::default()
        })
        .filter(manager_approval::Column::InitiationId.eq(initiation_id))
        .exec(&*app.state.db)
        .await
        .unwrap();
}

async fn backdate_onboarding(app: &TestApp, supplier_id: Uuid, changes: supplier_onboarding::ActiveModel) {
    supplier_onboarding::Entity::update_many()
        .set(changes)
        .filter(supplier_onboarding::Column::SupplierId.eq(supplier_id))
        .exec(&*app.state.db)
        .await
        .unwrap();
}

#[tokio::test]
async fn overdue_items_are_reminded_once() {
    let app = TestApp::new().await;
    let initiations = &app.state.services.initiations;
    let requester = actor(&app.users.requester);

    // Manager gate open for two days, and one opened just now.
    let slow = initiations
        .create(&requester, complete_input("Slow Gate Ltd", "slow@gate.test"), true)
        .await
        .unwrap();
    backdate_manager_gate(&app, slow.id).await;
    initiations
        .create(&requester, complete_input("Fresh Gate Ltd", "fresh@gate.test"), true)
        .await
        .unwrap();

    // Procurement gate open for two days.
    let at_procurement = initiations
        .create(&requester, complete_input("Waiting Procurement Ltd", "wait@proc.test"), true)
        .await
        .unwrap();
    initiations
        .manager_decision(
            &actor(&app.users.manager),
            at_procurement.id,
            DecisionRequest {
                action: DecisionAction::Approve,
                comments: None,
            },
        )
        .await
        .unwrap();
    procurement_approval::Entity::update_many()
        .set(procurement_approval::ActiveModel {
            created_at: Set(two_days_ago()),
            ..Default::default()
        })
        .filter(procurement_approval::Column::InitiationId.eq(at_procurement.id))
        .exec(&*app.state.db)
        .await
        .unwrap();

    // Invitation nobody answered.
    let quiet = app.emailed_supplier("Quiet Supplier", "quiet@supplier.test").await;
    backdate_onboarding(
        &app,
        quiet.supplier_id,
        supplier_onboarding::ActiveModel {
            email_sent_at: Set(Some(two_days_ago())),
            ..Default::default()
        },
    )
    .await;

    // Revision requested two days ago and not yet resubmitted.
    let revising = app.emailed_supplier("Revise Ltd", "revise@supplier.test").await;
    submit_form(&app, &revising.token, "Revise Ltd", "revise@supplier.test").await;
    app.state
        .services
        .onboarding
        .request_revision(
            &actor(&app.users.procurement),
            revising.supplier_id,
            RevisionRequest {
                revision_notes: "Bank letter is missing".to_string(),
                documents_to_revise: vec![DocumentCategory::BankConfirmation],
            },
        )
        .await
        .unwrap();
    backdate_onboarding(
        &app,
        revising.supplier_id,
        supplier_onboarding::ActiveModel {
            revision_requested_at: Set(Some(two_days_ago())),
            ..Default::default()
        },
    )
    .await;

    // Submission nobody has reviewed.
    let unreviewed = app.emailed_supplier("Review Ltd", "review@supplier.test").await;
    submit_form(&app, &unreviewed.token, "Review Ltd", "review@supplier.test").await;
    backdate_onboarding(
        &app,
        unreviewed.supplier_id,
        supplier_onboarding::ActiveModel {
            supplier_form_submitted_at: Set(Some(two_days_ago())),
            ..Default::default()
        },
    )
    .await;

    let reminders = &app.state.services.reminders;
    let summary = reminders.check(Utc::now()).await.unwrap();
    assert_eq!(
        summary,
        ReminderSummary {
            manager_approvals: 1,
            procurement_approvals: 1,
            supplier_documents: 1,
            supplier_revisions: 1,
            pm_reviews: 1,
            failed: 0,
        }
    );

    let to_manager = reminders_to(&app, "manager@example.com");
    assert_eq!(to_manager.len(), 1);
    assert!(to_manager[0].subject.ends_with("Slow Gate Ltd"));
    assert!(to_manager[0].content.contains("manager approval for 48 hours"));

    let to_procurement = reminders_to(&app, "procurement@example.com");
    assert_eq!(to_procurement.len(), 2);
    assert!(to_procurement
        .iter()
        .any(|m| m.subject.ends_with("Waiting Procurement Ltd")));
    assert!(to_procurement
        .iter()
        .any(|m| m.subject.starts_with("Reminder: Supplier Review Pending")));

    let to_quiet = reminders_to(&app, "quiet@supplier.test");
    assert_eq!(to_quiet.len(), 1);
    assert!(to_quiet[0].content.contains(&quiet.token));

    let to_revising = reminders_to(&app, "revise@supplier.test");
    assert_eq!(to_revising.len(), 1);
    assert!(to_revising[0].content.contains("Bank Confirmation"));
    assert!(reminders_to(&app, "review@supplier.test").is_empty());

    // A second sweep finds everything already chased.
    let again = reminders.check(Utc::now()).await.unwrap();
    assert_eq!(again, ReminderSummary::default());
    assert_eq!(reminders_to(&app, "procurement@example.com").len(), 2);

    let logged = reminder_log::Entity::find()
        .filter(reminder_log::Column::Status.eq(ReminderStatus::Sent))
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(logged, 5);
}

#[tokio::test]
async fn failed_reminder_is_retried_by_the_next_sweep() {
    let app = TestApp::new().await;
    let slow = app
        .state
        .services
        .initiations
        .create(
            &actor(&app.users.requester),
            complete_input("Slow Gate Ltd", "slow@gate.test"),
            true,
        )
        .await
        .unwrap();
    backdate_manager_gate(&app, slow.id).await;
    let reminders = &app.state.services.reminders;

    app.mailer.set_failing(true);
    let failed = reminders.check(Utc::now()).await.unwrap();
    assert_eq!(failed.failed, 1);
    assert_eq!(failed.delivered(), 0);

    let log = reminder_log::Entity::find()
        .filter(reminder_log::Column::ReminderType.eq(ReminderType::ManagerApprovalPending))
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("reminder log");
    assert_eq!(log.status, ReminderStatus::Failed);
    assert_eq!(log.recipient_email, "manager@example.com");
    assert!(log.sent_at.is_none());

    app.mailer.set_failing(false);
    let retried = reminders.check(Utc::now()).await.unwrap();
    assert_eq!(retried.manager_approvals, 1);
    assert_eq!(retried.failed, 0);
    assert_eq!(reminders_to(&app, "manager@example.com").len(), 1);

    let log = reminder_log::Entity::find_by_id(log.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("reminder log");
    assert_eq!(log.status, ReminderStatus::Sent);
    assert!(log.sent_at.is_some());
    assert!(log.error_message.is_none());
}

#[tokio::test]
async fn sweep_honours_the_waiting_threshold() {
    let app = TestApp::new().await;
    app.state
        .services
        .initiations
        .create(
            &actor(&app.users.requester),
            complete_input("Fresh Gate Ltd", "fresh@gate.test"),
            true,
        )
        .await
        .unwrap();
    let reminders = &app.state.services.reminders;

    let early = reminders.check(Utc::now() + Duration::hours(23)).await.unwrap();
    assert_eq!(early, ReminderSummary::default());

    let late = reminders.check(Utc::now() + Duration::hours(25)).await.unwrap();
    assert_eq!(late.manager_approvals, 1);
}

#[tokio::test]
async fn reminder_sweep_route_is_admin_only() {
    let app = TestApp::new().await;

    let forbidden = app
        .request_as(&app.users.procurement, Method::POST, "/api/v1/reminders/check", None)
        .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_as(&app.users.admin, Method::POST, "/api/v1/reminders/check", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["managerApprovals"], 0);
    assert_eq!(body["data"]["pmReviews"], 0);
}
