mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use supplier_onboarding_api::{
    entities::{
        enums::{
            ApprovalStatus, DelegationType, InitiationStatus, OverallStatus, SupplierStatus,
        },
        manager_approval, procurement_approval, supplier, supplier_onboarding,
    },
    errors::ServiceError,
    services::delegations::CreateDelegationRequest,
    services::initiations::{DecisionAction, DecisionRequest},
};

use common::{actor, complete_input, TestApp};

fn approve() -> DecisionRequest {
    DecisionRequest {
        action: DecisionAction::Approve,
        comments: Some("Looks good".to_string()),
    }
}

fn reject(reason: &str) -> DecisionRequest {
    DecisionRequest {
        action: DecisionAction::Reject,
        comments: Some(reason.to_string()),
    }
}

async fn submitted(app: &TestApp, name: &str, email: &str) -> uuid::Uuid {
    let requester = actor(&app.users.requester);
    app.state
        .services
        .initiations
        .create(&requester, complete_input(name, email), true)
        .await
        .expect("submitted initiation")
        .id
}

async fn onboarding_for(app: &TestApp, initiation_id: uuid::Uuid) -> Option<supplier_onboarding::Model> {
    supplier_onboarding::Entity::find()
        .filter(supplier_onboarding::Column::InitiationId.eq(initiation_id))
        .one(&*app.state.db)
        .await
        .unwrap()
}

#[tokio::test]
async fn approved_initiation_emails_the_supplier() {
    let app = TestApp::new().await;
    let initiations = &app.state.services.initiations;
    let id = submitted(&app, "Acme Conveyors", "sales@acme.test").await;

    let gate = manager_approval::Entity::find()
        .filter(manager_approval::Column::InitiationId.eq(id))
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("manager gate opened on submit");
    assert_eq!(gate.approver_id, app.users.manager.id);
    assert_eq!(gate.status, ApprovalStatus::Pending);
    assert_eq!(app.mailer.sent_to("manager@example.com").len(), 1);

    let after_manager = initiations
        .manager_decision(&actor(&app.users.manager), id, approve())
        .await
        .unwrap();
    assert_eq!(after_manager.status, InitiationStatus::ManagerApproved);

    let procurement_gate = procurement_approval::Entity::find()
        .filter(procurement_approval::Column::InitiationId.eq(id))
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("procurement gate opened by manager approval");
    assert_eq!(procurement_gate.approver_id, app.users.procurement.id);

    let done = initiations
        .procurement_decision(&actor(&app.users.procurement), id, approve())
        .await
        .unwrap();
    assert_eq!(done.status, InitiationStatus::SupplierEmailed);
    assert!(done.email_sent);

    let onboarding = onboarding_for(&app, id).await.expect("onboarding created");
    assert!(onboarding.onboarding_token.starts_with("init_"));
    assert_eq!(onboarding.overall_status, OverallStatus::EmailSent);
    assert!(onboarding.email_sent);

    let supplier = supplier::Entity::find_by_id(onboarding.supplier_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(supplier.status, SupplierStatus::Pending);
    assert!(supplier.supplier_code.starts_with("SUP-"));

    let invitations = app.mailer.sent_to("sales@acme.test");
    assert_eq!(invitations.len(), 1);
    assert!(invitations[0].content.contains(&onboarding.onboarding_token));
}

#[tokio::test]
async fn procurement_cannot_decide_before_manager() {
    let app = TestApp::new().await;
    let id = submitted(&app, "Early Bird Ltd", "hello@earlybird.test").await;

    let result = app
        .state
        .services
        .initiations
        .procurement_decision(&actor(&app.users.procurement), id, approve())
        .await;
    assert_matches!(result, Err(ServiceError::Forbidden(_)));

    let detail = app
        .state
        .services
        .initiations
        .get(&actor(&app.users.requester), id)
        .await
        .unwrap();
    assert_eq!(detail.initiation.status, InitiationStatus::Submitted);
    assert!(detail.procurement_approval.is_none());
}

#[tokio::test]
async fn initiator_cannot_approve_own_request() {
    let app = TestApp::new().await;
    let id = submitted(&app, "Self Serve Co", "info@selfserve.test").await;

    let result = app
        .state
        .services
        .initiations
        .manager_decision(&actor(&app.users.requester), id, approve())
        .await;
    assert_matches!(result, Err(ServiceError::Forbidden(msg)) if msg.contains("own"));
}

#[tokio::test]
async fn unassigned_manager_is_refused() {
    let app = TestApp::new().await;
    let id = submitted(&app, "Wrong Desk Pty", "desk@wrong.test").await;

    let result = app
        .state
        .services
        .initiations
        .manager_decision(&actor(&app.users.other_manager), id, approve())
        .await;
    assert_matches!(result, Err(ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn second_decision_on_a_gate_is_not_pending() {
    let app = TestApp::new().await;
    let initiations = &app.state.services.initiations;
    let id = submitted(&app, "Twice Decided", "twice@decided.test").await;
    let manager = actor(&app.users.manager);

    initiations
        .manager_decision(&manager, id, approve())
        .await
        .unwrap();
    let again = initiations.manager_decision(&manager, id, approve()).await;
    assert_matches!(again, Err(ServiceError::NotPending(_)));
}

#[tokio::test]
async fn concurrent_decisions_on_one_gate_apply_once() {
    let app = TestApp::new().await;
    let initiations = &app.state.services.initiations;
    let now = Utc::now();
    app.state
        .services
        .delegations
        .create(
            &actor(&app.users.manager),
            CreateDelegationRequest {
                delegate_id: app.users.other_manager.id,
                delegation_type: DelegationType::AllApprovals,
                start_date: now - Duration::hours(1),
                end_date: now + Duration::days(1),
                reason: Some("Shared inbox".to_string()),
            },
        )
        .await
        .unwrap();
    let id = submitted(&app, "Race Conditions", "race@conditions.test").await;

    let manager = actor(&app.users.manager);
    let delegate = actor(&app.users.other_manager);
    let (first, second) = tokio::join!(
        initiations.manager_decision(&manager, id, approve()),
        initiations.manager_decision(&delegate, id, approve()),
    );
    let (won, lost) = match (first, second) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        (a, b) => panic!("expected exactly one decision to apply, got {:?} and {:?}", a, b),
    };
    assert_matches!(lost, ServiceError::NotPending(_));

    let gates = manager_approval::Entity::find()
        .filter(manager_approval::Column::InitiationId.eq(id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(gates.len(), 1);
    assert_eq!(gates[0].status, ApprovalStatus::Approved);
    assert_eq!(won.status, InitiationStatus::ManagerApproved);

    let procurement = actor(&app.users.procurement);
    let (first, second) = tokio::join!(
        initiations.procurement_decision(&procurement, id, approve()),
        initiations.procurement_decision(&procurement, id, approve()),
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(ServiceError::NotPending(_)))));

    let suppliers = supplier::Entity::find()
        .filter(supplier::Column::ContactEmail.eq("race@conditions.test"))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(suppliers.len(), 1);
    let gate = procurement_approval::Entity::find()
        .filter(procurement_approval::Column::InitiationId.eq(id))
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("procurement gate");
    assert_eq!(gate.status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn rejected_initiation_can_be_resubmitted() {
    let app = TestApp::new().await;
    let initiations = &app.state.services.initiations;
    let id = submitted(&app, "Second Chance", "retry@second.test").await;

    let rejected = initiations
        .manager_decision(&actor(&app.users.manager), id, reject("Need a better reason"))
        .await
        .unwrap();
    assert_eq!(rejected.status, InitiationStatus::Rejected);

    let resubmitted = initiations
        .submit(&actor(&app.users.requester), id)
        .await
        .unwrap();
    assert_eq!(resubmitted.status, InitiationStatus::Submitted);

    let gates = manager_approval::Entity::find()
        .filter(manager_approval::Column::InitiationId.eq(id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(gates.len(), 1);
    assert_eq!(gates[0].status, ApprovalStatus::Pending);
}

#[tokio::test]
async fn delegate_can_decide_for_the_manager() {
    let app = TestApp::new().await;
    let now = Utc::now();
    app.state
        .services
        .delegations
        .create(
            &actor(&app.users.manager),
            CreateDelegationRequest {
                delegate_id: app.users.other_manager.id,
                delegation_type: DelegationType::ManagerApprovals,
                start_date: now - Duration::hours(1),
                end_date: now + Duration::days(7),
                reason: Some("Annual leave".to_string()),
            },
        )
        .await
        .unwrap();

    let id = submitted(&app, "Covered Supply", "cover@supply.test").await;
    assert_eq!(app.mailer.sent_to("olivia@example.com").len(), 1);

    let delegate = actor(&app.users.other_manager);
    let pending = app
        .state
        .services
        .initiations
        .pending_approvals(&delegate)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].delegated);

    let decided = app
        .state
        .services
        .initiations
        .decide(&delegate, id, approve())
        .await
        .unwrap();
    assert_eq!(decided.status, InitiationStatus::ManagerApproved);
}

#[tokio::test]
async fn failed_invitation_leaves_initiation_procurement_approved() {
    let app = TestApp::new().await;
    let initiations = &app.state.services.initiations;
    let id = submitted(&app, "Quiet Inbox", "nobody@quiet.test").await;
    initiations
        .manager_decision(&actor(&app.users.manager), id, approve())
        .await
        .unwrap();

    app.mailer.set_failing(true);
    let result = initiations
        .procurement_decision(&actor(&app.users.procurement), id, approve())
        .await
        .unwrap();
    assert_eq!(result.status, InitiationStatus::ProcurementApproved);
    assert!(!result.email_sent);

    let onboarding = onboarding_for(&app, id).await.expect("onboarding created");
    assert_eq!(onboarding.overall_status, OverallStatus::AwaitingResponse);
    assert!(!onboarding.email_sent);

    let outsider = initiations
        .resend_invitation(&actor(&app.users.other_manager), id)
        .await;
    assert_matches!(outsider, Err(ServiceError::Forbidden(_)));

    let still_failing = initiations
        .resend_invitation(&actor(&app.users.requester), id)
        .await
        .unwrap();
    assert_eq!(still_failing.status, InitiationStatus::ProcurementApproved);
    assert!(!still_failing.email_sent);

    app.mailer.set_failing(false);
    let resent = initiations
        .resend_invitation(&actor(&app.users.procurement), id)
        .await
        .unwrap();
    assert_eq!(resent.status, InitiationStatus::SupplierEmailed);
    assert!(resent.email_sent);
    assert_eq!(app.mailer.sent_to("nobody@quiet.test").len(), 1);

    let onboarding = onboarding_for(&app, id).await.expect("onboarding");
    assert!(onboarding.email_sent);
    assert_eq!(onboarding.overall_status, OverallStatus::EmailSent);

    let again = initiations
        .resend_invitation(&actor(&app.users.requester), id)
        .await;
    assert_matches!(again, Err(ServiceError::InvalidStatus(_)));
}

#[tokio::test]
async fn duplicate_supplier_blocks_submission() {
    let app = TestApp::new().await;
    submitted(&app, "Twin Traders", "orders@twin.test").await;

    let requester = actor(&app.users.requester);
    let result = app
        .state
        .services
        .initiations
        .create(
            &requester,
            complete_input("twin traders", "different@twin.test"),
            true,
        )
        .await;
    assert_matches!(result, Err(ServiceError::DuplicateConflict(_)));
}

#[tokio::test]
async fn drafts_do_not_count_as_duplicates() {
    let app = TestApp::new().await;
    let requester = actor(&app.users.requester);
    let initiations = &app.state.services.initiations;
    initiations
        .create(&requester, complete_input("Draft Only", "draft@only.test"), false)
        .await
        .unwrap();

    let second = initiations
        .create(&requester, complete_input("Draft Only", "draft@only.test"), true)
        .await
        .unwrap();
    assert_eq!(second.status, InitiationStatus::Submitted);
}

#[tokio::test]
async fn incomplete_initiation_fails_validation() {
    let app = TestApp::new().await;
    let mut input = complete_input("Half Done", "half@done.test");
    input.process_read_understood = Some(false);
    input.business_units = Some(vec![]);

    let result = app
        .state
        .services
        .initiations
        .create(&actor(&app.users.requester), input, true)
        .await;
    assert_matches!(result, Err(ServiceError::ValidationFailed(problems)) if problems.len() >= 2);
}

#[tokio::test]
async fn initiator_without_manager_is_rejected() {
    let app = TestApp::new().await;
    let result = app
        .state
        .services
        .initiations
        .create(
            &actor(&app.users.orphan),
            complete_input("Lonely Supply", "lonely@supply.test"),
            true,
        )
        .await;
    assert_matches!(result, Err(ServiceError::InvalidOperation(msg)) if msg.contains("manager"));
}

#[tokio::test]
async fn outsiders_cannot_read_an_initiation() {
    let app = TestApp::new().await;
    let id = submitted(&app, "Private Parts", "private@parts.test").await;

    let result = app
        .state
        .services
        .initiations
        .get(&actor(&app.users.orphan), id)
        .await;
    assert_matches!(result, Err(ServiceError::Forbidden(_)));

    let as_manager = app
        .state
        .services
        .initiations
        .get(&actor(&app.users.manager), id)
        .await
        .unwrap();
    assert!(as_manager.can_approve_as_manager);
    assert!(!as_manager.can_approve_as_procurement);
}

#[tokio::test]
async fn emailed_initiation_cannot_be_deleted() {
    let app = TestApp::new().await;
    let initiations = &app.state.services.initiations;
    let id = submitted(&app, "Permanent Record", "keep@permanent.test").await;
    initiations
        .manager_decision(&actor(&app.users.manager), id, approve())
        .await
        .unwrap();
    initiations
        .procurement_decision(&actor(&app.users.procurement), id, approve())
        .await
        .unwrap();

    let result = initiations.delete(&actor(&app.users.admin), id).await;
    assert_matches!(result, Err(ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn owner_can_delete_a_draft() {
    let app = TestApp::new().await;
    let requester = actor(&app.users.requester);
    let initiations = &app.state.services.initiations;
    let draft = initiations
        .create(&requester, complete_input("Scratch Pad", "scratch@pad.test"), false)
        .await
        .unwrap();
    assert_eq!(draft.status, InitiationStatus::Draft);

    initiations.delete(&requester, draft.id).await.unwrap();
    let (own, total) = initiations.list(&requester, 1, 20).await.unwrap();
    assert!(own.is_empty());
    assert_eq!(total, 0);
}
