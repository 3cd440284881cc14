mod common;

use axum::http::{Method, StatusCode};
use base64::Engine;
use serde_json::{json, Value};

use common::{response_json, TestApp};

fn initiation_body(supplier_name: &str, supplier_email: &str, submit: bool) -> Value {
    json!({
        "submit": submit,
        "supplierName": supplier_name,
        "supplierEmail": supplier_email,
        "supplierContactPerson": "Lerato Contact",
        "businessUnits": ["SCHAUENBURG_PTY_LTD_300"],
        "productServiceCategory": "Safety equipment",
        "purchaseType": "REGULAR",
        "paymentMethod": "AC",
        "annualPurchaseValue": "100k-500k",
        "creditApplication": false,
        "creditApplicationReason": "Supplier only trades on account terms we already hold",
        "onboardingReason": "Replacing an exiting vendor",
        "relationshipDeclaration": "None",
        "processReadUnderstood": true,
        "dueDiligenceCompleted": true
    })
}

#[tokio::test]
async fn health_and_status_are_public() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "healthy");

    let response = app.request(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["environment"], "test");
}

#[tokio::test]
async fn workflow_routes_require_a_token() {
    let app = TestApp::new().await;

    let missing = app
        .request(Method::GET, "/api/v1/initiations", None, None)
        .await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let forged = app
        .request(
            Method::GET,
            "/api/v1/initiations",
            None,
            Some("not.a.real.token"),
        )
        .await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn review_routes_require_a_reviewer_role() {
    let app = TestApp::new().await;

    let as_requester = app
        .request_as(&app.users.requester, Method::GET, "/api/v1/suppliers", None)
        .await;
    assert_eq!(as_requester.status(), StatusCode::FORBIDDEN);

    let as_specialist = app
        .request_as(&app.users.specialist, Method::GET, "/api/v1/suppliers", None)
        .await;
    assert_eq!(as_specialist.status(), StatusCode::OK);
}

#[tokio::test]
async fn initiation_is_created_and_decided_over_http() {
    let app = TestApp::new().await;

    let created = app
        .request_as(
            &app.users.requester,
            Method::POST,
            "/api/v1/initiations",
            Some(initiation_body("Hardhat Holdings", "orders@hardhat.test", true)),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = response_json(created).await;
    assert_eq!(body["data"]["status"], "SUBMITTED");
    assert_eq!(body["data"]["requesterName"], "Riley Requester");
    let id = body["data"]["id"].as_str().expect("initiation id").to_string();

    let pending = app
        .request_as(
            &app.users.manager,
            Method::GET,
            "/api/v1/approvals/pending",
            None,
        )
        .await;
    assert_eq!(pending.status(), StatusCode::OK);
    let pending = response_json(pending).await;
    assert_eq!(pending["data"].as_array().map(Vec::len), Some(1));

    let self_decision = app
        .request_as(
            &app.users.requester,
            Method::POST,
            &format!("/api/v1/initiations/{}/manager-decision", id),
            Some(json!({ "action": "APPROVE" })),
        )
        .await;
    assert_eq!(self_decision.status(), StatusCode::FORBIDDEN);
    let error = response_json(self_decision).await;
    assert_eq!(error["success"], false);

    let decided = app
        .request_as(
            &app.users.manager,
            Method::POST,
            &format!("/api/v1/initiations/{}/decision", id),
            Some(json!({ "action": "APPROVE", "comments": "Fine by me" })),
        )
        .await;
    assert_eq!(decided.status(), StatusCode::OK);
    let body = response_json(decided).await;
    assert_eq!(body["data"]["status"], "MANAGER_APPROVED");

    let repeated = app
        .request_as(
            &app.users.manager,
            Method::POST,
            &format!("/api/v1/initiations/{}/manager-decision", id),
            Some(json!({ "action": "APPROVE" })),
        )
        .await;
    assert_eq!(repeated.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn incomplete_submission_is_a_bad_request() {
    let app = TestApp::new().await;
    let mut body = initiation_body("Half Baked", "half@baked.test", true);
    body["dueDiligenceCompleted"] = json!(false);

    let response = app
        .request_as(
            &app.users.requester,
            Method::POST,
            "/api/v1/initiations",
            Some(body),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn supplier_form_is_reachable_with_the_emailed_token() {
    let app = TestApp::new().await;
    let emailed = app.emailed_supplier("Public Form Co", "public@form.test").await;

    let context = app
        .request(
            Method::GET,
            &format!("/api/v1/supplier-form/{}", emailed.token),
            None,
            None,
        )
        .await;
    assert_eq!(context.status(), StatusCode::OK);
    let context = response_json(context).await;
    assert_eq!(context["data"]["supplierName"], "Public Form Co");
    assert_eq!(context["data"]["submittedVersions"], 0);

    let content = base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.4 registration");
    let submitted = app
        .request(
            Method::POST,
            "/api/v1/supplier-form/submit",
            Some(json!({
                "onboardingToken": emailed.token,
                "companyName": "Public Form Co (Pty) Ltd",
                "contactEmail": "public@form.test",
                "contactPerson": "Thabo Contact",
                "files": [{
                    "category": "companyRegistration",
                    "fileName": "cipc.pdf",
                    "contentType": "application/pdf",
                    "contentBase64": content
                }]
            })),
            None,
        )
        .await;
    assert_eq!(submitted.status(), StatusCode::CREATED);
    let receipt = response_json(submitted).await;
    assert_eq!(receipt["data"]["version"], 1);
    assert_eq!(receipt["data"]["filesStored"], 1);

    let unknown = app
        .request(Method::GET, "/api/v1/supplier-form/init_unknown_1", None, None)
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn analysis_of_unknown_job_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .request_as(
            &app.users.procurement,
            Method::GET,
            &format!("/api/v1/ai-analysis/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
