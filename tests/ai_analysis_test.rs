mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use supplier_onboarding_api::{
    entities::{
        ai_analysis_job,
        enums::{AiMode, JobStatus},
    },
    errors::ServiceError,
    models::DocumentCategory,
    services::onboarding::{SupplierFormFields, SupplierFormSubmission},
};
use uuid::Uuid;

use common::{pdf, TestApp};

async fn supplier_with_documents(app: &TestApp, email: &str) -> Uuid {
    app.state
        .services
        .onboarding
        .submit_supplier_form(SupplierFormSubmission {
            onboarding_token: None,
            fields: SupplierFormFields {
                company_name: format!("Analysed {}", email),
                contact_email: email.to_string(),
                ..Default::default()
            },
            files: vec![
                pdf(DocumentCategory::CompanyRegistration, "cipc.pdf"),
                pdf(DocumentCategory::BankConfirmation, "bank.pdf"),
                pdf(DocumentCategory::TaxClearance, "tax.pdf"),
            ],
        })
        .await
        .expect("form submission")
        .supplier_id
}

async fn wait_until_finished(app: &TestApp, job_id: Uuid) -> ai_analysis_job::Model {
    for _ in 0..200 {
        let job = app.state.services.ai_analysis.get(job_id).await.unwrap();
        if !job.status.is_active() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("analysis job {} did not finish", job_id);
}

#[tokio::test]
async fn job_scores_the_latest_version() {
    let app = TestApp::new().await;
    let supplier_id = supplier_with_documents(&app, "scored@analysis.test").await;

    let outcome = app.state.services.ai_analysis.start(supplier_id).await.unwrap();
    assert!(!outcome.already_running);
    assert_eq!(outcome.job.total_documents, 3);

    let job = wait_until_finished(&app, outcome.job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.processed_documents, 3);
    assert_eq!(job.ai_mode, AiMode::Ollama);
    assert!(job.completed_at.is_some());

    let summary = job.summary.expect("summary");
    assert_eq!(summary["totalDocuments"], 3);
    assert_eq!(summary["processedDocuments"], 3);
    assert_eq!(summary["aiMode"], "ollama");
    let score = summary["overallScore"].as_f64().expect("score");
    assert!((0.0..=100.0).contains(&score));
    assert!(job.results.is_some());
    assert!(job
        .logs
        .0
        .iter()
        .any(|line| line.contains("Analysis completed")));

    let latest = app
        .state
        .services
        .ai_analysis
        .latest(supplier_id)
        .await
        .unwrap()
        .expect("latest job");
    assert_eq!(latest.id, job.id);
}

#[tokio::test]
async fn offline_backend_falls_back_to_simplified_mode() {
    let app = TestApp::new().await;
    app.backend.set_offline(true);
    let supplier_id = supplier_with_documents(&app, "offline@analysis.test").await;

    let outcome = app.state.services.ai_analysis.start(supplier_id).await.unwrap();
    let job = wait_until_finished(&app, outcome.job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.ai_mode, AiMode::Simplified);
    assert_eq!(job.processed_documents, 3);
}

#[tokio::test]
async fn second_start_returns_the_running_job() {
    let app = TestApp::new().await;
    app.backend.hold();
    let supplier_id = supplier_with_documents(&app, "busy@analysis.test").await;
    let analysis = &app.state.services.ai_analysis;

    let first = analysis.start(supplier_id).await.unwrap();
    let second = analysis.start(supplier_id).await.unwrap();
    assert!(second.already_running);
    assert_eq!(second.job.id, first.job.id);

    analysis.cancel(first.job.id, "test teardown").await.unwrap();
}

#[tokio::test]
async fn cancelled_job_fails_and_frees_the_supplier() {
    let app = TestApp::new().await;
    app.backend.hold();
    let supplier_id = supplier_with_documents(&app, "cancel@analysis.test").await;
    let analysis = &app.state.services.ai_analysis;

    let started = analysis.start(supplier_id).await.unwrap();
    let cancelled = analysis
        .cancel(started.job.id, "supplier withdrew")
        .await
        .unwrap();
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(
        cancelled.error_message.as_deref(),
        Some("Cancelled: supplier withdrew")
    );
    assert!(cancelled.failed_at.is_some());

    let again = analysis.cancel(started.job.id, "twice").await;
    assert_matches!(again, Err(ServiceError::InvalidOperation(_)));

    let restarted = analysis.start(supplier_id).await.unwrap();
    assert!(!restarted.already_running);
    assert_ne!(restarted.job.id, started.job.id);
    analysis.cancel(restarted.job.id, "test teardown").await.unwrap();
}

#[tokio::test]
async fn cancelling_keeps_every_logged_line() {
    let app = TestApp::new().await;
    app.backend.hold();
    let supplier_id = supplier_with_documents(&app, "logs@analysis.test").await;
    let analysis = &app.state.services.ai_analysis;

    let started = analysis.start(supplier_id).await.unwrap();
    let mut running = analysis.get(started.job.id).await.unwrap();
    for _ in 0..200 {
        if running
            .logs
            .0
            .iter()
            .any(|line| line.contains("Checking AI backend status"))
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        running = analysis.get(started.job.id).await.unwrap();
    }
    assert_eq!(running.status, JobStatus::InProgress);
    let before = running.logs.0.clone();
    assert!(before.len() >= 3);

    let cancelled = analysis
        .cancel(started.job.id, "operator abort")
        .await
        .unwrap();
    let after = cancelled.logs.0;
    assert_eq!(after.len(), before.len() + 1);
    assert_eq!(&after[..before.len()], &before[..]);
    assert!(after
        .last()
        .is_some_and(|line| line.ends_with("Cancelled: operator abort")));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = analysis.get(started.job.id).await.unwrap();
    assert_eq!(settled.status, JobStatus::Failed);
    assert_eq!(settled.logs.0, after);
}

#[tokio::test]
async fn supplier_without_documents_cannot_be_analysed() {
    let app = TestApp::new().await;
    let emailed = app.emailed_supplier("Empty Handed", "empty@analysis.test").await;

    let result = app.state.services.ai_analysis.start(emailed.supplier_id).await;
    assert_matches!(result, Err(ServiceError::BadRequest(msg)) if msg.contains("No documents"));
}

#[tokio::test]
async fn unknown_supplier_and_job_are_not_found() {
    let app = TestApp::new().await;
    let analysis = &app.state.services.ai_analysis;

    assert_matches!(
        analysis.start(Uuid::new_v4()).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        analysis.get(Uuid::new_v4()).await,
        Err(ServiceError::NotFound(_))
    );
}
