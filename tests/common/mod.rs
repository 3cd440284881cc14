#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use bytes::Bytes;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::{json, Value};
use supplier_onboarding_api::{
    app_router,
    auth::{AuthConfig, AuthService, AuthUser},
    config::AppConfig,
    db,
    entities::{
        enums::{BusinessUnit, PaymentMethod, PurchaseType, UserRole},
        supplier_onboarding, user,
    },
    events::{self, EventSender},
    handlers::{AppServices, Collaborators},
    logging::{setup_logger, LoggerConfig},
    models::{AnnualPurchaseValue, DocumentCategory},
    notifications::{EmailDispatcher, EmailMessage, EmailReceipt, NotificationError},
    services::ai_backend::{
        AiBackend, AiBackendError, HealthReport, ProcessRequest, ProcessedDocument,
        UploadedDocument,
    },
    services::document_store::InMemoryDocumentStore,
    services::initiations::{DecisionAction, DecisionRequest, InitiationInput},
    services::onboarding::UploadedFile,
    services::package::SummaryPackageGenerator,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: &str =
    "test_secret_key_for_supplier_onboarding_integration_tests_0123456789abcdef";

/// Captures outbound email; can be switched to fail every send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<EmailMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.to == address)
            .collect()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmailDispatcher for RecordingMailer {
    async fn send_email(&self, message: EmailMessage) -> Result<EmailReceipt, NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("relay unreachable".to_string()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(EmailReceipt {
            success: true,
            message_id: Some(Uuid::new_v4().to_string()),
        })
    }
}

/// Analysis worker stand-in. While held, every call waits forever so a job
/// stays in progress.
#[derive(Default)]
pub struct FakeAiBackend {
    held: AtomicBool,
    offline: AtomicBool,
}

impl FakeAiBackend {
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    async fn gate(&self) -> Result<(), AiBackendError> {
        if self.held.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(AiBackendError::Transport("worker offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AiBackend for FakeAiBackend {
    async fn health(&self) -> Result<HealthReport, AiBackendError> {
        self.gate().await?;
        Ok(HealthReport {
            ai_mode: Some("ollama".to_string()),
            ollama_model: Some("llama3.1".to_string()),
        })
    }

    async fn upload(
        &self,
        file_name: &str,
        _bytes: Bytes,
    ) -> Result<UploadedDocument, AiBackendError> {
        self.gate().await?;
        Ok(UploadedDocument {
            document_id: format!("doc-{}", file_name),
            content: json!({ "pages": 1 }),
        })
    }

    async fn process_document(
        &self,
        request: ProcessRequest,
    ) -> Result<ProcessedDocument, AiBackendError> {
        self.gate().await?;
        Ok(ProcessedDocument {
            analysis_results: Some(format!(
                "Document {} is legible and matches the declared company",
                request.filename
            )),
            compliance_results: Some("Compliant".to_string()),
            risk_assessment: Some("Low risk".to_string()),
            ..Default::default()
        })
    }
}

/// Users seeded into every test database.
pub struct Users {
    pub requester: user::Model,
    pub manager: user::Model,
    pub other_manager: user::Model,
    pub procurement: user::Model,
    pub specialist: user::Model,
    pub admin: user::Model,
    pub orphan: user::Model,
}

pub fn actor(user: &user::Model) -> AuthUser {
    AuthUser {
        user_id: user.id,
        name: Some(user.name.clone()),
        email: Some(user.email.clone()),
        roles: vec![user.role.to_string()],
        token_id: Uuid::new_v4().to_string(),
    }
}

/// Application wired against in-memory SQLite and fake collaborators.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub auth: Arc<AuthService>,
    pub mailer: Arc<RecordingMailer>,
    pub store: Arc<InMemoryDocumentStore>,
    pub backend: Arc<FakeAiBackend>,
    pub users: Users,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.email.app_base_url = "http://portal.test".to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("in-memory database");
        db::run_migrations(&pool).await.expect("migrations");
        let db = Arc::new(pool);

        let users = seed_users(&db).await;

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(events::process_events(rx));
        let event_sender = Arc::new(EventSender::new(tx));

        let mailer = Arc::new(RecordingMailer::default());
        let store = Arc::new(InMemoryDocumentStore::new());
        let backend = Arc::new(FakeAiBackend::default());
        let collaborators = Collaborators {
            email: mailer.clone(),
            store: store.clone(),
            ai_backend: backend.clone(),
            packages: Arc::new(SummaryPackageGenerator),
        };

        let logger = setup_logger(LoggerConfig::quiet());
        let services = AppServices::new(
            db.clone(),
            event_sender.clone(),
            &cfg,
            collaborators,
            &logger,
        );
        let state = AppState {
            db,
            config: cfg.clone(),
            event_sender,
            services,
        };

        let auth = Arc::new(AuthService::new(AuthConfig::new(
            cfg.jwt_secret.clone(),
            Duration::from_secs(3600),
        )));
        let router = app_router(state.clone(), auth.clone());

        Self {
            router,
            state,
            auth,
            mailer,
            store,
            backend,
            users,
        }
    }

    pub fn token_for(&self, user: &user::Model) -> String {
        self.auth.issue_token(user).expect("token")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn request_as(
        &self,
        user: &user::Model,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let token = self.token_for(user);
        self.request(method, uri, body, Some(&token)).await
    }
}

/// An onboarding created by a fully approved initiation and emailed to the supplier.
pub struct EmailedSupplier {
    pub initiation_id: Uuid,
    pub supplier_id: Uuid,
    pub token: String,
}

impl TestApp {
    pub async fn emailed_supplier(&self, name: &str, email: &str) -> EmailedSupplier {
        let initiations = &self.state.services.initiations;
        let approve = || DecisionRequest {
            action: DecisionAction::Approve,
            comments: None,
        };
        let initiation = initiations
            .create(&actor(&self.users.requester), complete_input(name, email), true)
            .await
            .expect("submitted initiation");
        initiations
            .manager_decision(&actor(&self.users.manager), initiation.id, approve())
            .await
            .expect("manager approval");
        initiations
            .procurement_decision(&actor(&self.users.procurement), initiation.id, approve())
            .await
            .expect("procurement approval");

        let onboarding = supplier_onboarding::Entity::find()
            .filter(supplier_onboarding::Column::InitiationId.eq(initiation.id))
            .one(&*self.state.db)
            .await
            .expect("onboarding query")
            .expect("onboarding record");
        EmailedSupplier {
            initiation_id: initiation.id,
            supplier_id: onboarding.supplier_id,
            token: onboarding.onboarding_token,
        }
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

async fn insert_user(
    db: &db::DbPool,
    name: &str,
    email: &str,
    role: UserRole,
    manager_id: Option<Uuid>,
) -> user::Model {
    user::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        role: Set(role),
        manager_id: Set(manager_id),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed user")
}

async fn seed_users(db: &db::DbPool) -> Users {
    let manager = insert_user(db, "Mandla Manager", "manager@example.com", UserRole::Manager, None).await;
    let other_manager = insert_user(
        db,
        "Olivia Manager",
        "olivia@example.com",
        UserRole::Manager,
        None,
    )
    .await;
    let procurement = insert_user(
        db,
        "Priya Procurement",
        "procurement@example.com",
        UserRole::ProcurementManager,
        None,
    )
    .await;
    let specialist = insert_user(
        db,
        "Sam Specialist",
        "specialist@example.com",
        UserRole::ProcurementSpecialist,
        None,
    )
    .await;
    let admin = insert_user(db, "Ada Admin", "admin@example.com", UserRole::Admin, None).await;
    let requester = insert_user(
        db,
        "Riley Requester",
        "requester@example.com",
        UserRole::User,
        Some(manager.id),
    )
    .await;
    let orphan = insert_user(db, "Noah Nomanager", "orphan@example.com", UserRole::User, None).await;

    Users {
        requester,
        manager,
        other_manager,
        procurement,
        specialist,
        admin,
        orphan,
    }
}

/// A regular purchase with a credit application; passes every submission rule.
pub fn complete_input(supplier_name: &str, supplier_email: &str) -> InitiationInput {
    InitiationInput {
        requester_name: Some("Riley Requester".to_string()),
        supplier_name: Some(supplier_name.to_string()),
        supplier_email: Some(supplier_email.to_string()),
        supplier_contact_person: Some("Thabo Contact".to_string()),
        business_units: Some(vec![BusinessUnit::SchauenburgSystems200]),
        product_service_category: Some("Electrical components".to_string()),
        purchase_type: Some(PurchaseType::Regular),
        payment_method: Some(PaymentMethod::Ac),
        cod_reason: None,
        annual_purchase_value: Some(AnnualPurchaseValue::Amount(Decimal::from(250_000))),
        credit_application: Some(true),
        credit_application_reason: None,
        onboarding_reason: Some("New supplier for conveyor parts".to_string()),
        relationship_declaration: Some("No relationship".to_string()),
        process_read_understood: Some(true),
        due_diligence_completed: Some(true),
    }
}

pub fn pdf(category: DocumentCategory, file_name: &str) -> UploadedFile {
    UploadedFile {
        category,
        file_name: file_name.to_string(),
        content_type: "application/pdf".to_string(),
        bytes: Bytes::from_static(b"%PDF-1.4 test document"),
    }
}
