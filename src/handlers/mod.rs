pub mod ai_analysis;
pub mod common;
pub mod delegations;
pub mod initiations;
pub mod reminders;
pub mod supplier_form;
pub mod suppliers;

use slog::Logger;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::logging::component_logger;
use crate::notifications::{dispatcher_from_config, EmailDispatcher, Notifier};
use crate::services::ai_analysis::AiAnalysisService;
use crate::services::ai_backend::{AiBackend, HttpAiBackend};
use crate::services::delegations::DelegationService;
use crate::services::document_store::{DocumentStore, FsDocumentStore};
use crate::services::initiations::InitiationService;
use crate::services::onboarding::OnboardingService;
use crate::services::package::{PackageGenerator, SummaryPackageGenerator};
use crate::services::reminders::ReminderService;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// External systems the workflow talks to. Production wiring comes from
/// config; tests swap in fakes.
#[derive(Clone)]
pub struct Collaborators {
    pub email: Arc<dyn EmailDispatcher>,
    pub store: Arc<dyn DocumentStore>,
    pub ai_backend: Arc<dyn AiBackend>,
    pub packages: Arc<dyn PackageGenerator>,
}

impl Collaborators {
    pub fn from_config(config: &AppConfig, logger: &Logger) -> Result<Self, ServiceError> {
        let ai_backend = HttpAiBackend::new(config.ai_backend.clone()).map_err(|e| {
            ServiceError::InternalError(format!("AI backend client could not be built: {}", e))
        })?;
        Ok(Self {
            email: dispatcher_from_config(&config.email, component_logger(logger, "email")),
            store: Arc::new(FsDocumentStore::new(config.storage.root_dir.clone())),
            ai_backend: Arc::new(ai_backend),
            packages: Arc::new(SummaryPackageGenerator),
        })
    }
}

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub initiations: Arc<InitiationService>,
    pub delegations: Arc<DelegationService>,
    pub onboarding: Arc<OnboardingService>,
    pub ai_analysis: Arc<AiAnalysisService>,
    pub reminders: Arc<ReminderService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        collaborators: Collaborators,
        base_logger: &Logger,
    ) -> Self {
        let notifier = Notifier::new(
            collaborators.email.clone(),
            component_logger(base_logger, "notifications"),
        );

        let initiations = Arc::new(InitiationService::new(
            db_pool.clone(),
            event_sender.clone(),
            notifier.clone(),
            config.email.clone(),
            config.workflow.clone(),
            component_logger(base_logger, "initiations"),
        ));
        let delegations = Arc::new(DelegationService::new(
            db_pool.clone(),
            event_sender.clone(),
            component_logger(base_logger, "delegations"),
        ));
        let onboarding = Arc::new(OnboardingService::new(
            db_pool.clone(),
            collaborators.store.clone(),
            collaborators.packages.clone(),
            notifier.clone(),
            config.email.clone(),
            event_sender.clone(),
            component_logger(base_logger, "onboarding"),
        ));
        let reminders = Arc::new(ReminderService::new(
            db_pool.clone(),
            notifier,
            config.email.clone(),
            config.workflow.clone(),
            event_sender.clone(),
            component_logger(base_logger, "reminders"),
        ));
        let ai_analysis = Arc::new(AiAnalysisService::new(
            db_pool,
            collaborators.ai_backend,
            collaborators.store,
            event_sender,
            component_logger(base_logger, "ai_analysis"),
        ));

        Self {
            initiations,
            delegations,
            onboarding,
            ai_analysis,
            reminders,
        }
    }
}
