// Pure workflow rules
pub mod approval_authorization;
pub mod document_requirements;
pub mod duplicate_guard;

// Workflow services
pub mod delegations;
pub mod initiations;
pub mod onboarding;
pub mod reminders;

// Document analysis
pub mod ai_analysis;
pub mod ai_backend;

// Storage and rendering collaborators
pub mod document_store;
pub mod package;
