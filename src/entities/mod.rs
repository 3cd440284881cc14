pub mod ai_analysis_job;
pub mod enums;
pub mod manager_approval;
pub mod onboarding_timeline;
pub mod procurement_approval;
pub mod reminder_log;
pub mod supplier;
pub mod supplier_initiation;
pub mod supplier_onboarding;
pub mod user;
pub mod user_delegation;
