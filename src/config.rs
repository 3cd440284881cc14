use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Outbound email settings handed to the email dispatcher at start-up.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    /// When false, messages are logged instead of relayed
    #[serde(default)]
    pub enabled: bool,

    /// HTTP mail relay endpoint accepting `{to, subject, content, metadata}`
    #[serde(default)]
    pub relay_url: Option<String>,

    #[serde(default = "default_from_address")]
    #[validate(length(min = 3))]
    pub from_address: String,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    #[serde(default = "default_email_timeout_secs")]
    pub timeout_secs: u64,

    /// Public base URL used to build supplier onboarding links
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            relay_url: None,
            from_address: default_from_address(),
            from_name: default_from_name(),
            timeout_secs: default_email_timeout_secs(),
            app_base_url: default_app_base_url(),
        }
    }
}

impl EmailConfig {
    /// Link a supplier follows to open (or reopen) their onboarding form.
    pub fn onboarding_link(&self, token: &str) -> String {
        format!(
            "{}/supplier-onboarding-form?token={}",
            self.app_base_url.trim_end_matches('/'),
            token
        )
    }

    pub fn approvals_link(&self) -> String {
        format!("{}/approvals", self.app_base_url.trim_end_matches('/'))
    }

    /// Admin page where a submitted supplier is reviewed.
    pub fn review_link(&self, supplier_id: uuid::Uuid) -> String {
        format!(
            "{}/admin/supplier-submissions/{}",
            self.app_base_url.trim_end_matches('/'),
            supplier_id
        )
    }
}

/// Document-analysis backend settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AiBackendConfig {
    #[serde(default = "default_ai_base_url")]
    #[validate(length(min = 1))]
    pub base_url: String,

    #[serde(default = "default_ai_health_timeout_secs")]
    pub health_timeout_secs: u64,

    #[serde(default = "default_ai_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Number of failures before the circuit breaker opens
    #[serde(default = "default_circuit_breaker_failures")]
    pub circuit_breaker_failure_threshold: u32,

    /// Circuit breaker reset timeout in seconds
    #[serde(default = "default_circuit_breaker_timeout")]
    pub circuit_breaker_timeout_secs: u64,
}

impl Default for AiBackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            health_timeout_secs: default_ai_health_timeout_secs(),
            request_timeout_secs: default_ai_request_timeout_secs(),
            circuit_breaker_failure_threshold: default_circuit_breaker_failures(),
            circuit_breaker_timeout_secs: default_circuit_breaker_timeout(),
        }
    }
}

impl AiBackendConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory for `{supplierCode}/v{version}/{category}/{filename}` documents
    #[serde(default = "default_storage_root")]
    pub root_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// What to do when an initiator has no active manager on record.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ManagerFallbackPolicy {
    /// Fail the submission with "no manager configured"
    #[default]
    Reject,
    /// Assign the first active MANAGER user
    FirstActiveManager,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub manager_fallback: ManagerFallbackPolicy,
    /// Hours a pending approval, invitation or revision may sit before the
    /// reminder sweep chases it
    #[serde(default = "default_reminder_after_hours")]
    pub reminder_after_hours: u32,
    /// Seconds between background reminder sweeps; unset leaves the sweep
    /// to `POST /reminders/check`
    #[serde(default)]
    pub reminder_interval_secs: Option<u64>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            manager_fallback: ManagerFallbackPolicy::default(),
            reminder_after_hours: default_reminder_after_hours(),
            reminder_interval_secs: None,
        }
    }
}

impl WorkflowConfig {
    pub fn reminder_threshold(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.reminder_after_hours))
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret key (minimum 64 characters)
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// JWT expiration time in seconds
    pub jwt_expiration: usize,

    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default = "default_api_page_size")]
    pub api_default_page_size: u64,

    #[serde(default = "default_api_max_page_size")]
    pub api_max_page_size: u64,

    /// Maximum request body size in bytes; form submissions carry base64 PDFs
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    #[serde(default)]
    #[validate]
    pub email: EmailConfig,

    #[serde(default)]
    #[validate]
    pub ai_backend: AiBackendConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything not passed in.
    pub fn new(
        database_url: String,
        jwt_secret: String,
        jwt_expiration: usize,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            api_default_page_size: default_api_page_size(),
            api_max_page_size: default_api_max_page_size(),
            max_body_size: default_max_body_size(),
            email: EmailConfig::default(),
            ai_backend: AiBackendConfig::default(),
            storage: StorageConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Non-empty entries of the comma separated origin list.
    pub fn allowed_origins(&self) -> Vec<&str> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .collect()
    }

    pub fn has_cors_allowed_origins(&self) -> bool {
        !self.allowed_origins().is_empty()
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Clamp a caller-supplied page size to the configured bounds.
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.api_default_page_size)
            .clamp(1, self.api_max_page_size)
    }

    /// Cross-field rules the derive cannot express.
    fn check_deployment_rules(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            errors.add(
                "cors_allowed_origins",
                problem(
                    "cors_origins_missing",
                    "outside development list origins in APP__CORS_ALLOWED_ORIGINS or set APP__CORS_ALLOW_ANY_ORIGIN=true",
                ),
            );
        }
        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            errors.add(
                "jwt_secret",
                problem("jwt_secret_is_dev_default", "replace the development JWT secret via APP__JWT_SECRET"),
            );
        }
        if self.email.enabled && self.email.relay_url.is_none() {
            errors.add(
                "email",
                problem("email_relay_missing", "email is enabled but APP__EMAIL__RELAY_URL is unset"),
            );
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn problem(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_api_page_size() -> u64 {
    20
}

fn default_api_max_page_size() -> u64 {
    100
}

fn default_max_body_size() -> usize {
    50 * 1024 * 1024
}

fn default_from_address() -> String {
    "procurement@localhost".to_string()
}

fn default_from_name() -> String {
    "Supplier Onboarding".to_string()
}

fn default_email_timeout_secs() -> u64 {
    10
}

fn default_app_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_ai_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_ai_health_timeout_secs() -> u64 {
    5
}

fn default_ai_request_timeout_secs() -> u64 {
    120
}

fn default_circuit_breaker_failures() -> u32 {
    5
}

fn default_circuit_breaker_timeout() -> u64 {
    60
}

fn default_reminder_after_hours() -> u32 {
    24
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/supplier-documents")
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(problem("log_level", "expected trace, debug, info, warn or error")),
    }
}

/// Rejects secrets that are long enough but trivially guessable.
fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    const WEAK: [&str; 4] = ["changeme", "password", "12345", "abcdef"];

    let secret = secret.trim();
    let lowered = secret.to_ascii_lowercase();
    let distinct = secret.chars().collect::<std::collections::HashSet<_>>().len();

    if secret.len() < 64 {
        Err(problem("jwt_secret", "needs at least 64 characters"))
    } else if distinct < 10 {
        Err(problem("jwt_secret", "needs at least 10 distinct characters"))
    } else if WEAK.iter().any(|w| lowered.contains(w)) {
        Err(problem("jwt_secret", "contains a well-known weak fragment"))
    } else {
        Ok(())
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        return Err(problem("event_channel_capacity", "must be at least 1"));
    }
    Ok(())
}

/// Installs the global fmt subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("supplier_onboarding_api={level},tower_http=info,sea_orm=warn"))
    });
    let builder = fmt().with_env_filter(filter).with_target(true);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        warn!("tracing subscriber already installed");
    }
}

/// Loads configuration from built-in defaults, then `config/default.toml`,
/// then `config/{RUN_ENV}.toml`, then `APP__*` environment variables
/// (`__` separates nested keys, as in `APP__EMAIL__RELAY_URL`).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    let config_dir = Path::new(CONFIG_DIR);
    info!(env = %run_env, files = config_dir.is_dir(), "loading configuration");

    let layered = Config::builder()
        .set_default("database_url", "sqlite://supplier_onboarding.db?mode=rwc")?
        .set_default("jwt_expiration", 3600)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // No default on purpose: every deployment must supply its own.
    if layered.get_string("jwt_secret").is_err() {
        error!("APP__JWT_SECRET is not set");
        return Err(ConfigError::NotFound("jwt_secret".into()).into());
    }

    let cfg: AppConfig = layered.try_deserialize()?;
    if let Err(e) = cfg.validate().and_then(|_| cfg.check_deployment_rules()) {
        error!(errors = %e, "configuration rejected");
        return Err(e.into());
    }

    if cfg.workflow.manager_fallback == ManagerFallbackPolicy::FirstActiveManager {
        warn!("initiators without a manager will be routed to the first active manager");
    }
    info!(environment = %cfg.environment, "configuration loaded");
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "k3x9Qw7Lz2Vb8Nm4Rt6Yp1Hs5Jd0Gf3Ua7Ce9Wi2Ox4Kq6Zl8Tn1Br5Mv3Xy7Pj0Ds".into(),
            3600,
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.check_deployment_rules().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://procurement.example.com".into());
        assert!(cfg.check_deployment_rules().is_ok());
    }

    #[test]
    fn enabled_email_requires_relay() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.email.enabled = true;
        assert!(cfg.check_deployment_rules().is_err());

        cfg.email.relay_url = Some("http://mail-relay.internal/send".into());
        assert!(cfg.check_deployment_rules().is_ok());
    }

    #[test]
    fn fallback_policy_defaults_to_reject() {
        assert_eq!(
            WorkflowConfig::default().manager_fallback,
            ManagerFallbackPolicy::Reject
        );
        let parsed: WorkflowConfig =
            serde_json::from_str(r#"{"manager_fallback":"first_active_manager"}"#).unwrap();
        assert_eq!(
            parsed.manager_fallback,
            ManagerFallbackPolicy::FirstActiveManager
        );
    }

    #[test]
    fn reminder_threshold_defaults_to_a_day() {
        let cfg = WorkflowConfig::default();
        assert_eq!(cfg.reminder_threshold(), chrono::Duration::hours(24));
        assert!(cfg.reminder_interval_secs.is_none());

        let parsed: WorkflowConfig = serde_json::from_str(
            r#"{"reminder_after_hours":48,"reminder_interval_secs":3600}"#,
        )
        .unwrap();
        assert_eq!(parsed.reminder_threshold(), chrono::Duration::hours(48));
        assert_eq!(parsed.reminder_interval_secs, Some(3600));
        assert_eq!(parsed.manager_fallback, ManagerFallbackPolicy::Reject);
    }

    #[test]
    fn onboarding_link_trims_trailing_slash() {
        let email = EmailConfig {
            app_base_url: "https://suppliers.example.com/".into(),
            ..EmailConfig::default()
        };
        assert_eq!(
            email.onboarding_link("init_abc_1"),
            "https://suppliers.example.com/supplier-onboarding-form?token=init_abc_1"
        );
    }

    #[test]
    fn page_size_is_clamped() {
        let cfg = base_config();
        assert_eq!(cfg.page_size(None), 20);
        assert_eq!(cfg.page_size(Some(0)), 1);
        assert_eq!(cfg.page_size(Some(1_000)), 100);
    }

    #[test]
    fn weak_jwt_secret_rejected() {
        assert!(validate_jwt_secret(&"a".repeat(80)).is_err());
        assert!(validate_jwt_secret("short").is_err());
    }
}
