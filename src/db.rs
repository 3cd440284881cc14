use crate::config::AppConfig;
use crate::errors::{AppError, ServiceError};
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr, SqlErr};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub type DbPool = DatabaseConnection;

/// Pool sizing and timeouts.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Opens the pool. In-memory SQLite is pinned to a single connection so
/// every query sees the schema the migrations created.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, AppError> {
    let in_memory = is_in_memory(&config.url);
    let (max, min) = if in_memory {
        (1, 1)
    } else {
        (config.max_connections, config.min_connections)
    };

    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(max)
        .min_connections(min)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(false);
    if !in_memory {
        options.idle_timeout(config.idle_timeout);
    }

    gauge!("supplier_onboarding_db.max_connections", max as f64);
    let pool = Database::connect(options).await?;
    info!(max_connections = max, in_memory, "database pool ready");
    Ok(pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, AppError> {
    establish_connection_with_config(&DbConfig::from(cfg)).await
}

/// Applies every pending migration.
pub async fn run_migrations(pool: &DbPool) -> Result<(), AppError> {
    let started = Instant::now();
    crate::migrator::Migrator::up(pool, None)
        .await
        .inspect_err(|e| error!(error = %e, "migrations failed"))?;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "migrations applied");
    Ok(())
}

/// Round-trips a ping and records its latency.
pub async fn check_connection(pool: &DbPool) -> Result<(), AppError> {
    let started = Instant::now();
    match pool.ping().await {
        Ok(()) => {
            let latency = started.elapsed();
            debug!(latency_ms = latency.as_millis() as u64, "database ping");
            gauge!("supplier_onboarding_db.ping_ms", latency.as_millis() as f64);
            Ok(())
        }
        Err(e) => {
            counter!("supplier_onboarding_db.ping_failures", 1);
            Err(e.into())
        }
    }
}

/// True when the error is a unique-constraint violation on either backend.
pub fn is_unique_violation(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }
    let message = err.to_string().to_ascii_lowercase();
    ["unique constraint", "duplicate key", "unique violation"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Turns a unique-constraint violation into a `Conflict`; other errors pass through.
pub fn map_unique_violation(err: DbErr, message: impl Into<String>) -> ServiceError {
    if is_unique_violation(&err) {
        ServiceError::Conflict(message.into())
    } else {
        ServiceError::DatabaseError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_pool_connects_and_migrates() {
        let pool = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".into(),
            ..Default::default()
        })
        .await
        .expect("connect");
        run_migrations(&pool).await.expect("migrate");
        assert!(check_connection(&pool).await.is_ok());
    }

    #[test]
    fn unique_violation_is_recognised() {
        let err = DbErr::Custom("UNIQUE constraint failed: suppliers.contact_email".into());
        assert!(is_unique_violation(&err));
        assert!(matches!(
            map_unique_violation(err, "duplicate"),
            ServiceError::Conflict(_)
        ));
        assert!(!is_unique_violation(&DbErr::RecordNotFound("x".into())));
    }
}
