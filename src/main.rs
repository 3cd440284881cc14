use std::{net::SocketAddr, sync::Arc, time::Duration};

use http::HeaderValue;
use tokio::sync::mpsc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing::{info, warn};

use supplier_onboarding_api as api;
use api::config::AppConfig;
use api::services::reminders::ReminderService;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let cors = build_cors(&cfg)?;
    let (state, auth) = bootstrap(cfg.clone()).await?;

    let app = api::app_router(state, auth)
        .layer(CompressionLayer::new())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, environment = %cfg.environment, "supplier onboarding api ready");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    info!("server stopped");
    Ok(())
}

/// Connects storage, the event loop and the workflow services.
async fn bootstrap(
    cfg: AppConfig,
) -> Result<(api::AppState, Arc<api::auth::AuthService>), BoxError> {
    let db = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        if let Err(e) = api::db::run_migrations(&db).await {
            tracing::error!(error = %e, "schema migration failed");
            return Err(e.into());
        }
    }
    let db = Arc::new(db);

    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    tokio::spawn(api::events::process_events(event_rx));
    let events = Arc::new(api::events::EventSender::new(event_tx));

    let auth = Arc::new(api::auth::AuthService::new(api::auth::AuthConfig::new(
        cfg.jwt_secret.clone(),
        Duration::from_secs(cfg.jwt_expiration as u64),
    )));

    let logger = api::logging::setup_logger(api::logging::LoggerConfig::default());
    let collaborators = api::handlers::Collaborators::from_config(&cfg, &logger)?;
    let services =
        api::handlers::AppServices::new(db.clone(), events.clone(), &cfg, collaborators, &logger);
    if let Some(secs) = cfg.workflow.reminder_interval_secs.filter(|secs| *secs > 0) {
        tokio::spawn(run_reminders(
            services.reminders.clone(),
            Duration::from_secs(secs),
        ));
    }

    let state = api::AppState {
        db,
        config: cfg,
        event_sender: events,
        services,
    };
    Ok((state, auth))
}

/// Runs the reminder sweep on a fixed period for the life of the process.
async fn run_reminders(reminders: Arc<ReminderService>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if let Err(e) = reminders.check(chrono::Utc::now()).await {
            warn!(error = %e, "reminder sweep failed");
        }
    }
}

fn build_cors(cfg: &AppConfig) -> Result<CorsLayer, BoxError> {
    let origins: Vec<HeaderValue> = cfg
        .allowed_origins()
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    if !origins.is_empty() {
        return Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any));
    }
    if cfg.should_allow_permissive_cors() {
        warn!(environment = %cfg.environment, "no CORS origins configured, allowing any origin");
        return Ok(CorsLayer::permissive());
    }
    Err("no usable CORS origins in APP__CORS_ALLOWED_ORIGINS".into())
}

async fn wait_for_shutdown() {
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("interrupt received, draining connections"),
        _ = terminate => info!("terminate received, draining connections"),
    }
}
