use service_core::error::AppError;
use service_core::middleware::rate_limit::{CounterStore, InMemoryCounterStore, RedisCounterStore};
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tenant_auth::{
    build_router,
    config::AuthConfig,
    services::{
        metrics::init_metrics, EmailProvider, EmailService, LogEmailService, MongoStore,
        SmsGateway, SmsOnlineGhGateway,
    },
    AppState,
};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    init_metrics().map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting tenant auth service"
    );

    tracing::info!("Initializing database connection");
    let store = MongoStore::connect(&config.mongodb.uri, &config.mongodb.database)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    store
        .initialize_indexes()
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    tracing::info!("Database initialized successfully");

    let sms: Arc<dyn SmsGateway> = Arc::new(
        SmsOnlineGhGateway::new(&config.sms)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?,
    );

    let email: Arc<dyn EmailProvider> = match &config.smtp {
        Some(smtp) => {
            let service =
                EmailService::new(smtp).map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
            tracing::info!(host = %smtp.host, "SMTP email service initialized");
            Arc::new(service)
        }
        None => {
            tracing::warn!("SMTP_HOST not set; emails will be logged instead of sent");
            Arc::new(LogEmailService)
        }
    };

    let counters: Arc<dyn CounterStore> = match &config.redis.url {
        Some(url) => Arc::new(RedisCounterStore::connect(url).await?),
        None => {
            tracing::warn!("REDIS_URL not set; rate limit counters are per-instance");
            Arc::new(InMemoryCounterStore::new())
        }
    };

    let state = AppState::new(config.clone(), Arc::new(store), sms, email, counters);
    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(Duration::from_secs(
        config.common.shutdown_grace_seconds,
    )))
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    // In-flight requests get the configured grace period.
    tokio::time::sleep(grace).await;
}
