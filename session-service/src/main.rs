use service_core::observability::init_tracing;
use session_service::config::SessionConfig;
use session_service::db::{create_pool, run_migrations};
use session_service::services::{CredentialMaintenance, JwtService, SystemClock};
use session_service::store::{CredentialStore, PgCredentialStore};
use std::sync::Arc;
use tokio::signal;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = SessionConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    )?;

    tracing::info!(
        service_name = %config.service_name,
        service_version = %config.service_version,
        environment = ?config.environment,
        "Starting session service"
    );

    let clock = Arc::new(SystemClock);

    // A missing signing key must stop the process here, not on first login.
    JwtService::new(&config.jwt, clock.clone()).map_err(|e| {
        tracing::error!(error = %e, "Access token issuer unavailable");
        e
    })?;

    let pool = create_pool(&config.database).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to connect to PostgreSQL");
        e
    })?;
    run_migrations(&pool).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to run migrations");
        e
    })?;

    let store: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pool));
    store.health_check().await?;

    let maintenance = CredentialMaintenance::new(store, clock, &config.maintenance);
    let shutdown_token = maintenance.shutdown_token();
    let maintenance_handle = tokio::spawn(maintenance.run());

    shutdown_signal().await;

    shutdown_token.cancel();
    maintenance_handle.await?;

    tracing::info!("Session service stopped");
    Ok(())
}
