use anyhow::Result;
use tokio::signal;

use notification_engine::config::Settings;
use notification_engine::postgres::PostgresPool;
use notification_engine::telemetry::init_telemetry;
use notification_engine::NotificationEngine;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing (and OpenTelemetry when enabled)
    let _telemetry = init_telemetry(&settings.logging, &settings.otel)?;
    tracing::info!(
        storage = %settings.storage.backend,
        jobs = %settings.jobs.backend,
        "Configuration loaded"
    );

    // Connect PostgreSQL when any backend needs it
    let pool = if settings.uses_postgres() {
        let pool = PostgresPool::new(&settings.database).await?;
        tracing::info!(url = %pool.database_url_masked(), "Using PostgreSQL");
        if settings.database.run_migrations {
            pool.run_migrations().await?;
        }
        Some(pool)
    } else {
        None
    };

    let engine = NotificationEngine::new(settings, pool.as_ref());

    let seeded = engine.backfill_default_preferences().await?;
    tracing::info!(inserted = seeded, "Default preferences ready");

    let relay = engine.attach_logging_relay();
    tracing::info!(listeners = relay.len(), "Notification engine running");

    shutdown_signal().await;

    for subscription in relay {
        subscription.unsubscribe();
    }
    engine.events.remove_all_listeners();

    if let Some(pool) = pool {
        pool.close().await;
    }

    tracing::info!("Notification engine shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
