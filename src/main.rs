use snapshot_worker::application::actors::{SchedulerActor, SchedulerHandle};
use snapshot_worker::application::handlers::{router, AppState};
use snapshot_worker::application::services::{CycleService, LedgerLoader, LedgerSource};
use snapshot_worker::auth::BearerToken;
use snapshot_worker::config::WorkerConfig;
use snapshot_worker::domain::repositories::{RestBackend, StatusProvider};
use snapshot_worker::infrastructure::{DeployNotifier, PostgrestClient, TradingStatusClient};
use snapshot_worker::persistence::{init_database, SqliteStateStore};
use snapshot_worker::rate_limit::{build_limiter, ThrottleConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Could not read .env: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapshot_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env()?;
    info!("Snapshot worker starting: {:?}", config);

    let backend: Arc<dyn RestBackend> = Arc::new(PostgrestClient::new(config.postgrest())?);
    let status: Arc<dyn StatusProvider> = Arc::new(TradingStatusClient::new(config.trading_status())?);

    let loader = LedgerLoader::new(
        backend.clone(),
        LedgerSource {
            table: config.ledger_table.clone(),
            columns: config.ledger_columns.clone(),
            page_size: config.ledger_page_size,
            hard_limit: config.ledger_hard_limit,
            exclude_keyword: config.exclude_keyword.clone(),
        },
    );
    let mut service = CycleService::new(
        loader,
        backend.clone(),
        status,
        &config.snapshot_table,
        config.policy.clone(),
        config.account_delay,
    );
    let notifier = DeployNotifier::new(config.deploy_hook_enabled, config.deploy_hook_url.clone())?;
    if notifier.is_active() {
        service = service.with_notifier(Arc::new(notifier));
    }

    let pool = init_database(&config.database).await?;
    let store = Arc::new(
        SqliteStateStore::new(pool).with_retention(config.database.cycle_retention_days),
    );

    let (scheduler, scheduler_task) =
        SchedulerActor::new(Arc::new(service), store, config.schedule, config.run_on_start).spawn();

    match config.api.bind_addr {
        Some(addr) => {
            let state = AppState {
                backend,
                snapshot_table: config.snapshot_table.clone(),
                scheduler: Some(scheduler.clone()),
            };
            let token = config.api.bearer_token.clone().map(BearerToken::new);
            let limiter = build_limiter(ThrottleConfig {
                requests_per_minute: config.api.requests_per_minute,
            });
            let app = router(state, token, limiter, &config.api.cors_origins);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Read API listening on {}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        None => {
            info!("Read API disabled (API_BIND_ADDR not set)");
            shutdown_signal().await;
        }
    }

    stop_scheduler(scheduler, scheduler_task).await;
    info!("Shutdown complete");
    Ok(())
}

/// Stop the scheduler; a cycle in progress finishes first
async fn stop_scheduler(scheduler: SchedulerHandle, task: tokio::task::JoinHandle<()>) {
    info!("Stopping scheduler...");
    scheduler.shutdown().await;
    if let Err(e) = task.await {
        error!("Scheduler task ended abnormally: {}", e);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = wait_for_signal(
        "SIGTERM",
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()),
    );

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Completes when the signal arrives. A handler that failed to install
/// never completes, leaving Ctrl+C as the only stop signal.
#[cfg(unix)]
async fn wait_for_signal(name: &str, installed: std::io::Result<tokio::signal::unix::Signal>) {
    match installed {
        Ok(mut sig) => {
            sig.recv().await;
            info!("Received {} signal", name);
        }
        Err(e) => {
            error!("Failed to install {} handler: {}", name, e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    #[tokio::test]
    async fn test_failed_signal_install_does_not_trigger_shutdown() {
        let failed = Err(io::Error::new(io::ErrorKind::Other, "no signal driver"));
        let waited =
            tokio::time::timeout(Duration::from_millis(50), wait_for_signal("SIGTERM", failed)).await;
        assert!(waited.is_err());
    }
}
