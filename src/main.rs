//! referral_ledger - reconciliation daemon
//!
//! ```text
//! ┌──────────┐    ┌────────────┐    ┌─────────────┐    ┌──────────┐
//! │  Config  │───▶│ PostgreSQL │───▶│ Reconcile   │───▶│ Notifier │
//! │  (YAML)  │    │ (migrate)  │    │ (interval)  │    │  (log)   │
//! └──────────┘    └────────────┘    └─────────────┘    └──────────┘
//! ```
//!
//! Usage: `referral_ledger [--env dev]`

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use referral_ledger::config::AppConfig;
use referral_ledger::db::Database;
use referral_ledger::notify::{ChannelNotifier, spawn_log_sink};
use referral_ledger::reconciliation::{JobConfig, ReconciliationJob};
use referral_ledger::referral::{PgOrderStatusSource, ReferralEventProcessor};
use referral_ledger::store::PgLedgerStore;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == "--env" || a == "-e")
        .and_then(|i| args.get(i + 1).cloned())
        .unwrap_or_else(|| "dev".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = referral_ledger::logging::init_logging(&app_config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        "Starting referral ledger in {} mode",
        env
    );

    let postgres_url = app_config
        .postgres_url
        .as_deref()
        .context("postgres_url is not configured")?;
    let db = Arc::new(
        Database::connect(postgres_url, &app_config.database)
            .await
            .context("Failed to connect to PostgreSQL")?,
    );
    db.health_check().await.context("PostgreSQL health check failed")?;
    db.migrate().await.context("Failed to apply migrations")?;

    let (notifier, notifications) = ChannelNotifier::new(app_config.notifications.queue_size);
    let sink = spawn_log_sink(notifications);

    let store = Arc::new(PgLedgerStore::new(db.clone()));
    let processor = Arc::new(ReferralEventProcessor::new(
        store.clone(),
        Arc::new(notifier),
        app_config.withdrawal.operation_timeout(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let job_handle = if app_config.reconciliation.enabled {
        let job = ReconciliationJob::new(
            store,
            Arc::new(PgOrderStatusSource::new(db.pool().clone())),
            processor,
            JobConfig::from(&app_config.reconciliation),
        );
        Some(tokio::spawn(async move { job.run(shutdown_rx).await }))
    } else {
        tracing::warn!("Reconciliation job disabled by configuration");
        drop(processor);
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = job_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Reconciliation task panicked");
        }
    }

    // Last sender went away with the processor; the sink drains and exits.
    if let Err(e) = sink.await {
        tracing::error!(error = %e, "Notification sink panicked");
    }

    tracing::info!("Referral ledger stopped");
    Ok(())
}
