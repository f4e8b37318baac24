//! SODAV Monitor — detection pipeline core entrypoint (§6)
//!
//! Loads configuration from the environment, opens the database pool,
//! and runs the Station Orchestrator until SIGINT/SIGTERM.

use sodav_common::{db, Config};
use sodav_monitor::Orchestrator;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(category = "DETECTION", error = %e, "configuration load failed");
            std::process::exit(1);
        }
    };

    let pool = match db::connect(&config.database_url, config.max_concurrent as u32 + 2).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(category = "DETECTION", error = %e, "database connection failed");
            std::process::exit(1);
        }
    };

    info!(
        category = "DETECTION",
        max_concurrent = config.max_concurrent,
        interval_seconds = config.interval_seconds,
        "SODAV Monitor starting"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!(category = "DETECTION", "shutdown signal received");
        signal_token.cancel();
    });

    let orchestrator = Orchestrator::new(pool, config);
    if let Err(e) = orchestrator.run(shutdown).await {
        error!(category = "DETECTION", error = %e, "orchestrator exited with error");
        std::process::exit(1);
    }

    info!(category = "DETECTION", "SODAV Monitor shut down cleanly");
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
