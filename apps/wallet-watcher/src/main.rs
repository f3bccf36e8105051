//! Wallet Watcher Binary
//!
//! Starts the watch-list stream supervisor.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin wallet-watcher
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `GRPC_URL`: Yellowstone gRPC endpoint
//!
//! ## Optional
//! - `X_TOKEN`: Access token sent as the `x-token` header
//! - `WATCHER_SESSION_COUNT`: Number of streams (default: 3)
//! - `WATCHER_PING_INTERVAL_SECS`: Keepalive ping interval (default: 60)
//! - `WATCHER_REBALANCE_INTERVAL_SECS`: Rebalance interval (default: 30)
//! - `WATCHER_REBALANCE_MODE`: "update" | "destroy" (default: update)
//! - `WATCHER_ADDRESSES`: Comma-separated watch-list (default: built-in list)
//! - `GRPC_KEEPALIVE_INTERVAL_MS`: HTTP/2 ping interval (default: 30000)
//! - `GRPC_KEEPALIVE_TIMEOUT_MS`: HTTP/2 ping timeout (default: 43200000)
//! - `GRPC_KEEPALIVE_PERMIT_WITHOUT_CALLS`: Ping while idle (default: true)
//! - `GRPC_MAX_PINGS_WITHOUT_DATA`: Logged only (default: 0)
//! - `WATCHER_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: wallet-watcher)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use wallet_watcher::infrastructure::health::{HealthServer, HealthServerState};
use wallet_watcher::infrastructure::telemetry;
use wallet_watcher::{GeyserTransport, StreamSupervisor, WatcherConfig, init_metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    load_dotenv();

    // Initialize telemetry (tracing + OpenTelemetry)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting wallet watcher");

    let _metrics_handle = init_metrics();

    let config = match WatcherConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e).context("loading configuration");
        }
    };
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let transport = GeyserTransport::new(&config.geyser, config.supervisor.session_count)
        .context("building Geyser transport")?;
    let supervisor = StreamSupervisor::new(
        config.supervisor.clone(),
        transport,
        config.watchlist.clone(),
        shutdown_token.child_token(),
    );

    if config.server.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            supervisor.status(),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let supervisor_task = tokio::spawn(supervisor.run());

    tracing::info!("Wallet watcher ready");

    await_shutdown(shutdown_token).await;

    if let Err(e) = supervisor_task.await {
        tracing::error!(error = %e, "Stream supervisor task failed");
    }

    tracing::info!("Wallet watcher stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &WatcherConfig) {
    tracing::info!(
        url = %config.geyser.url,
        token = config.geyser.x_token().is_some(),
        sessions = config.supervisor.session_count,
        accounts = config.watchlist.len(),
        ping_interval_secs = config.supervisor.ping_interval.as_secs(),
        rebalance_interval_secs = config.supervisor.rebalance_interval.as_secs(),
        rebalance_mode = config.supervisor.rebalance_mode.as_str(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(addresses = ?config.watchlist.addresses(), "Watch-list");
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
    tracing::info!("Tearing down streams");
}
