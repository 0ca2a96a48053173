//! Startup phases, the path-discovery handshake and teardown.

use std::sync::Arc;

use crate::config::TimingConfig;
use crate::error::{Error, Result};
use crate::fleet::Fleet;
use crate::state::{AppState, GatewayPhase};
use crate::state_history::Transition;
use crate::supervisor::{default_paths, discover_paths};

/// Start every business endpoint and learn the routes to expose.
///
/// A failed handshake kills whatever was started.
pub async fn start_business_servers(state: &AppState) -> Result<Vec<String>> {
    let config = &state.config;
    state.set_phase(GatewayPhase::StartingBusinessServers);

    if let Some(name) = &config.default_server {
        if config.endpoint(name).is_none() {
            return Err(Error::InvalidConfig(format!(
                "default server '{}' is not a configured endpoint",
                name
            )));
        }
    }

    let started = state.fleet.start_all(false).await;
    tracing::info!("Started {} model servers: {:?}", started.len(), started);

    if config.no_startup_wait {
        let paths = default_paths(&config.servers.execution_path);
        tracing::info!("Fast startup, assuming paths {:?}", paths);
        return Ok(paths);
    }

    let result = match config.default_endpoint() {
        Some(name) => handshake(&state.fleet, name, &config.timing).await,
        None => Err(Error::InvalidConfig(
            "no business endpoint to discover paths from".to_string(),
        )),
    };

    match result {
        Ok(paths) => Ok(paths),
        Err(e) => {
            tracing::error!("Startup failed: {}. Killing all servers", e);
            state.fleet.kill_all(config.timing.kill_pause()).await;
            Err(e)
        }
    }
}

/// Ask `name` for its paths until it answers or the budget runs out.
pub async fn handshake(fleet: &Fleet, name: &str, timing: &TimingConfig) -> Result<Vec<String>> {
    let attempts = timing.handshake_attempts();
    let mut reason = String::new();

    for attempt in 1..=attempts {
        let record = fleet.get(name).await.ok_or_else(|| Error::Handshake {
            server: name.to_string(),
            reason: "server is not running".to_string(),
        })?;
        let base = record
            .base_url()
            .ok_or_else(|| Error::NotRoutable(name.to_string()))?;

        match discover_paths(fleet.http(), &base).await {
            Ok(paths) => {
                tracing::info!("Server '{}' exposes {:?}", name, paths);
                return Ok(paths);
            }
            Err(e) => {
                reason = e.to_string();
                tracing::info!(
                    "Waiting for '{}' to finish init ({}/{}): {}",
                    name,
                    attempt,
                    attempts,
                    reason
                );
            }
        }

        if attempt < attempts {
            tokio::time::sleep(timing.handshake_retry()).await;
        }
    }

    Err(Error::Handshake {
        server: name.to_string(),
        reason,
    })
}

/// Start the headless support processes.
pub async fn start_support_processes(state: &AppState) {
    state.set_phase(GatewayPhase::StartingSupportProcesses);
    let started = state.fleet.start_all(true).await;
    if !started.is_empty() {
        tracing::info!("Started support processes: {:?}", started);
    }
}

/// Kill every child, persist SHUTDOWN and stop serving.
///
/// Shared by the signal handler and `/shutdown`; only the first call acts.
pub async fn teardown(state: &AppState) {
    if !state.begin_teardown() {
        return;
    }
    state.set_phase(GatewayPhase::ShuttingDown);
    tracing::warn!("Gateway shutting down");

    state.fleet.close(state.config.timing.kill_pause()).await;

    if let Err(e) = state.history.record(Transition::Shutdown) {
        tracing::error!("Failed to persist shutdown: {}", e);
    }

    state.shutdown.cancel();
}

/// Wait for Ctrl+C or SIGTERM, then tear down.
pub async fn watch_signals(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
        _ = state.shutdown.cancelled() => return,
    }

    teardown(&state).await;
}
