//! Management routes: start, kill, list, system status, support reports,
//! shutdown. Every route accepts GET and POST.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};

use inference_common::protocol::{
    AVAIL_SERVERS, KILL_ALL, KILL_CMD, MESSAGE, RULE_KILL, RULE_LIST, RULE_SHUTDOWN, RULE_START,
    RULE_SUPPORT, RULE_SYS, SIGNATURE, SUPPORT_MESSAGE, SYSTEM_ALERTS, SYSTEM_HISTORY,
    SYSTEM_STATUS,
};
use inference_common::ApiParams;

use crate::error::{Error, Result};
use crate::fleet::StartOutcome;
use crate::health;
use crate::lifecycle;
use crate::routes::reply;
use crate::state::AppState;

/// Paths served by this module; proxy routes may not shadow them.
pub const MANAGEMENT_PATHS: [&str; 6] = [
    RULE_START,
    RULE_KILL,
    RULE_LIST,
    RULE_SYS,
    RULE_SUPPORT,
    RULE_SHUTDOWN,
];

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(RULE_START, get(start_server).post(start_server))
        .route(RULE_KILL, get(kill_server).post(kill_server))
        .route(RULE_LIST, get(list_servers).post(list_servers))
        .route(RULE_SYS, get(system_status).post(system_status))
        .route(RULE_SUPPORT, get(support_update_status).post(support_update_status))
        .route(RULE_SHUTDOWN, get(shutdown).post(shutdown))
        .with_state(state)
}

/// Remove `SIGNATURE` from the parameters.
pub fn take_signature(params: &mut ApiParams) -> Result<String> {
    let signature = params.get_str(SIGNATURE).ok_or(Error::MissingSignature)?;
    params.take(SIGNATURE);
    Ok(signature)
}

async fn start_server(State(state): State<Arc<AppState>>, mut params: ApiParams) -> Response {
    let result: Result<Value> = async {
        let signature = take_signature(&mut params)?;
        let message = match state.fleet.start(&signature).await? {
            StartOutcome::Started(_) => "OK.",
            StartOutcome::Disabled => "Server DISABLED.",
        };
        Ok(json!({ MESSAGE: message }))
    }
    .await;
    reply(&state, result).await
}

async fn kill_server(State(state): State<Arc<AppState>>, mut params: ApiParams) -> Response {
    let result: Result<Value> = async {
        let signature = take_signature(&mut params)?;
        if signature == KILL_ALL {
            let reports = state.fleet.kill_all(state.config.timing.kill_pause()).await;
            let killed: Vec<_> = reports.iter().map(|r| r.name.clone()).collect();
            return Ok(json!({
                MESSAGE: format!("OK. Killed {} servers.", killed.len()),
                "KILLED": killed,
            }));
        }
        let report = state.fleet.kill(&signature).await?;
        Ok(json!({ MESSAGE: report.message() }))
    }
    .await;
    reply(&state, result).await
}

async fn list_servers(State(state): State<Arc<AppState>>) -> Response {
    let statuses = state.fleet.list_status().await;
    reply(&state, Ok(json!({ AVAIL_SERVERS: statuses }))).await
}

async fn system_status(State(state): State<Arc<AppState>>) -> Response {
    let pids = state.fleet.pids().await;
    let probe = state.probe.clone();
    let snapshot = match tokio::task::spawn_blocking(move || probe.sample(&pids)).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!("Host sampling failed: {}", e);
            health::HostSnapshot::default()
        }
    };

    let reports = state.support_reports.read().await.clone();
    let body = json!({
        SYSTEM_ALERTS: health::evaluate(&snapshot),
        SYSTEM_HISTORY: state.history.snapshot(),
        SYSTEM_STATUS: health::system_status(&snapshot, &state.config.server_name, &reports),
    });
    reply(&state, Ok(body)).await
}

async fn support_update_status(
    State(state): State<Arc<AppState>>,
    mut params: ApiParams,
) -> Response {
    let result: Result<Value> = async {
        let signature = take_signature(&mut params)?;
        let message = params.get_str(SUPPORT_MESSAGE).unwrap_or_default();
        tracing::info!("<STATUS {}>: {}", signature, message);

        state
            .support_reports
            .write()
            .await
            .insert(signature, params.into_value());
        Ok(json!({ MESSAGE: "OK." }))
    }
    .await;
    reply(&state, result).await
}

async fn shutdown(State(state): State<Arc<AppState>>, mut params: ApiParams) -> Response {
    let result: Result<Value> = async {
        let signature = take_signature(&mut params)?;
        if signature.to_uppercase() != KILL_CMD {
            return Err(Error::UnknownSignature {
                signature,
                available: state.fleet.active_names().await,
            });
        }

        tracing::warn!("Shutdown requested over HTTP");
        let teardown_state = state.clone();
        tokio::spawn(async move { lifecycle::teardown(&teardown_state).await });
        Ok(json!({ MESSAGE: "OK. Shutting down." }))
    }
    .await;
    reply(&state, result).await
}
