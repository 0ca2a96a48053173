//! Business routes: forwarded to the model server named by `SIGNATURE`.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::any;
use axum::Router;
use serde_json::Value;

use inference_common::protocol::normalize_path;
use inference_common::ApiParams;

use crate::error::{upstream_message, Error, Result};
use crate::routes::management::{take_signature, MANAGEMENT_PATHS};
use crate::routes::reply;
use crate::state::AppState;

/// One route per path, any method.
pub fn router(state: Arc<AppState>, paths: &[String]) -> Router {
    let mut seen = HashSet::new();
    let mut router = Router::new();

    for path in paths.iter().map(|p| normalize_path(p)) {
        if MANAGEMENT_PATHS.contains(&path.as_str()) {
            tracing::warn!("Not proxying '{}': reserved by the gateway", path);
            continue;
        }
        if !seen.insert(path.clone()) {
            continue;
        }

        tracing::info!("Registering proxy route {}", path);
        let target = path.clone();
        router = router.route(
            &path,
            any(
                move |State(state): State<Arc<AppState>>, params: ApiParams| {
                    let target = target.clone();
                    async move {
                        let result = forward(&state, &target, params).await;
                        reply(&state, result).await
                    }
                },
            ),
        );
    }

    router.with_state(state)
}

/// POST the parameters, minus `SIGNATURE`, to `<child><path>` and return
/// the child's JSON body.
pub async fn forward(state: &AppState, path: &str, mut params: ApiParams) -> Result<Value> {
    let signature = take_signature(&mut params)?;

    let record = match state.fleet.get(&signature).await {
        Some(record) => record,
        None => {
            return Err(Error::UnknownSignature {
                signature,
                available: state.fleet.active_names().await,
            })
        }
    };
    let base = record
        .base_url()
        .ok_or_else(|| Error::NotRoutable(signature.clone()))?;
    let url = format!("{}{}", base, path);

    tracing::debug!("Forwarding {} to {}", signature, url);
    let response: std::result::Result<Value, reqwest::Error> = async {
        state
            .fleet
            .http()
            .post(&url)
            .json(&params.into_value())
            .send()
            .await?
            .json::<Value>()
            .await
    }
    .await;

    response.map_err(|e| {
        Error::Upstream(upstream_message(
            &url,
            record.uptime(),
            state.config.timing.cold_start_grace(),
            &e.to_string(),
        ))
    })
}
