//! Pool resize, notification drain and path discovery.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use inference_common::protocol::{MESSAGE, NR_WORKERS};
use inference_common::{group_by_call, ApiParams, PathsResponse};

use crate::error::{Error, Result};
use crate::pool::ResizeOutcome;
use crate::state::AppState;

/// Resize the pool to `NR_WORKERS`.
pub async fn update_workers(
    State(state): State<Arc<AppState>>,
    params: ApiParams,
) -> Result<Json<Value>> {
    let target = params
        .get_u64(NR_WORKERS)
        .ok_or(Error::MissingField(NR_WORKERS))? as usize;

    let pool = Arc::clone(&state.pool);
    let outcome = tokio::task::spawn_blocking(move || pool.resize(target))
        .await
        .map_err(|e| Error::Internal(e.to_string()))??;

    let mut body = json!({ MESSAGE: "OK" });
    if let ResizeOutcome::Shrunk { deferred, .. } = outcome {
        if deferred > 0 {
            body["DEFERRED"] = json!(deferred);
        }
    }
    Ok(Json(body))
}

/// Drain the server queue and every worker queue.
pub async fn notifications(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut all = state.notifications.drain();
    all.extend(state.pool.drain_worker_notifications());
    Json(Value::Object(group_by_call(all)))
}

pub async fn get_paths(State(state): State<Arc<AppState>>) -> Json<PathsResponse> {
    Json(PathsResponse {
        paths: state.paths(),
    })
}
