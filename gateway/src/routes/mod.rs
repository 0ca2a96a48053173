//! HTTP surface of the gateway.

pub mod management;
pub mod proxy;

use std::path::Path;
use std::sync::Arc;

use axum::http::header;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use inference_common::envelope::{error_body, stamp_gateway};
use inference_common::protocol::{DOWNLOAD_FILE_COMMAND, DOWNLOAD_FILE_PATH};

use crate::error::Result;
use crate::logging::request_logger;
use crate::state::AppState;

/// Management routes plus one proxy route per discovered path.
pub fn app(state: Arc<AppState>, paths: &[String]) -> Router {
    Router::new()
        .merge(management::router(state.clone()))
        .merge(proxy::router(state, paths))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(request_logger))
        .layer(TraceLayer::new_for_http())
}

/// Render a handler result: errors become `{"ERROR": ...}`, every body is
/// stamped, and a `DOWNLOAD` directive turns into a file response.
pub async fn reply(state: &AppState, result: Result<Value>) -> Response {
    let value = match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("{}", e);
            Value::Object(error_body(e.to_string()))
        }
    };

    if let Some(path) = download_path(&value) {
        return send_file(state, &path).await;
    }

    Json(stamp_gateway(
        value,
        &state.config.app_version,
        state.uptime_secs(),
    ))
    .into_response()
}

fn download_path(value: &Value) -> Option<String> {
    value
        .get(DOWNLOAD_FILE_COMMAND)?
        .get(DOWNLOAD_FILE_PATH)?
        .as_str()
        .map(str::to_string)
}

async fn send_file(state: &AppState, path: &str) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let filename = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "download".to_string());
            tracing::info!("Sending file {} ({} bytes)", path, bytes.len());
            (
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Cannot send file {}: {}", path, e);
            let body = Value::Object(error_body(format!("Cannot send file {}: {}", path, e)));
            Json(stamp_gateway(
                body,
                &state.config.app_version,
                state.uptime_secs(),
            ))
            .into_response()
        }
    }
}
