//! HTTP API of a model server.

pub mod admin;
pub mod run;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use inference_common::protocol::{RULE_NOTIF, RULE_PATHS, RULE_UPDATE_WORKERS};

use crate::state::AppState;

/// Build the full router; the execution route comes from the server config.
pub fn router(state: Arc<AppState>) -> Router {
    let execution_path = state.info.execution_path.clone();

    Router::new()
        .route(&execution_path, get(run::execute).post(run::execute))
        .route(RULE_NOTIF, get(admin::notifications).post(admin::notifications))
        .route(
            RULE_UPDATE_WORKERS,
            get(admin::update_workers).post(admin::update_workers),
        )
        .route(RULE_PATHS, get(admin::get_paths).post(admin::get_paths))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
