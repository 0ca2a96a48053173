//! Server assembly: plugin resolution, initial pool and state.

use std::sync::Arc;

use crate::config::ServerArgs;
use crate::error::{Error, Result};
use crate::plugin::{PluginCatalog, PluginResolver};
use crate::pool::{WorkerPool, WorkerSpawner};
use crate::state::{AppState, Phase, ServerInfo};

/// Resolve the plugin and warm up the initial pool.
///
/// Fails when the plugin cannot be resolved or a worker fails to load.
pub async fn build_state(args: &ServerArgs, catalog: &PluginCatalog) -> Result<Arc<AppState>> {
    let descriptor = PluginResolver::new(catalog, args.workers_locations.clone())
        .with_trusted_locations(args.trusted_locations.clone())
        .with_safety_check(args.safety_check)
        .resolve(&args.worker_name, Some(&args.worker_suffix))?;

    let notifications = AppState::server_queue(args.microservice_name());
    let info = ServerInfo {
        worker_name: args.worker_name.clone(),
        microservice_name: args.microservice_name().to_string(),
        class_name: descriptor.class_name.clone(),
        host_id: args.host_id.clone(),
        execution_path: args.execution_path.clone(),
    };

    let pool = WorkerPool::new(
        WorkerSpawner::new(descriptor, args.config_endpoint.clone()),
        notifications.clone(),
    );
    let state = Arc::new(AppState::new(info, Arc::clone(&pool), notifications));

    state.set_phase(Phase::Warming);
    let nr_workers = args.nr_workers.max(1);
    tokio::task::spawn_blocking(move || pool.resize(nr_workers))
        .await
        .map_err(|e| Error::Internal(e.to_string()))??;

    tracing::info!(
        "Model server v{} '{}' <{} code={}> host_id='{}' ready on '{}:{}'",
        inference_common::protocol::LIB_VERSION,
        state.info.microservice_name,
        state.info.worker_name,
        state.info.class_name,
        state.info.host_id,
        args.host,
        args.port
    );
    tracing::info!(
        "Given full config:\n{}",
        serde_json::to_string_pretty(&args.config_endpoint).unwrap_or_default()
    );

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::builtin_catalog;
    use clap::Parser;

    fn args(extra: &[&str]) -> ServerArgs {
        let mut argv = vec!["model-server"];
        argv.extend_from_slice(extra);
        ServerArgs::try_parse_from(argv).unwrap().validated().unwrap()
    }

    #[tokio::test]
    async fn test_build_state_warms_pool() {
        let catalog = builtin_catalog();
        let state = build_state(
            &args(&["--worker-name", "dummy_model_b", "--nr-workers", "3"]),
            &catalog,
        )
        .await
        .unwrap();

        assert_eq!(state.pool.size(), 3);
        assert_eq!(state.info.class_name, "DummyModelBWorker");
        assert_eq!(state.phase(), Phase::Warming);
        assert!(state.set_phase(Phase::Serving));
        assert!(!state.set_phase(Phase::Warming));
        assert!(state.set_phase(Phase::ShuttingDown));
        assert_eq!(state.phase(), Phase::ShuttingDown);
    }

    #[tokio::test]
    async fn test_unknown_plugin_fails() {
        let catalog = builtin_catalog();
        let res = build_state(&args(&["--worker-name", "missing_model"]), &catalog).await;
        assert!(matches!(res, Err(Error::Resolution(_))));
    }

    #[tokio::test]
    async fn test_worker_load_failure_fails() {
        let catalog = builtin_catalog();
        let res = build_state(
            &args(&[
                "--worker-name",
                "dummy_model_a",
                "--config-endpoint",
                r#"{"PLACEHOLDER_MODEL": false}"#,
            ]),
            &catalog,
        )
        .await;
        assert!(matches!(res, Err(Error::WorkerCreation(_))));
    }

    #[tokio::test]
    async fn test_call_ids_are_monotonic() {
        let catalog = builtin_catalog();
        let state = build_state(
            &args(&["--worker-name", "dummy_model_b", "--nr-workers", "1"]),
            &catalog,
        )
        .await
        .unwrap();
        assert_eq!(state.next_call_id(), 1);
        assert_eq!(state.next_call_id(), 2);
        assert_eq!(state.paths(), vec!["/run", "/notifications", "/update_workers"]);
    }
}
