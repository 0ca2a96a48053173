//! Command-line configuration for a model server.
//!
//! The gateway launches every model server with these flags; the endpoint's
//! own settings travel as a JSON object in `--config-endpoint`.

use clap::Parser;
use serde_json::{Map, Value};

use inference_common::protocol::{normalize_path, RULE_NOTIF, RULE_PATHS, RULE_RUN, RULE_UPDATE_WORKERS};

use crate::error::{Error, Result};
use crate::plugin::catalog::BUILTIN_LOCATION;

#[derive(Debug, Clone, Parser)]
#[command(name = "model-server", version, about = "Worker-pool model server")]
pub struct ServerArgs {
    /// Bind host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Bind port
    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    /// Route where the plugin is executed
    #[arg(long, default_value = RULE_RUN)]
    pub execution_path: String,

    /// Plugin namespaces searched in order
    #[arg(long = "workers-location", default_value = BUILTIN_LOCATION)]
    pub workers_locations: Vec<String>,

    /// Namespaces searched first; plugins found there skip the safety screen
    #[arg(long = "trusted-location")]
    pub trusted_locations: Vec<String>,

    /// Logical plugin name, e.g. `dummy_model_a`
    #[arg(long)]
    pub worker_name: String,

    /// Class-name suffix appended to the plugin name
    #[arg(long, default_value = "Worker")]
    pub worker_suffix: String,

    /// Display name of this microservice (defaults to the worker name)
    #[arg(long)]
    pub microservice_name: Option<String>,

    /// Initial number of workers
    #[arg(long, default_value_t = 5)]
    pub nr_workers: usize,

    /// Identifier of the host running the gateway
    #[arg(long, default_value = "")]
    pub host_id: String,

    /// JSON object passed to workers as upstream configuration
    #[arg(long, default_value = "{}", value_parser = parse_json_object)]
    pub config_endpoint: Map<String, Value>,

    /// Screen untrusted plugin source before use
    #[arg(long)]
    pub safety_check: bool,
}

fn parse_json_object(raw: &str) -> std::result::Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

impl ServerArgs {
    /// Normalize and check the arguments.
    pub fn validated(mut self) -> Result<Self> {
        self.execution_path = normalize_path(&self.execution_path);
        if [RULE_NOTIF, RULE_UPDATE_WORKERS, RULE_PATHS].contains(&self.execution_path.as_str()) {
            return Err(Error::Config(format!(
                "execution path '{}' collides with a reserved route",
                self.execution_path
            )));
        }
        if self.worker_name.trim().is_empty() {
            return Err(Error::Config("worker name is empty".to_string()));
        }
        Ok(self)
    }

    pub fn microservice_name(&self) -> &str {
        self.microservice_name.as_deref().unwrap_or(&self.worker_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = ServerArgs::try_parse_from(["model-server", "--worker-name", "dummy_model_a"])
            .unwrap()
            .validated()
            .unwrap();
        assert_eq!(args.port, 5000);
        assert_eq!(args.execution_path, "/run");
        assert_eq!(args.workers_locations, vec!["endpoints"]);
        assert_eq!(args.nr_workers, 5);
        assert_eq!(args.microservice_name(), "dummy_model_a");
        assert!(args.config_endpoint.is_empty());
    }

    #[test]
    fn test_full_command_line() {
        let args = ServerArgs::try_parse_from([
            "model-server",
            "--host",
            "0.0.0.0",
            "--port",
            "5002",
            "--execution-path",
            "predict",
            "--workers-location",
            "endpoints",
            "--workers-location",
            "extra",
            "--worker-name",
            "dummy_model_b",
            "--microservice-name",
            "b-service",
            "--nr-workers",
            "2",
            "--config-endpoint",
            r#"{"NR_WORKERS": 2, "WEIGHT": 3}"#,
        ])
        .unwrap()
        .validated()
        .unwrap();
        assert_eq!(args.execution_path, "/predict");
        assert_eq!(args.workers_locations, vec!["endpoints", "extra"]);
        assert_eq!(args.microservice_name(), "b-service");
        assert_eq!(args.config_endpoint["WEIGHT"], 3);
    }

    #[test]
    fn test_rejects_reserved_execution_path() {
        let args = ServerArgs::try_parse_from([
            "model-server",
            "--worker-name",
            "x",
            "--execution-path",
            "/notifications",
        ])
        .unwrap();
        assert!(args.validated().is_err());
    }

    #[test]
    fn test_rejects_non_object_config() {
        let res = ServerArgs::try_parse_from([
            "model-server",
            "--worker-name",
            "x",
            "--config-endpoint",
            "[1, 2]",
        ]);
        assert!(res.is_err());
    }
}
