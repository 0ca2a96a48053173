//! Configuration for the gateway.

use std::time::Duration;

use clap::Parser;
use config::{Config as ConfigLoader, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use serde_json::{Map, Value};

use inference_common::protocol::{normalize_path, RULE_RUN, SUPPORT_PROCESS_NO_HOST};

/// Command line of the `inference-gateway` binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "inference-gateway", version, about = "Launches and routes to model servers")]
pub struct GatewayArgs {
    /// Configuration file (TOML); `config.toml` in the working directory when omitted.
    #[arg(long)]
    pub config: Option<String>,

    /// Override the bind host.
    #[arg(long)]
    pub host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    pub port: Option<u16>,
}

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// First port handed to a model server (default: gateway port + 1).
    #[serde(default)]
    pub first_server_port: Option<u16>,
    /// Name reported in `/system_status`.
    #[serde(default = "default_server_name")]
    pub server_name: String,
    /// Application version stamped on every response.
    #[serde(default = "default_app_version")]
    pub app_version: String,
    /// Persisted startup/shutdown history.
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Endpoint used for the path-discovery handshake (default: first business endpoint).
    #[serde(default)]
    pub default_server: Option<String>,
    /// Skip the handshake and assume the standard model-server paths.
    #[serde(default)]
    pub no_startup_wait: bool,
    #[serde(default)]
    pub servers: ServersConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Configured endpoints, in start order.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

/// How model servers and support processes are launched.
#[derive(Debug, Clone, Deserialize)]
pub struct ServersConfig {
    /// Path to the `model-server` binary.
    #[serde(default = "default_server_binary")]
    pub binary: String,
    /// Route the model servers expose for execution.
    #[serde(default = "default_execution_path")]
    pub execution_path: String,
    /// Plugin locations searched by the model servers, in order.
    #[serde(default = "default_workers_locations")]
    pub workers_locations: Vec<String>,
    /// Locations whose plugins skip the safety screen.
    #[serde(default)]
    pub trusted_locations: Vec<String>,
    #[serde(default = "default_worker_suffix")]
    pub worker_suffix: String,
    /// Ask model servers to screen plugin source.
    #[serde(default)]
    pub safety_check: bool,
    /// Directory holding support-process executables.
    #[serde(default = "default_support_location")]
    pub support_location: String,
}

impl Default for ServersConfig {
    fn default() -> Self {
        Self {
            binary: default_server_binary(),
            execution_path: default_execution_path(),
            workers_locations: default_workers_locations(),
            trusted_locations: vec![],
            worker_suffix: default_worker_suffix(),
            safety_check: false,
            support_location: default_support_location(),
        }
    }
}

/// Lifecycle timings, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Grace period after spawning before checking the child is alive.
    #[serde(default = "default_warmup")]
    pub warmup_secs: f64,
    /// Wait after SIGTERM before SIGKILL.
    #[serde(default = "default_kill_timeout")]
    pub kill_timeout_secs: f64,
    /// Pause between kills during a full teardown.
    #[serde(default = "default_kill_pause")]
    pub kill_pause_secs: f64,
    #[serde(default = "default_handshake_retry")]
    pub handshake_retry_secs: f64,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: f64,
    /// Upstream failures within this window of a child's start are reported as INIT.
    #[serde(default = "default_cold_start_grace")]
    pub cold_start_grace_secs: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            warmup_secs: default_warmup(),
            kill_timeout_secs: default_kill_timeout(),
            kill_pause_secs: default_kill_pause(),
            handshake_retry_secs: default_handshake_retry(),
            handshake_timeout_secs: default_handshake_timeout(),
            cold_start_grace_secs: default_cold_start_grace(),
        }
    }
}

impl TimingConfig {
    pub fn warmup(&self) -> Duration {
        secs(self.warmup_secs)
    }

    pub fn kill_timeout(&self) -> Duration {
        secs(self.kill_timeout_secs)
    }

    pub fn kill_pause(&self) -> Duration {
        secs(self.kill_pause_secs)
    }

    pub fn handshake_retry(&self) -> Duration {
        secs(self.handshake_retry_secs)
    }

    /// Number of handshake attempts before giving up (at least one).
    pub fn handshake_attempts(&self) -> u32 {
        if self.handshake_retry_secs <= 0.0 {
            return 1;
        }
        ((self.handshake_timeout_secs / self.handshake_retry_secs).ceil() as u32).max(1)
    }

    pub fn cold_start_grace(&self) -> Duration {
        secs(self.cold_start_grace_secs)
    }
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One configured endpoint.
///
/// Keys other than the known ones are passed through to the model server in
/// `--config-endpoint`, upper-cased.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    #[serde(alias = "NAME")]
    pub name: String,
    #[serde(default, alias = "DESCRIPTION")]
    pub description: Option<String>,
    /// Plugin to run; defaults to the endpoint name.
    #[serde(default, alias = "SERVER_CLASS")]
    pub server_class: Option<String>,
    /// Bind host; `NO_HOST` marks a headless support process.
    #[serde(default, alias = "HOST")]
    pub host: Option<String>,
    #[serde(default, alias = "NR_WORKERS")]
    pub nr_workers: Option<usize>,
    #[serde(default, alias = "DISABLED")]
    pub disabled: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Pool size used when an endpoint does not set one.
pub const DEFAULT_NR_WORKERS: usize = 5;

/// Host used when an endpoint does not set one.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

impl EndpointConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            server_class: None,
            host: None,
            nr_workers: None,
            disabled: false,
            extra: Map::new(),
        }
    }

    pub fn server_class(&self) -> &str {
        self.server_class.as_deref().unwrap_or(&self.name)
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_SERVER_HOST)
    }

    pub fn is_support(&self) -> bool {
        self.host.as_deref() == Some(SUPPORT_PROCESS_NO_HOST)
    }

    pub fn nr_workers(&self) -> usize {
        self.nr_workers.unwrap_or(DEFAULT_NR_WORKERS)
    }

    /// Endpoint configuration as handed to the child, keys upper-cased.
    pub fn to_child_config(&self) -> Map<String, Value> {
        let mut map: Map<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.to_uppercase(), v.clone()))
            .collect();

        if let Some(description) = &self.description {
            map.insert("DESCRIPTION".into(), Value::String(description.clone()));
        }
        map.insert(
            "SERVER_CLASS".into(),
            Value::String(self.server_class().to_string()),
        );
        map.insert("HOST".into(), Value::String(self.host().to_string()));
        if let Some(n) = self.nr_workers {
            map.insert("NR_WORKERS".into(), Value::from(n));
        }
        map
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5002
}
fn default_server_name() -> String {
    "base_ai_app".to_string()
}
fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_state_file() -> String {
    "gw_state_history.json".to_string()
}
fn default_server_binary() -> String {
    "model-server".to_string()
}
fn default_execution_path() -> String {
    RULE_RUN.to_string()
}
fn default_workers_locations() -> Vec<String> {
    vec!["endpoints".to_string()]
}
fn default_worker_suffix() -> String {
    "Worker".to_string()
}
fn default_support_location() -> String {
    "support".to_string()
}
fn default_warmup() -> f64 {
    2.0
}
fn default_kill_timeout() -> f64 {
    5.0
}
fn default_kill_pause() -> f64 {
    2.0
}
fn default_handshake_retry() -> f64 {
    10.0
}
fn default_handshake_timeout() -> f64 {
    120.0
}
fn default_cold_start_grace() -> f64 {
    70.0
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (GATEWAY__SECTION__KEY format)
    /// 2. The given file, or config.toml if present
    /// 3. Built-in defaults
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name("config").required(false),
        };

        let config = ConfigLoader::builder()
            .set_default("host", default_host())?
            .set_default("port", default_port() as i64)?
            .add_source(file)
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize::<Config>()?.validated()
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;
        config.try_deserialize::<Config>()?.validated()
    }

    /// Apply CLI overrides.
    pub fn with_args(mut self, args: &GatewayArgs) -> Self {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        self
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        self.servers.execution_path = normalize_path(&self.servers.execution_path);

        let mut seen = std::collections::HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.name.trim().is_empty() {
                return Err(ConfigError::Message("endpoint with an empty name".into()));
            }
            if !seen.insert(endpoint.name.as_str()) {
                return Err(ConfigError::Message(format!(
                    "endpoint '{}' configured twice",
                    endpoint.name
                )));
            }
        }
        Ok(self)
    }

    pub fn endpoint(&self, name: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// Port of the first model server.
    pub fn first_server_port(&self) -> u16 {
        self.first_server_port
            .unwrap_or_else(|| self.port.saturating_add(1))
    }

    /// Endpoint used for the path-discovery handshake.
    pub fn default_endpoint(&self) -> Option<&str> {
        match &self.default_server {
            Some(name) => Some(name.as_str()),
            None => self
                .endpoints
                .iter()
                .find(|e| !e.is_support() && !e.disabled)
                .map(|e| e.name.as_str()),
        }
    }
}
