//! Child process management: launching model servers and support
//! processes, terminating them and probing their status.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use inference_common::protocol::{RULE_NOTIF, RULE_PATHS, RULE_SUPPORT, RULE_UPDATE_WORKERS};
use inference_common::timefmt::elapsed_to_str;
use inference_common::PathsResponse;

use crate::config::{Config, EndpointConfig};
use crate::error::{Error, Result};

/// Host the gateway is reached on by its own support processes.
const LOCAL_HOST: &str = "127.0.0.1";

/// Timeout of a single path-discovery call.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to start one child.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub host: String,
    /// Absent for headless support processes.
    pub port: Option<u16>,
}

impl LaunchSpec {
    pub fn is_support(&self) -> bool {
        self.port.is_none()
    }

    /// Program followed by its arguments.
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Launch spec of a model server for `endpoint` on `port`.
pub fn model_server_spec(
    config: &Config,
    endpoint: &EndpointConfig,
    port: u16,
    host_id: &str,
) -> LaunchSpec {
    let servers = &config.servers;
    let child_config = Value::Object(endpoint.to_child_config()).to_string();

    let mut args = vec![
        "--config-endpoint".to_string(),
        child_config,
        "--host".to_string(),
        endpoint.host().to_string(),
        "--port".to_string(),
        port.to_string(),
        "--execution-path".to_string(),
        servers.execution_path.clone(),
    ];
    for location in &servers.workers_locations {
        args.push("--workers-location".to_string());
        args.push(location.clone());
    }
    for location in &servers.trusted_locations {
        args.push("--trusted-location".to_string());
        args.push(location.clone());
    }
    args.extend([
        "--worker-name".to_string(),
        endpoint.server_class().to_string(),
        "--worker-suffix".to_string(),
        servers.worker_suffix.clone(),
        "--microservice-name".to_string(),
        endpoint.name.clone(),
        "--nr-workers".to_string(),
        endpoint.nr_workers().to_string(),
        "--host-id".to_string(),
        host_id.to_string(),
    ]);
    if servers.safety_check {
        args.push("--safety-check".to_string());
    }

    LaunchSpec {
        name: endpoint.name.clone(),
        program: servers.binary.clone(),
        args,
        host: endpoint.host().to_string(),
        port: Some(port),
    }
}

/// Launch spec of the headless support process `<support_location>/<name>`.
///
/// The child is told where to report: the gateway's own port and the
/// support-report route.
pub fn support_spec(config: &Config, endpoint: &EndpointConfig, host_id: &str) -> Result<LaunchSpec> {
    let program = Path::new(&config.servers.support_location).join(&endpoint.name);
    if !program.is_file() {
        return Err(Error::SupportMissing(program.display().to_string()));
    }

    let mut child_config = endpoint.to_child_config();
    child_config.insert("SERVER".into(), Value::String(LOCAL_HOST.to_string()));
    child_config.insert("SERVER_PORT".into(), Value::from(config.port));
    child_config.insert("SERVER_PATH".into(), Value::String(RULE_SUPPORT.to_string()));
    child_config.insert("SUPPORT_NAME".into(), Value::String(endpoint.name.clone()));

    Ok(LaunchSpec {
        name: endpoint.name.clone(),
        program: program.display().to_string(),
        args: vec![
            "--config-endpoint".to_string(),
            Value::Object(child_config).to_string(),
            "--host-id".to_string(),
            host_id.to_string(),
        ],
        host: endpoint.host().to_string(),
        port: None,
    })
}

/// Paths a model server exposes when the handshake is skipped.
pub fn default_paths(execution_path: &str) -> Vec<String> {
    vec![
        execution_path.to_string(),
        RULE_NOTIF.to_string(),
        RULE_UPDATE_WORKERS.to_string(),
    ]
}

/// A launched child. Clones share the process handle.
#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub name: String,
    pub pid: Option<u32>,
    pub host: String,
    pub port: Option<u16>,
    pub args: Vec<String>,
    pub started_at: DateTime<Local>,
    pub started: Instant,
    child: Arc<Mutex<Child>>,
}

impl ServerRecord {
    pub fn is_support(&self) -> bool {
        self.port.is_none()
    }

    /// Base URL of an HTTP child.
    pub fn base_url(&self) -> Option<String> {
        self.port.map(|port| format!("http://{}:{}", self.host, port))
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub async fn is_alive(&self) -> bool {
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(None))
    }
}

/// Spawn the child and check it survived `warmup`.
pub async fn launch(spec: LaunchSpec, warmup: Duration) -> Result<ServerRecord> {
    let failure = |spec: &LaunchSpec| Error::Spawn {
        args: spec.command_line(),
        host: spec.host.clone(),
        port: spec
            .port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "None".to_string()),
    };

    tracing::info!("Starting '{}': {:?}", spec.name, spec.command_line());

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        tracing::error!("Failed to spawn '{}' ({}): {}", spec.name, spec.program, e);
        failure(&spec)
    })?;
    let pid = child.id();

    tokio::time::sleep(warmup).await;

    match child.try_wait() {
        Ok(None) => {}
        Ok(Some(status)) => {
            tracing::error!("'{}' exited during warmup with {}", spec.name, status);
            return Err(failure(&spec));
        }
        Err(e) => {
            tracing::error!("Cannot check '{}' after warmup: {}", spec.name, e);
            let _ = child.kill().await;
            return Err(failure(&spec));
        }
    }

    tracing::info!(
        "Started '{}' (pid: {:?}, {}:{})",
        spec.name,
        pid,
        spec.host,
        spec.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
    );

    Ok(ServerRecord {
        name: spec.name,
        pid,
        host: spec.host,
        port: spec.port,
        args: spec.args,
        started_at: Local::now(),
        started: Instant::now(),
        child: Arc::new(Mutex::new(child)),
    })
}

/// SIGTERM the child, wait up to `timeout`, then SIGKILL.
///
/// Returns the exit code when the child exited normally.
pub async fn terminate(record: &ServerRecord, timeout: Duration) -> Option<i32> {
    let mut child = record.child.lock().await;

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!("'{}' exited with {}", record.name, status);
            status.code()
        }
        Ok(Err(e)) => {
            tracing::warn!("Error waiting for '{}': {}", record.name, e);
            None
        }
        Err(_timeout) => {
            tracing::warn!("'{}' didn't stop gracefully, killing", record.name);
            let _ = child.kill().await;
            child.try_wait().ok().flatten().and_then(|s| s.code())
        }
    }
}

/// Status of one child as reported by `/list_servers`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    #[serde(rename = "ONLINE")]
    pub online: bool,
    #[serde(rename = "ERROR")]
    pub error: Option<String>,
    #[serde(rename = "URLS")]
    pub urls: Vec<String>,
    #[serde(rename = "PATHS")]
    pub paths: Vec<String>,
    #[serde(rename = "PORT")]
    pub port: Option<u16>,
    #[serde(rename = "UPTIME")]
    pub uptime: String,
}

/// Probe a child: headless ones by liveness, HTTP ones by path discovery.
pub async fn status(client: &reqwest::Client, record: &ServerRecord) -> ServerStatus {
    let uptime = elapsed_to_str(record.uptime().as_secs());

    let Some(base) = record.base_url() else {
        return ServerStatus {
            online: record.is_alive().await,
            error: None,
            urls: vec![],
            paths: record.args.clone(),
            port: None,
            uptime,
        };
    };

    match discover_paths(client, &base).await {
        Ok(paths) => {
            let urls = std::iter::once(format!("{}{}", base, RULE_PATHS))
                .chain(paths.iter().map(|p| format!("{}{}", base, p)))
                .collect();
            ServerStatus {
                online: true,
                error: None,
                urls,
                paths,
                port: record.port,
                uptime,
            }
        }
        Err(e) => ServerStatus {
            online: false,
            error: Some(e.to_string()),
            urls: vec![],
            paths: vec![],
            port: record.port,
            uptime,
        },
    }
}

/// `GET <base>/get_paths`.
pub async fn discover_paths(
    client: &reqwest::Client,
    base: &str,
) -> std::result::Result<Vec<String>, reqwest::Error> {
    let response = client
        .get(format!("{}{}", base, RULE_PATHS))
        .timeout(PROBE_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;
    let body: PathsResponse = response.json().await?;
    Ok(body.paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(program: &str, args: &[&str]) -> LaunchSpec {
        LaunchSpec {
            name: "child".into(),
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            host: "127.0.0.1".into(),
            port: None,
        }
    }

    #[test]
    fn test_model_server_spec_arguments() {
        let config = Config::from_toml(
            r#"
            [servers]
            binary = "/opt/model-server"
            workers_locations = ["endpoints", "extra"]
            safety_check = true

            [[endpoints]]
            name = "sentiment"
            server_class = "dummy_model_a"
            nr_workers = 3
            "#,
        )
        .unwrap();
        let endpoint = config.endpoint("sentiment").unwrap();
        let spec = model_server_spec(&config, endpoint, 5003, "abc123");

        assert_eq!(spec.program, "/opt/model-server");
        assert_eq!(spec.port, Some(5003));
        let args = spec.args.join(" ");
        assert!(args.contains("--host 127.0.0.1 --port 5003 --execution-path /run"));
        assert!(args.contains("--workers-location endpoints --workers-location extra"));
        assert!(args.contains("--worker-name dummy_model_a --worker-suffix Worker"));
        assert!(args.contains("--microservice-name sentiment --nr-workers 3"));
        assert!(args.contains("--host-id abc123"));
        assert!(args.ends_with("--safety-check"));

        let cfg: Value = serde_json::from_str(&spec.args[1]).unwrap();
        assert_eq!(cfg["SERVER_CLASS"], "dummy_model_a");
    }

    #[test]
    fn test_support_spec_requires_executable() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_toml(&format!(
            "port = 5555\n[servers]\nsupport_location = {:?}\n[[endpoints]]\nname = \"monitor\"\nhost = \"NO_HOST\"\n",
            dir.path().display().to_string()
        ))
        .unwrap();
        let endpoint = config.endpoint("monitor").unwrap();

        let err = support_spec(&config, endpoint, "id").unwrap_err();
        assert!(err.to_string().starts_with("Could not find support process"));

        std::fs::write(dir.path().join("monitor"), "#!/bin/sh\n").unwrap();
        let spec = support_spec(&config, endpoint, "id").unwrap();
        assert!(spec.is_support());
        let cfg: Value = serde_json::from_str(&spec.args[1]).unwrap();
        assert_eq!(cfg["SERVER_PORT"], 5555);
        assert_eq!(cfg["SERVER_PATH"], "/support_update_status");
        assert_eq!(cfg["SUPPORT_NAME"], "monitor");
    }

    #[tokio::test]
    async fn test_launch_and_terminate() {
        let record = launch(spec("sleep", &["30"]), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(record.pid.is_some());
        assert!(record.is_alive().await);

        terminate(&record, Duration::from_secs(5)).await;
        assert!(!record.is_alive().await);
    }

    #[tokio::test]
    async fn test_launch_fails_when_child_exits() {
        let err = launch(spec("false", &[]), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Process failed for"));
    }

    #[tokio::test]
    async fn test_launch_fails_for_missing_binary() {
        let err = launch(spec("/nonexistent/model-server", &[]), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_headless_status_reports_args() {
        let record = launch(spec("sleep", &["30"]), Duration::from_millis(50))
            .await
            .unwrap();
        let status = status(&reqwest::Client::new(), &record).await;
        assert!(status.online);
        assert_eq!(status.paths, vec!["30"]);
        assert_eq!(status.port, None);
        terminate(&record, Duration::from_secs(5)).await;
    }
}
