//! The bundled support process: samples host metrics on an interval and
//! reports them to the gateway's support route.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio_util::sync::CancellationToken;

use inference_common::protocol::{RULE_SUPPORT, SIGNATURE, SUPPORT_MESSAGE};

use crate::health::{root_disk, to_gb};

/// Settings read from `--config-endpoint`.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(rename = "SUPPORT_NAME", default = "default_name")]
    pub name: String,
    #[serde(rename = "SERVER", default = "default_server")]
    pub server: String,
    #[serde(rename = "SERVER_PORT")]
    pub server_port: u16,
    #[serde(rename = "SERVER_PATH", default = "default_path")]
    pub server_path: String,
    /// Seconds between reports.
    #[serde(rename = "PING_INTERVAL", default = "default_interval")]
    pub ping_interval: f64,
}

fn default_name() -> String {
    "SUPPORT".to_string()
}
fn default_server() -> String {
    "127.0.0.1".to_string()
}
fn default_path() -> String {
    RULE_SUPPORT.to_string()
}
fn default_interval() -> f64 {
    1.0
}

impl MonitorConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.server, self.server_port, self.server_path)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.ping_interval.max(0.1))
    }
}

/// One sample, sizes in GB.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub total_memory: f64,
    pub available_memory: f64,
    pub system_used_memory: f64,
    pub app_used_memory: f64,
    pub total_disk: f64,
    pub available_disk: f64,
}

impl Metrics {
    pub fn summary(&self) -> String {
        format!(
            "Total Mem: {:.1}GB, Avail Mem: {:.1}GB, Sys Used Mem: {:.1}GB, \
             App Used Mem: {:.1}GB, Total Disk: {:.1}GB, Avail Disk: {:.1}GB",
            self.total_memory,
            self.available_memory,
            self.system_used_memory,
            self.app_used_memory,
            self.total_disk,
            self.available_disk
        )
    }

    /// Report body: the summary under `msg`, the metrics and `SIGNATURE`.
    pub fn report(&self, name: &str) -> Value {
        let mut body = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        body.insert(SUPPORT_MESSAGE.to_string(), Value::String(self.summary()));
        body.insert(SIGNATURE.to_string(), Value::String(name.to_string()));
        Value::Object(body)
    }
}

pub fn collect(system: &mut System) -> Metrics {
    let pid = Pid::from_u32(std::process::id());
    system.refresh_memory();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::everything(),
    );
    let (total_disk, available_disk) = root_disk();

    Metrics {
        total_memory: to_gb(system.total_memory()),
        available_memory: to_gb(system.available_memory()),
        system_used_memory: to_gb(system.used_memory()),
        app_used_memory: system.process(pid).map(|p| to_gb(p.memory())).unwrap_or(0.0),
        total_disk,
        available_disk,
    }
}

/// Report every interval until `token` is cancelled. Delivery errors are logged.
pub async fn run(config: MonitorConfig, token: CancellationToken) {
    let client = reqwest::Client::new();
    let url = config.url();
    let mut system = System::new();
    let mut ticker = tokio::time::interval(config.interval());

    tracing::info!(
        "Server monitor '{}' reporting to {} every {:?}",
        config.name,
        url,
        config.interval()
    );

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let metrics = collect(&mut system);
        let result = client
            .post(&url)
            .json(&metrics.report(&config.name))
            .send()
            .await
            .and_then(|r| r.error_for_status());
        if let Err(e) = result {
            tracing::error!("Error while trying to deliver to {}: {}", url, e);
        }
    }

    tracing::info!("Server monitor '{}' stopped", config.name);
}
