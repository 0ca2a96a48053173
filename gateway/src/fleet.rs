//! Registry of running children.
//!
//! Reads go through the registry lock only. Start and kill additionally hold
//! the lifecycle lock, which also owns the next model-server port, so
//! check, spawn and insert happen as one step.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::supervisor::{self, LaunchSpec, ServerRecord, ServerStatus};

/// Result of `start`.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    Started(ServerRecord),
    Disabled,
}

/// Result of terminating one child.
#[derive(Debug, Clone)]
pub struct KillReport {
    pub name: String,
    pub pid: Option<u32>,
    pub return_code: Option<i32>,
}

impl KillReport {
    pub fn message(&self) -> String {
        format!(
            "OK. Killed PID={} with return_code {}.",
            self.pid.map(|p| p.to_string()).unwrap_or_else(|| "None".into()),
            self.return_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "None".into())
        )
    }
}

pub struct Fleet {
    config: Arc<Config>,
    host_id: String,
    http: reqwest::Client,
    records: RwLock<HashMap<String, ServerRecord>>,
    /// Next model-server port.
    lifecycle: Mutex<u16>,
    /// Set by `close`; no child is launched afterwards.
    closed: AtomicBool,
}

impl Fleet {
    pub fn new(config: Arc<Config>, host_id: impl Into<String>) -> Self {
        let first_port = config.first_server_port();
        Self {
            config,
            host_id: host_id.into(),
            http: reqwest::Client::new(),
            records: RwLock::new(HashMap::new()),
            lifecycle: Mutex::new(first_port),
            closed: AtomicBool::new(false),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub async fn get(&self, name: &str) -> Option<ServerRecord> {
        self.records.read().await.get(name).cloned()
    }

    /// Running children, ordered by start time.
    pub async fn records(&self) -> Vec<ServerRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.started);
        records
    }

    pub async fn active_names(&self) -> Vec<String> {
        self.records().await.into_iter().map(|r| r.name).collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn unknown(&self, signature: &str) -> Error {
        Error::UnknownSignature {
            signature: signature.to_string(),
            available: self.active_names().await,
        }
    }

    /// Start the configured endpoint `name`.
    ///
    /// Model servers take the next port, which only advances on success.
    pub async fn start(&self, name: &str) -> Result<StartOutcome> {
        let mut next_port = self.lifecycle.lock().await;

        if self.records.read().await.contains_key(name) {
            return Err(Error::AlreadyRunning(name.to_string()));
        }
        let endpoint = match self.config.endpoint(name) {
            Some(endpoint) => endpoint,
            None => return Err(self.unknown(name).await),
        };
        if endpoint.disabled {
            tracing::warn!("Skipping disabled endpoint '{}'", name);
            return Ok(StartOutcome::Disabled);
        }

        let spec = if endpoint.is_support() {
            supervisor::support_spec(&self.config, endpoint, &self.host_id)?
        } else {
            supervisor::model_server_spec(&self.config, endpoint, *next_port, &self.host_id)
        };
        let support = spec.is_support();

        let record = self.launch_locked(spec).await?;
        if !support {
            *next_port = next_port.saturating_add(1);
        }
        Ok(StartOutcome::Started(record))
    }

    /// Launch an arbitrary spec and register it.
    pub async fn spawn(&self, spec: LaunchSpec) -> Result<ServerRecord> {
        let _guard = self.lifecycle.lock().await;
        if self.records.read().await.contains_key(&spec.name) {
            return Err(Error::AlreadyRunning(spec.name));
        }
        self.launch_locked(spec).await
    }

    async fn launch_locked(&self, spec: LaunchSpec) -> Result<ServerRecord> {
        if self.closed.load(Ordering::SeqCst) {
            tracing::warn!("Refusing to start '{}' during shutdown", spec.name);
            return Err(Error::ShuttingDown(spec.name));
        }
        let record = supervisor::launch(spec, self.config.timing.warmup()).await?;
        self.records
            .write()
            .await
            .insert(record.name.clone(), record.clone());
        Ok(record)
    }

    /// Start every enabled endpoint of one kind, in configuration order.
    ///
    /// Failures are logged; the names that started are returned.
    pub async fn start_all(&self, support: bool) -> Vec<String> {
        let names: Vec<String> = self
            .config
            .endpoints
            .iter()
            .filter(|e| e.is_support() == support)
            .map(|e| e.name.clone())
            .collect();

        let mut started = Vec::new();
        for name in names {
            match self.start(&name).await {
                Ok(StartOutcome::Started(_)) => started.push(name),
                Ok(StartOutcome::Disabled) => {}
                Err(e) => tracing::error!("Could not start '{}': {}", name, e),
            }
        }
        started
    }

    /// Terminate `name` and drop its record.
    pub async fn kill(&self, name: &str) -> Result<KillReport> {
        let _guard = self.lifecycle.lock().await;
        let record = match self.get(name).await {
            Some(record) => record,
            None => return Err(self.unknown(name).await),
        };
        Ok(self.kill_record(record).await)
    }

    async fn kill_record(&self, record: ServerRecord) -> KillReport {
        tracing::info!("Killing '{}' (pid: {:?})", record.name, record.pid);
        let return_code =
            supervisor::terminate(&record, self.config.timing.kill_timeout()).await;
        self.records.write().await.remove(&record.name);

        KillReport {
            name: record.name,
            pid: record.pid,
            return_code,
        }
    }

    /// Terminate every child, pausing `pause` between kills.
    pub async fn kill_all(&self, pause: Duration) -> Vec<KillReport> {
        let _guard = self.lifecycle.lock().await;
        self.kill_all_locked(pause).await
    }

    /// Refuse further launches, then terminate every child.
    pub async fn close(&self, pause: Duration) -> Vec<KillReport> {
        let _guard = self.lifecycle.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        self.kill_all_locked(pause).await
    }

    async fn kill_all_locked(&self, pause: Duration) -> Vec<KillReport> {
        let records = self.records().await;

        let mut reports = Vec::with_capacity(records.len());
        for (i, record) in records.into_iter().enumerate() {
            if i > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            let report = self.kill_record(record).await;
            tracing::info!("{} {}", report.name, report.message());
            reports.push(report);
        }
        reports
    }

    pub async fn status(&self, name: &str) -> Option<ServerStatus> {
        let record = self.get(name).await?;
        Some(supervisor::status(&self.http, &record).await)
    }

    /// Status of every child, probed concurrently.
    pub async fn list_status(&self) -> BTreeMap<String, ServerStatus> {
        let records = self.records().await;
        let statuses = join_all(
            records
                .iter()
                .map(|record| supervisor::status(&self.http, record)),
        )
        .await;

        records
            .into_iter()
            .map(|r| r.name)
            .zip(statuses)
            .collect()
    }

    /// Child pids with names, for memory accounting.
    pub async fn pids(&self) -> Vec<(String, u32)> {
        self.records()
            .await
            .into_iter()
            .filter_map(|r| r.pid.map(|pid| (r.name, pid)))
            .collect()
    }
}
