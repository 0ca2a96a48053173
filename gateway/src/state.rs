//! Shared gateway state.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::fleet::Fleet;
use crate::health::HostProbe;
use crate::state_history::StateStore;

/// Lifecycle phase of the gateway process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GatewayPhase {
    Init,
    StartingCoreEndpoints,
    StartingBusinessServers,
    StartingSupportProcesses,
    Serving,
    ShuttingDown,
    Terminated,
}

pub struct AppState {
    pub config: Arc<Config>,
    pub fleet: Arc<Fleet>,
    pub history: StateStore,
    pub probe: Arc<HostProbe>,
    /// Latest report per support process.
    pub support_reports: RwLock<BTreeMap<String, Value>>,
    /// Short id handed to every child.
    pub host_id: String,
    /// Cancelled once teardown is complete; ends the serve loop.
    pub shutdown: CancellationToken,
    started: Instant,
    phase: Mutex<GatewayPhase>,
    teardown_started: AtomicBool,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        let config = Arc::new(config);
        let host_id = new_host_id();
        Arc::new(Self {
            fleet: Arc::new(Fleet::new(config.clone(), host_id.clone())),
            history: StateStore::load(PathBuf::from(&config.state_file)),
            probe: Arc::new(HostProbe::new()),
            support_reports: RwLock::new(BTreeMap::new()),
            host_id,
            shutdown: CancellationToken::new(),
            started: Instant::now(),
            phase: Mutex::new(GatewayPhase::Init),
            teardown_started: AtomicBool::new(false),
            config,
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn phase(&self) -> GatewayPhase {
        match self.phase.lock() {
            Ok(phase) => *phase,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Move forward to `next`; earlier phases are ignored.
    pub fn set_phase(&self, next: GatewayPhase) {
        let mut phase = match self.phase.lock() {
            Ok(phase) => phase,
            Err(poisoned) => poisoned.into_inner(),
        };
        if next > *phase {
            tracing::debug!("Gateway phase {:?} -> {:?}", *phase, next);
            *phase = next;
        }
    }

    /// True for the first caller only.
    pub fn begin_teardown(&self) -> bool {
        !self.teardown_started.swap(true, Ordering::SeqCst)
    }
}

fn new_host_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_string()
}
