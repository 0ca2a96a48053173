//! Shared application state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use inference_common::notification::{NotificationQueue, DEFAULT_CAPACITY};
use inference_common::protocol::{RULE_NOTIF, RULE_UPDATE_WORKERS};

use crate::pool::WorkerPool;

/// Lifecycle of a model server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Warming,
    Serving,
    ShuttingDown,
}

/// Identity of this server, as reported in response signatures.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub worker_name: String,
    pub microservice_name: String,
    pub class_name: String,
    pub host_id: String,
    pub execution_path: String,
}

/// Shared application state passed to all handlers.
pub struct AppState {
    pub info: ServerInfo,
    pub pool: Arc<WorkerPool>,
    pub notifications: NotificationQueue,
    counter: AtomicU64,
    phase: Mutex<Phase>,
}

impl AppState {
    pub fn new(info: ServerInfo, pool: Arc<WorkerPool>, notifications: NotificationQueue) -> Self {
        Self {
            info,
            pool,
            notifications,
            counter: AtomicU64::new(0),
            phase: Mutex::new(Phase::Init),
        }
    }

    /// Server-level notification queue sized for a model server.
    pub fn server_queue(name: &str) -> NotificationQueue {
        NotificationQueue::new(name, DEFAULT_CAPACITY).with_version(inference_common::protocol::LIB_VERSION)
    }

    /// Next call id; the first call is 1.
    pub fn next_call_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn paths(&self) -> Vec<String> {
        vec![
            self.info.execution_path.clone(),
            RULE_NOTIF.to_string(),
            RULE_UPDATE_WORKERS.to_string(),
        ]
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next`. Returns false for transitions that go backwards.
    pub fn set_phase(&self, next: Phase) -> bool {
        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        let allowed = matches!(
            (*phase, next),
            (Phase::Init, Phase::Warming)
                | (Phase::Warming, Phase::Serving)
                | (Phase::Init | Phase::Warming | Phase::Serving, Phase::ShuttingDown)
        );
        if allowed {
            tracing::info!("Server phase {:?} -> {:?}", *phase, next);
            *phase = next;
        } else {
            tracing::warn!("Ignoring phase change {:?} -> {:?}", *phase, next);
        }
        allowed
    }
}
