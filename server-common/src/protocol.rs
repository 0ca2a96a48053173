//! Wire-level names shared by the gateway and the model servers.
//!
//! Field names are upper-case on the wire because external clients already
//! send `SIGNATURE` / `NR_WORKERS` that way; route paths are fixed so the
//! gateway can talk to any model server without configuration.

use serde::{Deserialize, Serialize};

/// Version of the gateway/model-server library, reported in every envelope.
pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");

// Request fields
pub const SIGNATURE: &str = "SIGNATURE";
pub const NR_WORKERS: &str = "NR_WORKERS";
pub const CLIENT: &str = "client";
pub const SUPPORT_MESSAGE: &str = "msg";

// Response fields
pub const ERROR: &str = "ERROR";
pub const ERROR_TYPE: &str = "ERROR_TYPE";
pub const MESSAGE: &str = "MESSAGE";
pub const DATA: &str = "data";
pub const TIME: &str = "time";
pub const APP_VERSION: &str = "app_ver";
pub const VERSION: &str = "ver";
pub const GW_UPTIME: &str = "gw-uptime";
pub const CALL_ID: &str = "call_id";
pub const WORKER_SIGNATURE: &str = "signature";

pub const PATHS: &str = "PATHS";
pub const ONLINE: &str = "ONLINE";
pub const PORT: &str = "PORT";
pub const URLS: &str = "URLS";
pub const UPTIME: &str = "UPTIME";
pub const AVAIL_SERVERS: &str = "AVAIL_SERVERS";
pub const SYSTEM_STATUS: &str = "SYSTEM_STATUS";
pub const SYSTEM_ALERTS: &str = "SYSTEM_ALERTS";
pub const SYSTEM_HISTORY: &str = "SYSTEM_HISTORY";

/// Reserved response field: the gateway answers with a file download instead of JSON.
pub const DOWNLOAD_FILE_COMMAND: &str = "DOWNLOAD";
pub const DOWNLOAD_FILE_PATH: &str = "DOWNLOAD_FILE_PATH";

// Notification drain layout
pub const NOTIF_GENERAL: &str = "GENERAL";
pub const NOTIF_TYPE: &str = "NOTIFICATION_TYPE";
pub const NOTIF_MODULE: &str = "MODULE";
pub const NOTIF_MESSAGE: &str = "NOTIF";

// Gateway routes
pub const RULE_START: &str = "/start_server";
pub const RULE_KILL: &str = "/kill_server";
pub const RULE_LIST: &str = "/list_servers";
pub const RULE_SYS: &str = "/system_status";
pub const RULE_SUPPORT: &str = "/support_update_status";
pub const RULE_SHUTDOWN: &str = "/shutdown";

// Model-server routes
pub const RULE_RUN: &str = "/run";
pub const RULE_NOTIF: &str = "/notifications";
pub const RULE_UPDATE_WORKERS: &str = "/update_workers";
pub const RULE_PATHS: &str = "/get_paths";

/// `SIGNATURE` value accepted by `/kill_server` to mean every child.
pub const KILL_ALL: &str = "*";

/// Confirmation token required by `/shutdown`.
pub const KILL_CMD: &str = "SAFE_KILL_SERVER_CMD";

/// Endpoint host value marking a headless support process.
pub const SUPPORT_PROCESS_NO_HOST: &str = "NO_HOST";

/// Available/total ratios below which the gateway raises alerts.
pub const MEM_ALERT_THR: f64 = 0.15;
pub const DISK_ALERT_THR: f64 = 0.10;

/// Body of `/get_paths`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsResponse {
    #[serde(rename = "PATHS")]
    pub paths: Vec<String>,
}

/// Normalize a route so it always starts with `/`.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
