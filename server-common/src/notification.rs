//! Bounded notification queues.
//!
//! Any component (server, worker) appends to its own queue; the model
//! server's `/notifications` endpoint drains every queue destructively and
//! groups the entries by call id.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::protocol::{NOTIF_GENERAL, NOTIF_MESSAGE, NOTIF_MODULE, NOTIF_TYPE, TIME};
use crate::timefmt::now_str_precise;

/// Maximum characters kept from a notification message.
pub const MAX_MESSAGE_CHARS: usize = 255;

/// Default queue capacity for a server process.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Kind used for plain log-style notifications.
pub const KIND_LOG: &str = "log";

/// A single notification record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<u64>,
    pub timestamp: String,
}

/// FIFO queue that drops the oldest entry once `capacity` is reached.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    module: String,
    version: Option<String>,
    capacity: usize,
    entries: Arc<Mutex<VecDeque<Notification>>>,
}

impl NotificationQueue {
    pub fn new(module: impl Into<String>, capacity: usize) -> Self {
        Self {
            module: module.into(),
            version: None,
            capacity: capacity.max(1),
            entries: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Append a general notification.
    pub fn push(&self, kind: &str, message: impl AsRef<str>) {
        self.append(kind, message.as_ref(), None, None);
    }

    /// Append a notification correlated with a call id.
    pub fn push_for_call(&self, call_id: u64, kind: &str, message: impl AsRef<str>) {
        self.append(kind, message.as_ref(), None, Some(call_id));
    }

    /// Append a notification carrying structured info.
    pub fn push_with_info(&self, kind: &str, message: impl AsRef<str>, info: Value) {
        self.append(kind, message.as_ref(), Some(info), None);
    }

    fn append(&self, kind: &str, message: &str, info: Option<Value>, call_id: Option<u64>) {
        let notification = Notification {
            module: self.module.clone(),
            version: self.version.clone(),
            kind: kind.to_string(),
            message: message.chars().take(MAX_MESSAGE_CHARS).collect(),
            info,
            call_id,
            timestamp: now_str_precise(),
        };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(notification);
    }

    /// Remove and return every queued notification, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Group drained notifications into `{"GENERAL": [...], "<call id>": [...]}`.
pub fn group_by_call(notifications: Vec<Notification>) -> Map<String, Value> {
    let mut general = Vec::new();
    let mut grouped = Map::new();

    for notif in notifications {
        let mut entry = Map::new();
        entry.insert(NOTIF_TYPE.to_string(), Value::String(notif.kind));
        entry.insert(NOTIF_MODULE.to_string(), Value::String(notif.module));
        entry.insert(TIME.to_string(), Value::String(notif.timestamp));
        entry.insert(NOTIF_MESSAGE.to_string(), Value::String(notif.message));
        if let Some(info) = notif.info {
            entry.insert("INFO".to_string(), info);
        }

        match notif.call_id {
            Some(call_id) => {
                let list = grouped
                    .entry(call_id.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(items) = list {
                    items.push(Value::Object(entry));
                }
            }
            None => general.push(Value::Object(entry)),
        }
    }

    grouped.insert(NOTIF_GENERAL.to_string(), Value::Array(general));
    grouped
}
