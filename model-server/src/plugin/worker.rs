//! The worker contract implemented by every plugin.

use serde_json::{Map, Value};

use inference_common::notification::{NotificationQueue, KIND_LOG};

/// Failures raised by plugin code.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Prediction failed: {0}")]
    Predict(String),
}

/// Builds a worker instance from its context.
pub type WorkerFactory = fn(WorkerContext) -> Box<dyn Worker>;

/// Everything a worker receives at construction.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub worker_id: usize,
    config: Map<String, Value>,
    notifications: NotificationQueue,
}

impl WorkerContext {
    /// Merge the plugin's default config with the upstream endpoint config.
    ///
    /// Upstream keys win; keys are matched case-insensitively.
    pub fn new(
        worker_id: usize,
        default_config: &Map<String, Value>,
        upstream_config: &Map<String, Value>,
        notifications: NotificationQueue,
    ) -> Self {
        let mut config = Map::new();
        for (key, value) in default_config.iter().chain(upstream_config.iter()) {
            config.insert(key.to_uppercase(), value.clone());
        }
        Self {
            worker_id,
            config,
            notifications,
        }
    }

    pub fn config(&self, key: &str) -> Option<&Value> {
        self.config.get(&key.to_uppercase())
    }

    pub fn config_f64(&self, key: &str) -> f64 {
        match self.config(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            Some(Value::Bool(b)) => f64::from(u8::from(*b)),
            _ => 0.0,
        }
    }

    pub fn config_bool(&self, key: &str) -> bool {
        match self.config(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "1" | "yes"),
            _ => false,
        }
    }

    pub fn config_data(&self) -> &Map<String, Value> {
        &self.config
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    /// Record a log notification; workers never write to the process log.
    pub fn notify(&self, message: impl AsRef<str>) {
        self.notifications.push(KIND_LOG, message);
    }
}

/// A stateful execution unit. Instances are owned by one pool slot and are
/// only ever driven by one request at a time.
pub trait Worker: Send {
    fn context(&self) -> &WorkerContext;

    /// Called once after construction, before the slot is offered.
    fn load(&mut self) -> Result<(), WorkerError> {
        Ok(())
    }

    fn pre_process(&mut self, inputs: &Map<String, Value>) -> Result<Value, WorkerError>;

    fn predict(&mut self, prepared: Value) -> Result<Value, WorkerError>;

    fn post_process(&mut self, prediction: Value) -> Result<Value, WorkerError>;

    fn execute(&mut self, inputs: &Map<String, Value>, call_id: u64) -> Result<Value, WorkerError> {
        self.context().notifications().push_for_call(
            call_id,
            KIND_LOG,
            format!("Worker {} executing call {}", self.context().worker_id, call_id),
        );
        let prepared = self.pre_process(inputs)?;
        let prediction = self.predict(prepared)?;
        self.post_process(prediction)
    }
}
