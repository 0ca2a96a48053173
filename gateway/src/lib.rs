//! Inference gateway: launches model servers and support processes,
//! routes business requests to them by `SIGNATURE`, and reports fleet
//! and host health.

pub mod config;
pub mod error;
pub mod fleet;
pub mod health;
pub mod lifecycle;
pub mod logging;
pub mod monitor;
pub mod routes;
pub mod state;
pub mod state_history;
pub mod supervisor;

pub use config::{Config, EndpointConfig, GatewayArgs};
pub use error::{Error, Result};
pub use fleet::Fleet;
pub use state::{AppState, GatewayPhase};
