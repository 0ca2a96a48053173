//! Worker-pool model server.
//!
//! One process serves one plugin: it resolves the plugin from the compiled
//! catalog, keeps a pool of its workers and exposes execution, resize,
//! notification and path-discovery endpoints.

pub mod api;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod plugin;
pub mod pool;
pub mod server;
pub mod state;

pub use config::ServerArgs;
pub use error::{Error, Result};
pub use state::{AppState, Phase};
