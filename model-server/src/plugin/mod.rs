//! Plugin discovery and the worker contract.

pub mod catalog;
pub mod resolver;
pub mod screen;
mod worker;

pub use catalog::{builtin_catalog, PluginCatalog, PluginClass, PluginModule};
pub use resolver::{PluginDescriptor, PluginResolver, ResolveError};
pub use worker::{Worker, WorkerContext, WorkerError, WorkerFactory};
