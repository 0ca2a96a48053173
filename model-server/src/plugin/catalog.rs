//! Compile-time plugin catalog.
//!
//! A catalog is an ordered set of namespaces ("locations"), each holding
//! plugin modules. A module carries its own source text (for screening), its
//! default configuration and the worker classes it exports.

use serde_json::{Map, Value};

use super::worker::WorkerFactory;

/// A worker class exported by a plugin module.
#[derive(Clone)]
pub struct PluginClass {
    pub name: &'static str,
    pub factory: WorkerFactory,
}

impl std::fmt::Debug for PluginClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginClass").field("name", &self.name).finish()
    }
}

/// A plugin module.
#[derive(Debug, Clone)]
pub struct PluginModule {
    pub name: &'static str,
    pub source: &'static str,
    pub default_config: Option<Map<String, Value>>,
    pub classes: Vec<PluginClass>,
}

#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    locations: Vec<(String, Vec<PluginModule>)>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module under `location`, creating the namespace if needed.
    pub fn register(&mut self, location: &str, module: PluginModule) {
        match self.locations.iter_mut().find(|(name, _)| name == location) {
            Some((_, modules)) => modules.push(module),
            None => self.locations.push((location.to_string(), vec![module])),
        }
    }

    /// Modules under `location`; unknown locations are empty.
    pub fn modules_in(&self, location: &str) -> &[PluginModule] {
        self.locations
            .iter()
            .find(|(name, _)| name == location)
            .map(|(_, modules)| modules.as_slice())
            .unwrap_or(&[])
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.locations.iter().map(|(name, _)| name.as_str())
    }
}

/// Namespace holding the bundled demonstration plugins.
pub const BUILTIN_LOCATION: &str = "endpoints";

/// Catalog with every plugin compiled into this binary.
pub fn builtin_catalog() -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    catalog.register(BUILTIN_LOCATION, crate::endpoints::dummy_model_a::module());
    catalog.register(BUILTIN_LOCATION, crate::endpoints::dummy_model_b::module());
    catalog
}
