//! Name-convention plugin lookup.

use serde_json::{Map, Value};

use super::catalog::{PluginCatalog, PluginModule};
use super::screen::{self, ScreenReport};
use super::worker::WorkerFactory;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Error with finding plugin '{name}' in locations {locations:?}")]
    ModuleNotFound { name: String, locations: Vec<String> },

    #[error("Could not find class match for '{name}'. Available classes are: {available:?}")]
    ClassNotFound { name: String, available: Vec<String> },
}

/// A resolved plugin, ready to instantiate workers.
#[derive(Clone)]
pub struct PluginDescriptor {
    pub module_name: String,
    pub location: String,
    pub class_name: String,
    pub factory: WorkerFactory,
    pub default_config: Map<String, Value>,
    pub trusted: bool,
    pub screening: Option<ScreenReport>,
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("module_name", &self.module_name)
            .field("location", &self.location)
            .field("class_name", &self.class_name)
            .field("trusted", &self.trusted)
            .finish()
    }
}

/// Strip underscores and case-fold.
pub fn normalize(name: &str) -> String {
    name.replace('_', "").to_lowercase()
}

pub struct PluginResolver<'a> {
    catalog: &'a PluginCatalog,
    locations: Vec<String>,
    trusted_locations: Vec<String>,
    safety_check: bool,
}

impl<'a> PluginResolver<'a> {
    pub fn new(catalog: &'a PluginCatalog, locations: Vec<String>) -> Self {
        Self {
            catalog,
            locations,
            trusted_locations: Vec::new(),
            safety_check: false,
        }
    }

    pub fn with_trusted_locations(mut self, trusted: Vec<String>) -> Self {
        self.trusted_locations = trusted;
        self
    }

    pub fn with_safety_check(mut self, enabled: bool) -> Self {
        self.safety_check = enabled;
        self
    }

    fn find_module(&self, locations: &[String], wanted: &str) -> Option<(&'a PluginModule, String)> {
        locations.iter().find_map(|location| {
            self.catalog
                .modules_in(location)
                .iter()
                .find(|m| normalize(m.name) == wanted)
                .map(|m| (m, location.clone()))
        })
    }

    /// Resolve `name` to the class `<Name><Suffix>` of a matching module.
    ///
    /// Trusted locations are searched first and skip the safety screen.
    pub fn resolve(&self, name: &str, suffix: Option<&str>) -> Result<PluginDescriptor, ResolveError> {
        let wanted = normalize(name);

        let (module, location, trusted) =
            match self.find_module(&self.trusted_locations, &wanted) {
                Some((module, location)) => (module, location, true),
                None => match self.find_module(&self.locations, &wanted) {
                    Some((module, location)) => (module, location, false),
                    None => {
                        let mut locations = self.trusted_locations.clone();
                        locations.extend(self.locations.iter().cloned());
                        return Err(ResolveError::ModuleNotFound {
                            name: wanted,
                            locations,
                        });
                    }
                },
            };

        tracing::info!(
            "Found {} plugin '{}' in '{}'",
            if trusted { "\"SAFE\"" } else { "\"USER\"" },
            name,
            location
        );

        let screening = if self.safety_check && !trusted {
            let report = screen::check_source(module.source);
            if !report.is_clean() {
                tracing::error!(
                    "Unsafe code in plugin module '{}':\n{}",
                    module.name,
                    report.render()
                );
                tracing::warn!("In future this will STOP the usage of this plugin");
            }
            Some(report)
        } else {
            None
        };

        let class_key = format!("{}{}", wanted, normalize(suffix.unwrap_or("")));
        let matches: Vec<_> = module
            .classes
            .iter()
            .filter(|c| normalize(c.name) == class_key)
            .collect();

        let class = match matches.as_slice() {
            [class] => *class,
            _ => {
                return Err(ResolveError::ClassNotFound {
                    name: name.to_string(),
                    available: module.classes.iter().map(|c| c.name.to_string()).collect(),
                })
            }
        };

        tracing::info!("Plugin '{}' loaded from '{}'", name, location);

        Ok(PluginDescriptor {
            module_name: module.name.to_string(),
            location,
            class_name: class.name.to_string(),
            factory: class.factory,
            default_config: module.default_config.clone().unwrap_or_default(),
            trusted,
            screening,
        })
    }
}
