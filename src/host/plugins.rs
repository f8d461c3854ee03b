//! Plugin registry
//!
//! Optional host libraries announce themselves here under a well-known name
//! together with a table of named exports. Consumers probe for a plugin by
//! name and resolve exports at runtime, downcasting each to the type they
//! expect. A missing plugin or an export of the wrong type is reported, never
//! assumed.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

/// A type-erased export
pub type Export = Arc<dyn Any + Send + Sync>;

/// A registered plugin and its exports
#[derive(Clone)]
pub struct PluginHandle {
    pub name: String,
    pub version: String,
    pub enabled: bool,
    exports: HashMap<String, Export>,
}

impl PluginHandle {
    /// Start describing a plugin
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            enabled: true,
            exports: HashMap::new(),
        }
    }

    /// Add a named export
    pub fn with_export<T: Any + Send + Sync>(mut self, symbol: &str, value: Arc<T>) -> Self {
        self.exports.insert(symbol.to_string(), value);
        self
    }

    /// Mark the plugin as disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Raw export lookup
    pub fn export(&self, symbol: &str) -> Option<Export> {
        self.exports.get(symbol).cloned()
    }

    /// Resolve an export as a concrete type
    pub fn resolve<T: Any + Send + Sync>(&self, symbol: &str) -> Option<Arc<T>> {
        self.export(symbol)?.downcast::<T>().ok()
    }

    /// Names of all exports
    pub fn symbols(&self) -> Vec<String> {
        self.exports.keys().cloned().collect()
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("enabled", &self.enabled)
            .field("exports", &self.symbols())
            .finish()
    }
}

/// Registry of installed host plugins
#[derive(Default)]
pub struct PluginRegistry {
    plugins: DashMap<String, PluginHandle>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a plugin
    pub fn register(&self, handle: PluginHandle) {
        info!(
            plugin = %handle.name,
            version = %handle.version,
            enabled = handle.enabled,
            "Plugin registered"
        );
        self.plugins.insert(handle.name.to_lowercase(), handle);
    }

    /// Remove a plugin
    pub fn unregister(&self, name: &str) -> bool {
        self.plugins.remove(&name.to_lowercase()).is_some()
    }

    /// Look up a plugin by name (case insensitive)
    pub fn get(&self, name: &str) -> Option<PluginHandle> {
        self.plugins.get(&name.to_lowercase()).map(|p| p.clone())
    }

    /// Whether a plugin is registered and enabled
    pub fn is_enabled(&self, name: &str) -> bool {
        self.plugins
            .get(&name.to_lowercase())
            .map(|p| p.enabled)
            .unwrap_or(false)
    }

    /// Names of registered plugins
    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name.clone()).collect()
    }
}
