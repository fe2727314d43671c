//! Database Backend Abstractions
//!
//! Backends are looked up by name through an [`AdapterRegistry`]. Names can
//! be aliases of other names; built-in adapters are constructed the first
//! time they are requested and cached afterwards.

pub mod core;
pub mod postgres;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use once_cell::sync::Lazy;

// Re-export core traits and types
pub use core::*;
pub use postgres::{ClientTransport, PooledTransport, PostgresAdapter};

use crate::error::{OrmError, OrmResult};

/// Deferred adapter constructor
pub type AdapterLoader = Arc<dyn Fn() -> Arc<dyn DatabaseAdapter> + Send + Sync>;

static GLOBAL_ADAPTERS: Lazy<AdapterRegistry> = Lazy::new(AdapterRegistry::with_defaults);

/// Name-to-adapter lookup with aliases, lazy loading and overrides
pub struct AdapterRegistry {
    aliases: RwLock<HashMap<String, String>>,
    loaders: DashMap<String, AdapterLoader>,
    adapters: DashMap<String, Arc<dyn DatabaseAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            aliases: RwLock::new(HashMap::new()),
            loaders: DashMap::new(),
            adapters: DashMap::new(),
        }
    }

    /// A registry knowing `postgres` and its aliases `postgresql` and `pg`
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_loader("postgres", Arc::new(|| Arc::new(PostgresAdapter::new())));
        registry.alias("postgresql", "postgres");
        registry.alias("pg", "postgres");
        registry
    }

    /// Process-wide registry used by `Driver::new`
    pub fn global() -> &'static AdapterRegistry {
        &GLOBAL_ADAPTERS
    }

    /// Register an adapter instance, overriding anything known under `name`
    pub fn add(&self, name: &str, adapter: Arc<dyn DatabaseAdapter>) {
        self.loaders.remove(name);
        self.adapters.insert(name.to_string(), adapter);
        tracing::debug!("Registered database adapter '{}'", name);
    }

    /// Register a constructor that runs on first lookup. Replaces a cached instance.
    pub fn register_loader(&self, name: &str, loader: AdapterLoader) {
        self.adapters.remove(name);
        self.loaders.insert(name.to_string(), loader);
    }

    /// Make `alias` resolve to `target`
    pub fn alias(&self, alias: &str, target: &str) {
        self.aliases
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(alias.to_string(), target.to_string());
    }

    /// Follow aliases to a canonical name
    pub fn resolve_name(&self, name: &str) -> OrmResult<String> {
        let aliases = self.aliases.read().unwrap_or_else(|e| e.into_inner());
        let mut seen = HashSet::new();
        let mut current = name.to_string();

        while let Some(target) = aliases.get(&current) {
            if !seen.insert(current.clone()) {
                return Err(OrmError::AdapterAliasCycle(name.to_string()));
            }
            current = target.clone();
        }
        Ok(current)
    }

    /// Look up an adapter by name or alias
    pub fn get(&self, name: &str) -> OrmResult<Arc<dyn DatabaseAdapter>> {
        let canonical = self.resolve_name(name)?;

        if let Some(adapter) = self.adapters.get(&canonical) {
            return Ok(adapter.clone());
        }

        let loader = self
            .loaders
            .get(&canonical)
            .map(|loader| loader.clone())
            .ok_or_else(|| OrmError::UnknownAdapter(name.to_string()))?;

        // Concurrent first lookups construct at most one cached instance
        let adapter = self
            .adapters
            .entry(canonical)
            .or_insert_with(|| loader())
            .clone();
        Ok(adapter)
    }

    /// Whether `name` resolves to a known adapter
    pub fn contains(&self, name: &str) -> bool {
        self.resolve_name(name)
            .map(|canonical| self.adapters.contains_key(&canonical) || self.loaders.contains_key(&canonical))
            .unwrap_or(false)
    }

    /// Canonical names of every registered adapter
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .adapters
            .iter()
            .map(|entry| entry.key().clone())
            .chain(self.loaders.iter().map(|entry| entry.key().clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, DriverOptions};
    use crate::connection::PoolRegistry;
    use crate::sql::dialect::{Dialect, PostgresDialect};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct NamedAdapter(&'static str);

    impl DatabaseAdapter for NamedAdapter {
        fn name(&self) -> &'static str {
            self.0
        }

        fn dialect(&self) -> Arc<dyn Dialect> {
            Arc::new(PostgresDialect::new())
        }

        fn create_transport(
            &self,
            _config: &ConnectionConfig,
            _options: &DriverOptions,
            _pools: &PoolRegistry,
        ) -> OrmResult<Arc<dyn Transport>> {
            Err(OrmError::Connection("not connectable".to_string()))
        }
    }

    #[test]
    fn test_aliases_resolve_to_postgres() {
        let registry = AdapterRegistry::with_defaults();
        for name in ["postgres", "postgresql", "pg"] {
            assert_eq!(registry.get(name).unwrap().name(), "postgres");
        }
        assert_eq!(registry.names(), vec!["postgres".to_string()]);
    }

    #[test]
    fn test_unknown_adapter() {
        let registry = AdapterRegistry::with_defaults();
        assert!(matches!(registry.get("oracle"), Err(OrmError::UnknownAdapter(name)) if name == "oracle"));
        assert!(!registry.contains("oracle"));
    }

    #[test]
    fn test_add_overrides_builtin() {
        let registry = AdapterRegistry::with_defaults();
        registry.add("postgres", Arc::new(NamedAdapter("custom")));
        assert_eq!(registry.get("pg").unwrap().name(), "custom");
    }

    #[test]
    fn test_loader_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = AdapterRegistry::new();
        let counter = calls.clone();
        registry.register_loader(
            "lazy",
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Arc::new(NamedAdapter("lazy"))
            }),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        registry.get("lazy").unwrap();
        registry.get("lazy").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_alias_cycle_is_an_error() {
        let registry = AdapterRegistry::new();
        registry.alias("a", "b");
        registry.alias("b", "a");
        assert!(matches!(registry.get("a"), Err(OrmError::AdapterAliasCycle(_))));

        registry.alias("self", "self");
        assert!(matches!(registry.resolve_name("self"), Err(OrmError::AdapterAliasCycle(_))));
    }
}
