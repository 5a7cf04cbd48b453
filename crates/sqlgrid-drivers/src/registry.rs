//! Scheme → driver registry.
//!
//! A DSN names its backend by URL scheme; the registry resolves the scheme
//! (including the common aliases) to a registered driver. The pool receives
//! the registry as its [`DriverResolver`], so which backends are linked is
//! decided here, not in the pool.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use sqlgrid_pool::{Driver, DriverResolver};

use crate::postgres::PostgresDriver;
use crate::sqlite::SqliteDriver;

/// Registry of available database drivers, keyed by DSN scheme.
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered under their
    /// scheme aliases.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(&["sqlite", "sqlite3", "file"], Arc::new(SqliteDriver::new()));
        registry.register(
            &["postgres", "postgresql", "pg"],
            Arc::new(PostgresDriver::new()),
        );
        registry
    }

    /// Register a driver under one or more DSN schemes.
    pub fn register(&mut self, schemes: &[&str], driver: Arc<dyn Driver>) {
        info!(driver = driver.name(), ?schemes, "registering database driver");
        for scheme in schemes {
            self.drivers.insert(scheme.to_string(), driver.clone());
        }
    }

    /// All registered schemes, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverResolver for DriverRegistry {
    fn driver_for(&self, scheme: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.get(scheme).cloned()
    }
}
