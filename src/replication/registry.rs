//! # Replication Plugin Registry
//!
//! Maps plugin names to registered instances, with at most one entry
//! marked as the default. Every lookup and mutation takes the same lock,
//! so a control thread may (un)register while leader threads `find`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::info;

use super::hook::WalReplication;

static GLOBAL: OnceLock<ReplicationRegistry> = OnceLock::new();

/// The process-wide registry, created empty on first use.
pub fn global() -> &'static ReplicationRegistry {
    GLOBAL.get_or_init(ReplicationRegistry::new)
}

#[derive(Default)]
struct Directory {
    /// Plugins by name
    by_name: HashMap<String, Arc<dyn WalReplication>>,

    /// Name of the default plugin
    default: Option<String>,
}

/// Registry of replication plugins.
#[derive(Default)]
pub struct ReplicationRegistry {
    inner: Mutex<Directory>,
}

impl ReplicationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation is a single step under the lock, so a poisoned
    // directory is still consistent.
    fn lock(&self) -> MutexGuard<'_, Directory> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `plugin`, replacing any plugin with the same name.
    ///
    /// With `make_default` the plugin also becomes the default.
    pub fn register(&self, plugin: Arc<dyn WalReplication>, make_default: bool) {
        let name = plugin.name().to_string();
        let mut directory = self.lock();

        let replaced = directory.by_name.insert(name.clone(), plugin).is_some();
        if make_default {
            directory.default = Some(name.clone());
        }

        info!(plugin = %name, make_default, replaced, "replication plugin registered");
    }

    /// Remove `plugin` if its name still maps to this exact instance.
    ///
    /// Returns whether anything was removed.
    pub fn unregister(&self, plugin: &Arc<dyn WalReplication>) -> bool {
        let name = plugin.name();
        let mut directory = self.lock();

        let matches = directory
            .by_name
            .get(name)
            .is_some_and(|registered| Arc::ptr_eq(registered, plugin));
        if !matches {
            return false;
        }

        directory.by_name.remove(name);
        if directory.default.as_deref() == Some(name) {
            directory.default = None;
        }

        info!(plugin = %name, "replication plugin unregistered");
        true
    }

    /// Look up `name`, or the default plugin when `name` is `None`.
    pub fn find(&self, name: Option<&str>) -> Option<Arc<dyn WalReplication>> {
        let directory = self.lock();
        let name = match name {
            Some(name) => name,
            None => directory.default.as_deref()?,
        };
        directory.by_name.get(name).cloned()
    }

    /// Name of the default plugin, if any.
    pub fn default_name(&self) -> Option<String> {
        self.lock().default.clone()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.lock().by_name.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ReplicationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationRegistry")
            .field("names", &self.names())
            .field("default", &self.default_name())
            .finish()
    }
}
