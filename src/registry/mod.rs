//! Namespace registries for pluggable protocol components.
//!
//! Every polymorphic element kind — descriptions, transports, security
//! layers — is identified by a namespace string. A [`Registry`] maps
//! namespaces to the adapter, handler or manager registered for them;
//! lookups that miss drive the protocol's "unsupported" paths.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::transport::TransportManager;

/// A component identified by a namespace string.
pub trait Namespaced {
    /// The namespace this component serves.
    fn namespace(&self) -> &str;
}

/// Thread-safe namespace → component map.
///
/// Registering a second component for the same namespace replaces the first
/// and returns it.
pub struct Registry<A: ?Sized + Namespaced> {
    entries: RwLock<HashMap<String, Arc<A>>>,
}

impl<A: ?Sized + Namespaced> Registry<A> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a component under its own namespace.
    pub fn register(&self, entry: Arc<A>) -> Option<Arc<A>> {
        let namespace = entry.namespace().to_string();
        self.entries.write().insert(namespace, entry)
    }

    /// Look up the component for a namespace.
    pub fn lookup(&self, namespace: &str) -> Option<Arc<A>> {
        self.entries.read().get(namespace).cloned()
    }

    /// Whether a namespace has a registered component.
    pub fn contains(&self, namespace: &str) -> bool {
        self.entries.read().contains_key(namespace)
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<A: ?Sized + Namespaced> Default for Registry<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of transport managers, ordered for fallback selection.
///
/// Managers are ranked by their own priority; an endpoint's configured
/// transport preference list overrides that ranking for the namespaces it
/// names.
pub struct TransportManagerRegistry {
    managers: RwLock<Vec<Arc<dyn TransportManager>>>,
}

impl TransportManagerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            managers: RwLock::new(Vec::new()),
        }
    }

    /// Register a manager, replacing any previous one for the same
    /// namespace. The list stays sorted by descending manager priority.
    pub fn register(&self, manager: Arc<dyn TransportManager>) {
        let mut managers = self.managers.write();
        managers.retain(|m| m.namespace() != manager.namespace());
        let at = managers
            .iter()
            .position(|m| m.priority() < manager.priority())
            .unwrap_or(managers.len());
        managers.insert(at, manager);
    }

    /// Look up the manager for a namespace.
    pub fn by_namespace(&self, namespace: &str) -> Option<Arc<dyn TransportManager>> {
        self.managers
            .read()
            .iter()
            .find(|m| m.namespace() == namespace)
            .cloned()
    }

    /// The most preferred manager whose namespace is not blacklisted.
    ///
    /// Namespaces in `preference` win, in list order; remaining managers are
    /// considered in descending priority order.
    pub fn best_available(
        &self,
        preference: &[String],
        blacklist: &HashSet<String>,
    ) -> Option<Arc<dyn TransportManager>> {
        let managers = self.managers.read();

        for namespace in preference {
            if blacklist.contains(namespace) {
                continue;
            }
            if let Some(manager) = managers.iter().find(|m| m.namespace() == namespace) {
                return Some(manager.clone());
            }
        }

        managers
            .iter()
            .find(|m| !blacklist.contains(m.namespace()))
            .cloned()
    }

    /// Number of registered managers.
    pub fn len(&self) -> usize {
        self.managers.read().len()
    }

    /// Whether no managers are registered.
    pub fn is_empty(&self) -> bool {
        self.managers.read().is_empty()
    }
}

impl Default for TransportManagerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
