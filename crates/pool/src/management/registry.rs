//! The host management registry seam.
//!
//! [`ManagementRegistry`] abstracts the host facility live objects are
//! published into. [`NoopRegistry`] stands in where no such facility
//! exists; [`InMemoryRegistry`] is an in-process implementation.

use std::fmt;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;

use crate::management::name::ManagementName;

static GLOBAL_REGISTRY: LazyLock<Arc<InMemoryRegistry>> =
    LazyLock::new(|| Arc::new(InMemoryRegistry::new()));

/// Errors raised by registry implementations.
///
/// These never escape the management coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Something is already registered under the name
    #[error("'{name}' is already registered")]
    AlreadyRegistered {
        /// The management name
        name: String,
    },

    /// Nothing is registered under the name
    #[error("'{name}' is not registered")]
    NotRegistered {
        /// The management name
        name: String,
    },

    /// A name component cannot be represented
    #[error("malformed management name '{name}': {reason}")]
    MalformedName {
        /// The name built so far
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// The registry refused or failed the operation
    #[error("management registry unavailable: {reason}")]
    Unavailable {
        /// The failure reason
        reason: String,
    },
}

/// An object published for monitoring and administration.
pub trait ManagedObject: Send + Sync {
    /// Kind of endpoint, matching the `type` property of its name.
    fn kind(&self) -> &str;

    /// Current attribute snapshot.
    fn attributes(&self) -> Vec<(String, String)>;
}

/// Host-provided store of `name → live object`.
pub trait ManagementRegistry: Send + Sync {
    /// Publish `object` under `name`. Fails if the name is taken.
    fn register(
        &self,
        name: &ManagementName,
        object: Arc<dyn ManagedObject>,
    ) -> Result<(), RegistryError>;

    /// Retract whatever is published under `name`. Fails if nothing is.
    fn unregister(&self, name: &ManagementName) -> Result<(), RegistryError>;

    /// Whether something is published under `name`.
    fn is_registered(&self, name: &ManagementName) -> bool;
}

// ---------------------------------------------------------------------------
// NoopRegistry
// ---------------------------------------------------------------------------

/// Registry for environments without a management facility.
///
/// Accepts every registration and remembers none of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRegistry;

impl ManagementRegistry for NoopRegistry {
    fn register(
        &self,
        _name: &ManagementName,
        _object: Arc<dyn ManagedObject>,
    ) -> Result<(), RegistryError> {
        Ok(())
    }

    fn unregister(&self, _name: &ManagementName) -> Result<(), RegistryError> {
        Ok(())
    }

    fn is_registered(&self, _name: &ManagementName) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// InMemoryRegistry
// ---------------------------------------------------------------------------

/// Concurrent in-process registry.
#[derive(Default)]
pub struct InMemoryRegistry {
    entries: DashMap<ManagementName, Arc<dyn ManagedObject>>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// The object published under `name`.
    #[must_use]
    pub fn get(&self, name: &ManagementName) -> Option<Arc<dyn ManagedObject>> {
        self.entries.get(name).map(|e| Arc::clone(e.value()))
    }

    /// All registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<ManagementName> {
        let mut names: Vec<_> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ManagementRegistry for InMemoryRegistry {
    fn register(
        &self,
        name: &ManagementName,
        object: Arc<dyn ManagedObject>,
    ) -> Result<(), RegistryError> {
        match self.entries.entry(name.clone()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered {
                name: name.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(object);
                Ok(())
            }
        }
    }

    fn unregister(&self, name: &ManagementName) -> Result<(), RegistryError> {
        self.entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotRegistered {
                name: name.to_string(),
            })
    }

    fn is_registered(&self, name: &ManagementName) -> bool {
        self.entries.contains_key(name)
    }
}

impl fmt::Debug for InMemoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRegistry")
            .field("names", &self.names())
            .finish()
    }
}
