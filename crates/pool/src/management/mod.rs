//! Management registry publication.
//!
//! Pools are published into a host [`ManagementRegistry`] under
//! deterministic [`ManagementName`]s: one process-wide directory endpoint
//! plus one endpoint per live pooled resource.

pub mod coordinator;
pub mod name;
pub mod objects;
pub mod registry;

pub use coordinator::{
    ActiveManagementCoordinator, ManagementCoordinator, NullManagementCoordinator,
};
pub use name::ManagementName;
pub use objects::{PoolDirectory, PooledResource, PooledResourceView};
pub use registry::{
    InMemoryRegistry, ManagedObject, ManagementRegistry, NoopRegistry, RegistryError,
};
