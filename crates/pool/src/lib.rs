//! # Sluice pool support
//!
//! Support subsystem for the sluice database-connection pool:
//!
//! - [`identity`] gives every pooled resource a process-unique token;
//! - [`management`] publishes live pools into a host management registry;
//! - [`credentials`] recovers default credentials from holder objects;
//! - [`overrides`] persists per-pool configuration overrides as one string;
//! - [`tester`] resolves and caches the default connection tester.
//!
//! The pooling engine itself lives elsewhere and calls into this crate.

pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod identity;
pub mod management;
pub mod overrides;
pub mod tester;

pub use config::{ConfigSource, EnvSource, ManagementSettings, MapSource};
pub use credentials::{AccessorTable, CredentialHolder, DbAuth, NULL_AUTH, discover};
pub use error::{Error, Result};
pub use events::{EventBus, ManagementEvent};
pub use identity::{IdentityToken, IdentityTokenAllocator, allocate_identity_token};
pub use management::{
    ActiveManagementCoordinator, InMemoryRegistry, ManagementCoordinator, ManagementName,
    ManagementRegistry, NoopRegistry, NullManagementCoordinator, PooledResource,
};
pub use overrides::{OverrideMap, OverrideValue};
pub use tester::{ConnectionTester, TesterResolver};

/// Common imports for pooling engines embedding this crate.
pub mod prelude {
    pub use crate::config::{ConfigSource, ManagementSettings, MapSource};
    pub use crate::credentials::{CredentialHolder, DbAuth, NULL_AUTH};
    pub use crate::error::{Error, Result};
    pub use crate::identity::{IdentityToken, allocate_identity_token};
    pub use crate::management::{ManagementCoordinator, ManagementRegistry, PooledResource};
    pub use crate::overrides::{OverrideMap, OverrideValue};
}
