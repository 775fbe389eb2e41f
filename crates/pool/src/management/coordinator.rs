//! Publishing pools into the management registry.
//!
//! Registration is best-effort. A management side channel must never break
//! the pool, so no method here returns an error: every failure is logged,
//! emitted on the [`EventBus`] if one is attached, and swallowed.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{ConfigSource, ManagementSettings};
use crate::events::{EventBus, ManagementEvent};
use crate::identity::IdentityToken;
use crate::management::name::ManagementName;
use crate::management::objects::{PoolDirectory, PooledResource, PooledResourceView};
use crate::management::registry::{ManagedObject, ManagementRegistry, RegistryError};

const LOCK_STRIPES: usize = 16;

const STALE_DIRECTORY: &str = "a directory endpoint is already registered; an application \
     was probably undeployed without closing all of its pools, which leaks resources over time";

const DUPLICATE_ASSIGNED_NAME: &str = "identity tokens are excluded from management names, \
     so every pooled resource needs a unique assigned name";

const ALTERED_IDENTITY_TOKEN: &str = "this should not happen unless the resource's \
     identity token was modified";

/// Publishes and retracts management endpoints for the pool subsystem.
///
/// Every method is idempotent and infallible from the caller's view.
pub trait ManagementCoordinator: Send + Sync {
    /// Publish the process-wide directory endpoint, replacing a stale one.
    fn publish_directory(&self);

    /// Retract the directory endpoint if it is published.
    fn retract_directory(&self);

    /// Publish the endpoint for `resource`, replacing any registration
    /// under the same name.
    fn publish_resource(&self, resource: Arc<dyn PooledResource>);

    /// Retract the endpoint for `resource` if it is published.
    fn retract_resource(&self, resource: &dyn PooledResource);
}

// ---------------------------------------------------------------------------
// NullManagementCoordinator
// ---------------------------------------------------------------------------

/// Coordinator used when management is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullManagementCoordinator;

impl ManagementCoordinator for NullManagementCoordinator {
    fn publish_directory(&self) {}

    fn retract_directory(&self) {}

    fn publish_resource(&self, _resource: Arc<dyn PooledResource>) {}

    fn retract_resource(&self, _resource: &dyn PooledResource) {}
}

// ---------------------------------------------------------------------------
// ActiveManagementCoordinator
// ---------------------------------------------------------------------------

/// Coordinator backed by a real [`ManagementRegistry`].
pub struct ActiveManagementCoordinator {
    registry: Arc<dyn ManagementRegistry>,
    settings: ManagementSettings,
    directory: Arc<PoolDirectory>,
    events: Option<Arc<EventBus>>,
    /// Serializes check-then-act per name; names hash onto stripes.
    stripes: [Mutex<()>; LOCK_STRIPES],
}

impl ActiveManagementCoordinator {
    /// Create a coordinator with explicit settings.
    pub fn new(registry: Arc<dyn ManagementRegistry>, settings: ManagementSettings) -> Self {
        Self {
            registry,
            settings,
            directory: Arc::new(PoolDirectory::new()),
            events: None,
            stripes: std::array::from_fn(|_| Mutex::new(())),
        }
    }

    /// Create a coordinator reading its naming settings from `source`.
    pub fn from_source(registry: Arc<dyn ManagementRegistry>, source: &dyn ConfigSource) -> Self {
        Self::new(registry, ManagementSettings::from_source(source))
    }

    /// Emit management events on `bus`.
    #[must_use]
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// The naming settings in effect.
    #[must_use]
    pub fn settings(&self) -> &ManagementSettings {
        &self.settings
    }

    /// The directory endpoint this coordinator publishes.
    #[must_use]
    pub fn directory(&self) -> &Arc<PoolDirectory> {
        &self.directory
    }

    /// Name of the directory endpoint.
    pub fn directory_name(&self) -> Result<ManagementName, RegistryError> {
        ManagementName::directory(self.settings.registry_name.as_deref())
    }

    /// Name of the endpoint for `resource`.
    pub fn resource_name(
        &self,
        resource: &dyn PooledResource,
    ) -> Result<ManagementName, RegistryError> {
        ManagementName::resource(
            resource.identity_token(),
            resource.assigned_name(),
            self.settings.exclude_identity_token,
        )
    }

    /// Register `object` under `name`, first removing whatever holds the
    /// name. `collision` explains a pre-existing registration in the log.
    fn replace(
        &self,
        name: &ManagementName,
        object: Arc<dyn ManagedObject>,
        collision: &str,
    ) -> Result<(), RegistryError> {
        let _guard = self.stripe(name).lock();

        if self.registry.is_registered(name) {
            tracing::warn!(
                name = %name,
                reason = collision,
                "management name already registered, replacing the existing registration"
            );
            self.emit(ManagementEvent::Replaced {
                name: name.to_string(),
                reason: collision.to_owned(),
            });
            self.registry.unregister(name)?;
        }

        self.registry.register(name, object)?;
        tracing::debug!(name = %name, "management endpoint registered");
        self.emit(ManagementEvent::Published {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Unregister `name` if present. Absence is not an error.
    fn remove(&self, name: &ManagementName) -> Result<(), RegistryError> {
        let _guard = self.stripe(name).lock();

        if self.registry.is_registered(name) {
            self.registry.unregister(name)?;
            tracing::debug!(name = %name, "management endpoint unregistered");
            self.emit(ManagementEvent::Retracted {
                name: name.to_string(),
            });
        } else {
            tracing::debug!(
                name = %name,
                "management endpoint not found in the registry, nothing to unregister"
            );
            self.emit(ManagementEvent::NotRegistered {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn report_failure(
        &self,
        operation: &'static str,
        subject: &str,
        identity_token: Option<&IdentityToken>,
        error: &RegistryError,
    ) {
        tracing::warn!(
            name = subject,
            identity_token = identity_token.map(IdentityToken::as_str),
            operation,
            error = %error,
            "management registry operation failed; the pool continues without management visibility"
        );
        self.emit(ManagementEvent::Failed {
            name: subject.to_owned(),
            identity_token: identity_token.map(ToString::to_string),
            operation,
            error: error.to_string(),
        });
    }

    fn stripe(&self, name: &ManagementName) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        &self.stripes[hasher.finish() as usize % LOCK_STRIPES]
    }

    fn emit(&self, event: ManagementEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }
}

impl ManagementCoordinator for ActiveManagementCoordinator {
    fn publish_directory(&self) {
        let name = match self.directory_name() {
            Ok(name) => name,
            Err(e) => return self.report_failure("publish", "directory", None, &e),
        };
        let object: Arc<dyn ManagedObject> = self.directory.clone();
        if let Err(e) = self.replace(&name, object, STALE_DIRECTORY) {
            self.report_failure("publish", name.as_str(), None, &e);
        }
    }

    fn retract_directory(&self) {
        let name = match self.directory_name() {
            Ok(name) => name,
            Err(e) => return self.report_failure("retract", "directory", None, &e),
        };
        if let Err(e) = self.remove(&name) {
            self.report_failure("retract", name.as_str(), None, &e);
        }
    }

    fn publish_resource(&self, resource: Arc<dyn PooledResource>) {
        let token = resource.identity_token().clone();
        let name = match self.resource_name(resource.as_ref()) {
            Ok(name) => name,
            Err(e) => return self.report_failure("publish", token.as_str(), Some(&token), &e),
        };
        let collision = if self.settings.exclude_identity_token {
            DUPLICATE_ASSIGNED_NAME
        } else {
            ALTERED_IDENTITY_TOKEN
        };
        let view: Arc<dyn ManagedObject> =
            Arc::new(PooledResourceView::new(Arc::clone(&resource)));
        match self.replace(&name, view, collision) {
            Ok(()) => self.directory.track(resource),
            Err(e) => self.report_failure("publish", name.as_str(), Some(&token), &e),
        }
    }

    fn retract_resource(&self, resource: &dyn PooledResource) {
        let token = resource.identity_token();
        self.directory.untrack(token);

        let name = match self.resource_name(resource) {
            Ok(name) => name,
            Err(e) => return self.report_failure("retract", token.as_str(), Some(token), &e),
        };
        if let Err(e) = self.remove(&name) {
            self.report_failure("retract", name.as_str(), Some(token), &e);
        }
    }
}

impl std::fmt::Debug for ActiveManagementCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveManagementCoordinator")
            .field("settings", &self.settings)
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}
