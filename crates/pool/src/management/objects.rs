//! Endpoints published into the management registry.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::identity::IdentityToken;
use crate::management::name::{DIRECTORY_TYPE, RESOURCE_TYPE};
use crate::management::registry::ManagedObject;

/// What the pooling engine exposes about a live pooled resource.
pub trait PooledResource: Send + Sync {
    /// Identity allocated when the resource was created.
    fn identity_token(&self) -> &IdentityToken;

    /// Human-assigned name, if the user gave one.
    fn assigned_name(&self) -> Option<&str>;
}

impl fmt::Debug for dyn PooledResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource")
            .field("identity_token", self.identity_token())
            .field("assigned_name", &self.assigned_name())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PoolDirectory
// ---------------------------------------------------------------------------

/// The process-wide "all pools" endpoint.
///
/// Tracks every resource its coordinator has published and not yet
/// retracted, keyed by identity token. A resource whose endpoint could not
/// be registered is not listed.
#[derive(Default)]
pub struct PoolDirectory {
    resources: DashMap<IdentityToken, Arc<dyn PooledResource>>,
}

impl PoolDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `resource`.
    pub fn track(&self, resource: Arc<dyn PooledResource>) {
        self.resources
            .insert(resource.identity_token().clone(), resource);
    }

    /// Stop tracking the resource with `token`.
    pub fn untrack(&self, token: &IdentityToken) -> Option<Arc<dyn PooledResource>> {
        self.resources.remove(token).map(|(_, resource)| resource)
    }

    /// Look up a tracked resource.
    #[must_use]
    pub fn find(&self, token: &IdentityToken) -> Option<Arc<dyn PooledResource>> {
        self.resources.get(token).map(|e| Arc::clone(e.value()))
    }

    /// Identity tokens of all tracked resources, sorted.
    #[must_use]
    pub fn identity_tokens(&self) -> Vec<IdentityToken> {
        let mut tokens: Vec<_> = self.resources.iter().map(|e| e.key().clone()).collect();
        tokens.sort();
        tokens
    }

    /// Number of tracked resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether no resources are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ManagedObject for PoolDirectory {
    fn kind(&self) -> &str {
        DIRECTORY_TYPE
    }

    fn attributes(&self) -> Vec<(String, String)> {
        let tokens: Vec<String> = self
            .identity_tokens()
            .iter()
            .map(ToString::to_string)
            .collect();
        vec![
            ("numPooledDataSources".to_owned(), tokens.len().to_string()),
            ("identityTokens".to_owned(), tokens.join(",")),
        ]
    }
}

impl fmt::Debug for PoolDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolDirectory")
            .field("identity_tokens", &self.identity_tokens())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PooledResourceView
// ---------------------------------------------------------------------------

/// Per-resource endpoint.
pub struct PooledResourceView {
    resource: Arc<dyn PooledResource>,
}

impl PooledResourceView {
    /// Wrap a live resource.
    #[must_use]
    pub fn new(resource: Arc<dyn PooledResource>) -> Self {
        Self { resource }
    }

    /// The resource behind this endpoint.
    #[must_use]
    pub fn resource(&self) -> &Arc<dyn PooledResource> {
        &self.resource
    }
}

impl ManagedObject for PooledResourceView {
    fn kind(&self) -> &str {
        RESOURCE_TYPE
    }

    fn attributes(&self) -> Vec<(String, String)> {
        let mut attributes = vec![(
            "identityToken".to_owned(),
            self.resource.identity_token().to_string(),
        )];
        if let Some(name) = self.resource.assigned_name() {
            attributes.push(("dataSourceName".to_owned(), name.to_owned()));
        }
        attributes
    }
}
