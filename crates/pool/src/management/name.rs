//! Deterministic management names.
//!
//! Names follow the `domain:key=value[,key=value]*` shape used by host
//! management registries:
//!
//! - directory: `sluice:type=Registry[,name=<configured>]`
//! - resource: `sluice:type=PooledDataSource[,identityToken=<token>][,name=<assigned>]`

use std::fmt;

use crate::identity::IdentityToken;
use crate::management::registry::RegistryError;

/// Domain shared by every name this crate registers.
pub const NAMESPACE: &str = "sluice";

/// `type` of the process-wide directory endpoint.
pub const DIRECTORY_TYPE: &str = "Registry";

/// `type` of per-resource endpoints.
pub const RESOURCE_TYPE: &str = "PooledDataSource";

const RESERVED: &[char] = &[',', '=', ':', '*', '?', '"', '\n'];

/// A structured, validated registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagementName(String);

impl ManagementName {
    /// Name of the directory endpoint, optionally qualified by a configured
    /// name.
    pub fn directory(configured: Option<&str>) -> Result<Self, RegistryError> {
        let mut name = Self::typed(DIRECTORY_TYPE);
        if let Some(configured) = configured {
            name.push("name", configured)?;
        }
        Ok(name)
    }

    /// Name of a pooled resource's endpoint.
    ///
    /// With `exclude_identity_token` the token is left out, and stands in
    /// for the name component when the resource has no assigned name, so a
    /// name component is always present in that mode.
    pub fn resource(
        identity_token: &IdentityToken,
        assigned_name: Option<&str>,
        exclude_identity_token: bool,
    ) -> Result<Self, RegistryError> {
        let mut name = Self::typed(RESOURCE_TYPE);
        let assigned_name = match assigned_name {
            None if exclude_identity_token => Some(identity_token.as_str()),
            other => other,
        };
        if !exclude_identity_token {
            name.push("identityToken", identity_token.as_str())?;
        }
        if let Some(assigned_name) = assigned_name {
            name.push("name", assigned_name)?;
        }
        Ok(name)
    }

    /// The name as registered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value of the `key=value` property `key`, if present.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        let (_, properties) = self.0.split_once(':')?;
        properties
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    fn typed(kind: &str) -> Self {
        Self(format!("{NAMESPACE}:type={kind}"))
    }

    fn push(&mut self, key: &'static str, value: &str) -> Result<(), RegistryError> {
        if let Some(bad) = value.chars().find(|c| RESERVED.contains(c)) {
            return Err(RegistryError::MalformedName {
                name: self.0.clone(),
                reason: format!("'{key}' value {value:?} contains reserved character {bad:?}"),
            });
        }
        self.0.push(',');
        self.0.push_str(key);
        self.0.push('=');
        self.0.push_str(value);
        Ok(())
    }
}

impl AsRef<str> for ManagementName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ManagementName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
