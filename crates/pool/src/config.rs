//! Process-wide configuration lookup.
//!
//! The subsystem never loads configuration files itself. It reads plain
//! string values through a [`ConfigSource`] supplied by the host.

use std::collections::HashMap;

/// Key naming the directory endpoint (optional `,name=` suffix).
pub const REGISTRY_NAME_KEY: &str = "sluice.management.RegistryName";

/// Key of the flag that drops the identity token from resource names.
pub const EXCLUDE_IDENTITY_TOKEN_KEY: &str = "sluice.management.ExcludeIdentityToken";

/// Key naming the default connection tester.
pub const CONNECTION_TESTER_KEY: &str = "sluice.pool.ConnectionTesterName";

/// Read-only string configuration.
pub trait ConfigSource: Send + Sync {
    /// Look up the raw value for `key`.
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// In-memory source, mostly for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: HashMap<String, String>,
}

impl MapSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Environment variable source.
///
/// `sluice.management.RegistryName` is looked up as
/// `SLUICE_MANAGEMENT_REGISTRYNAME`, behind an optional prefix.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    /// Prepended (with `_`) to every variable name
    pub prefix: Option<String>,
}

impl EnvSource {
    /// Create a source reading unprefixed variables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source reading `<PREFIX>_...` variables.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// The variable consulted for `key`.
    #[must_use]
    pub fn variable_name(&self, key: &str) -> String {
        let base: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        match &self.prefix {
            Some(prefix) => format!("{}_{base}", prefix.to_ascii_uppercase()),
            None => base,
        }
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.variable_name(key)).ok()
    }
}

// ---------------------------------------------------------------------------
// ManagementSettings
// ---------------------------------------------------------------------------

/// Naming settings for management registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct ManagementSettings {
    /// Appended as `,name=<value>` to the directory name.
    pub registry_name: Option<String>,
    /// Leave the identity token out of resource names.
    pub exclude_identity_token: bool,
}

impl ManagementSettings {
    /// Read the settings from `source`.
    ///
    /// The exclusion flag is on only for a (trimmed, case-insensitive)
    /// `true`; any other value, or none, leaves it off.
    pub fn from_source(source: &dyn ConfigSource) -> Self {
        let exclude_identity_token = source
            .get(EXCLUDE_IDENTITY_TOKEN_KEY)
            .is_some_and(|raw| parse_flag(&raw));

        if exclude_identity_token {
            tracing::info!(
                key = EXCLUDE_IDENTITY_TOKEN_KEY,
                "identity tokens excluded from management names; make sure every pooled resource has a unique name"
            );
        }

        Self {
            registry_name: source.get(REGISTRY_NAME_KEY),
            exclude_identity_token,
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}
