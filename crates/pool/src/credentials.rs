//! Default credential discovery.
//!
//! Callers may hand the pool an opaque holder object instead of an explicit
//! user and password. The holder exposes up to four string properties:
//! `user`, `password`, `overrideDefaultUser` and `overrideDefaultPassword`.
//! Types the library controls implement [`CredentialHolder`] directly;
//! third-party types are described with an [`AccessorTable`] of named
//! accessor functions.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{BoxError, Error, Result};

/// Failure raised by a property accessor.
pub type AccessorError = BoxError;

/// Outcome of reading one string property.
pub type PropertyRead = std::result::Result<Option<String>, AccessorError>;

/// Property names recognized by [`discover`]. Matching is case-sensitive.
pub const USER: &str = "user";
/// See [`USER`].
pub const PASSWORD: &str = "password";
/// See [`USER`].
pub const OVERRIDE_DEFAULT_USER: &str = "overrideDefaultUser";
/// See [`USER`].
pub const OVERRIDE_DEFAULT_PASSWORD: &str = "overrideDefaultPassword";

/// "No credentials found."
pub const NULL_AUTH: DbAuth = DbAuth {
    user: None,
    password: None,
};

// ---------------------------------------------------------------------------
// SecureString
// ---------------------------------------------------------------------------

/// A string that redacts its contents in Debug and Display.
#[derive(Clone, PartialEq, Eq)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    /// Create a new secure string.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Access the underlying value.
    pub fn expose(&self) -> &str {
        &self.inner
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString(***)")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

// ---------------------------------------------------------------------------
// DbAuth
// ---------------------------------------------------------------------------

/// Immutable user/password pair; either half may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbAuth {
    user: Option<String>,
    password: Option<SecureString>,
}

impl DbAuth {
    /// Build a credential pair.
    pub fn new(user: Option<impl Into<String>>, password: Option<impl Into<String>>) -> Self {
        Self {
            user: user.map(Into::into),
            password: password.map(SecureString::new),
        }
    }

    /// The user name, if any.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// The password, if any.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(SecureString::expose)
    }

    /// Whether this is the "no credentials" value.
    #[must_use]
    pub fn is_null(&self) -> bool {
        *self == NULL_AUTH
    }
}

// ---------------------------------------------------------------------------
// CredentialHolder
// ---------------------------------------------------------------------------

/// Capability of an object that can carry default database credentials.
///
/// Each accessor returns `Ok(None)` when the property is not exposed (or is
/// null). An `Err` aborts discovery for the whole object.
pub trait CredentialHolder {
    /// The plain `user` property.
    fn user(&self) -> PropertyRead {
        Ok(None)
    }

    /// The plain `password` property.
    fn password(&self) -> PropertyRead {
        Ok(None)
    }

    /// The `overrideDefaultUser` property.
    fn override_default_user(&self) -> PropertyRead {
        Ok(None)
    }

    /// The `overrideDefaultPassword` property.
    fn override_default_password(&self) -> PropertyRead {
        Ok(None)
    }
}

impl CredentialHolder for HashMap<String, String> {
    fn user(&self) -> PropertyRead {
        Ok(self.get(USER).cloned())
    }

    fn password(&self) -> PropertyRead {
        Ok(self.get(PASSWORD).cloned())
    }

    fn override_default_user(&self) -> PropertyRead {
        Ok(self.get(OVERRIDE_DEFAULT_USER).cloned())
    }

    fn override_default_password(&self) -> PropertyRead {
        Ok(self.get(OVERRIDE_DEFAULT_PASSWORD).cloned())
    }
}

impl CredentialHolder for BTreeMap<String, String> {
    fn user(&self) -> PropertyRead {
        Ok(self.get(USER).cloned())
    }

    fn password(&self) -> PropertyRead {
        Ok(self.get(PASSWORD).cloned())
    }

    fn override_default_user(&self) -> PropertyRead {
        Ok(self.get(OVERRIDE_DEFAULT_USER).cloned())
    }

    fn override_default_password(&self) -> PropertyRead {
        Ok(self.get(OVERRIDE_DEFAULT_PASSWORD).cloned())
    }
}

// ---------------------------------------------------------------------------
// AccessorTable
// ---------------------------------------------------------------------------

type Accessor<T> = Box<dyn Fn(&T) -> PropertyRead + Send + Sync>;

/// Named string-property accessors registered for a foreign type.
///
/// Accessors under names other than the four recognized ones may be
/// registered; discovery simply never reads them.
pub struct AccessorTable<T> {
    accessors: HashMap<String, Accessor<T>>,
}

impl<T> AccessorTable<T> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            accessors: HashMap::new(),
        }
    }

    /// Register an infallible accessor for property `name`.
    pub fn readable<F>(self, name: impl Into<String>, read: F) -> Self
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.fallible(name, move |target| Ok(read(target)))
    }

    /// Register an accessor that may fail.
    pub fn fallible<F>(mut self, name: impl Into<String>, read: F) -> Self
    where
        F: Fn(&T) -> PropertyRead + Send + Sync + 'static,
    {
        self.accessors.insert(name.into(), Box::new(read));
        self
    }

    /// Names of all registered properties.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }

    /// Pair the table with a target so it can be used as a holder.
    pub fn bind<'a>(&'a self, target: &'a T) -> BoundAccessors<'a, T> {
        BoundAccessors {
            table: self,
            target,
        }
    }

    fn read(&self, target: &T, name: &str) -> PropertyRead {
        match self.accessors.get(name) {
            Some(accessor) => accessor(target),
            None => Ok(None),
        }
    }
}

impl<T> Default for AccessorTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AccessorTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorTable")
            .field("properties", &self.accessors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// An [`AccessorTable`] bound to one target object.
pub struct BoundAccessors<'a, T> {
    table: &'a AccessorTable<T>,
    target: &'a T,
}

impl<T> CredentialHolder for BoundAccessors<'_, T> {
    fn user(&self) -> PropertyRead {
        self.table.read(self.target, USER)
    }

    fn password(&self) -> PropertyRead {
        self.table.read(self.target, PASSWORD)
    }

    fn override_default_user(&self) -> PropertyRead {
        self.table.read(self.target, OVERRIDE_DEFAULT_USER)
    }

    fn override_default_password(&self) -> PropertyRead {
        self.table.read(self.target, OVERRIDE_DEFAULT_PASSWORD)
    }
}

// ---------------------------------------------------------------------------
// discover
// ---------------------------------------------------------------------------

/// Recover default credentials from a holder.
///
/// `overrideDefaultUser` wins whenever it is present (even when empty),
/// paired with `overrideDefaultPassword`; otherwise `user` is paired with
/// `password`; otherwise the result is [`NULL_AUTH`].
///
/// # Errors
///
/// [`Error::CredentialDiscovery`] when any accessor fails. Nothing read
/// before the failure is returned.
pub fn discover(holder: Option<&dyn CredentialHolder>) -> Result<DbAuth> {
    let Some(holder) = holder else {
        return Ok(NULL_AUTH);
    };

    let read_all = || -> std::result::Result<_, AccessorError> {
        Ok((
            holder.user()?,
            holder.password()?,
            holder.override_default_user()?,
            holder.override_default_password()?,
        ))
    };

    let (user, password, override_user, override_password) = read_all().map_err(|e| {
        tracing::debug!(
            error = %e,
            "failed to extract default authentication info from a credential holder"
        );
        Error::credential_discovery(e)
    })?;

    Ok(match (override_user, user) {
        (Some(override_user), _) => DbAuth::new(Some(override_user), override_password),
        (None, Some(user)) => DbAuth::new(Some(user), password),
        (None, None) => NULL_AUTH,
    })
}
