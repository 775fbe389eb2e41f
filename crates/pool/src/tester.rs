//! Default connection tester resolution.
//!
//! Pools name their default tester in configuration. [`TesterResolver`]
//! turns that name into a shared tester instance and caches it, rebuilding
//! only when the configured name changes. The cached tester and the name it
//! was built under live behind one lock so they are always read and
//! replaced together.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::{CONNECTION_TESTER_KEY, ConfigSource};
use crate::error::{BoxError, Error};

/// Name of the built-in tester.
pub const DEFAULT_TESTER_NAME: &str = "default";

/// Verdict of a connection test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The connection is usable.
    Okay,
    /// This connection is broken and should be discarded.
    Invalid,
    /// The database itself looks broken; the whole pool should be reset.
    DatabaseInvalid,
}

/// A connection as far as testing is concerned.
pub trait TestableConnection {
    /// Ask the driver whether the connection is still alive.
    fn is_valid(&mut self, timeout: Duration) -> Result<bool, BoxError>;
}

/// Strategy for checking pooled connections.
pub trait ConnectionTester: Send + Sync + fmt::Debug {
    /// Name the tester is registered under.
    fn name(&self) -> &str;

    /// Test one connection.
    fn test_connection(&self, connection: &mut dyn TestableConnection) -> ConnectionStatus;
}

/// Built-in tester relying on the driver's own validity check.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnectionTester {
    /// Passed to [`TestableConnection::is_valid`]; zero means no timeout
    pub timeout: Duration,
}

impl ConnectionTester for DefaultConnectionTester {
    fn name(&self) -> &str {
        DEFAULT_TESTER_NAME
    }

    fn test_connection(&self, connection: &mut dyn TestableConnection) -> ConnectionStatus {
        match connection.is_valid(self.timeout) {
            Ok(true) => ConnectionStatus::Okay,
            Ok(false) => ConnectionStatus::Invalid,
            Err(e) => {
                tracing::debug!(error = %e, "connection validity check failed");
                ConnectionStatus::Invalid
            }
        }
    }
}

/// Builds a tester instance.
pub type TesterFactory = Arc<dyn Fn() -> Arc<dyn ConnectionTester> + Send + Sync>;

struct CachedTester {
    name: String,
    tester: Arc<dyn ConnectionTester>,
}

/// Resolves configured tester names to shared tester instances.
///
/// Construct one per pool manager and pass it to whoever needs the default
/// tester.
pub struct TesterResolver {
    factories: RwLock<HashMap<String, TesterFactory>>,
    cached: RwLock<Option<CachedTester>>,
}

impl TesterResolver {
    /// Create a resolver knowing only the built-in tester.
    #[must_use]
    pub fn new() -> Self {
        let resolver = Self {
            factories: RwLock::new(HashMap::new()),
            cached: RwLock::new(None),
        };
        resolver.register(DEFAULT_TESTER_NAME, || {
            Arc::new(DefaultConnectionTester::default())
        });
        resolver
    }

    /// Make a tester available under `name`.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn ConnectionTester> + Send + Sync + 'static,
    {
        self.factories.write().insert(name.into(), Arc::new(factory));
    }

    /// Resolve the tester named by [`CONNECTION_TESTER_KEY`] in `source`,
    /// or the built-in one when the key is absent.
    pub fn resolve_from(&self, source: &dyn ConfigSource) -> Arc<dyn ConnectionTester> {
        let name = source
            .get(CONNECTION_TESTER_KEY)
            .unwrap_or_else(|| DEFAULT_TESTER_NAME.to_owned());
        self.resolve(&name)
    }

    /// Resolve `name` to a tester, reusing the cached one when it matches.
    ///
    /// Unknown names fall back to the built-in tester with a warning. The
    /// cache records the name of the tester actually built, so an unknown
    /// name is retried on every call.
    pub fn resolve(&self, name: &str) -> Arc<dyn ConnectionTester> {
        match self.try_resolve(name) {
            Ok(tester) => tester,
            Err(e) => {
                tracing::warn!(
                    tester = name,
                    fallback = DEFAULT_TESTER_NAME,
                    error = %e,
                    "could not load connection tester, using built-in default"
                );
                self.try_resolve(DEFAULT_TESTER_NAME)
                    .unwrap_or_else(|_| Arc::new(DefaultConnectionTester::default()))
            }
        }
    }

    /// Like [`resolve`](Self::resolve), but an unknown name is an error.
    ///
    /// Factories run with no lock held, so a factory may itself resolve
    /// testers through this resolver.
    pub fn try_resolve(&self, name: &str) -> crate::Result<Arc<dyn ConnectionTester>> {
        if let Some(hit) = cached_for(&self.cached.read(), name) {
            return Ok(hit);
        }

        let factory = self.factories.read().get(name).cloned().ok_or_else(|| {
            Error::configuration(
                CONNECTION_TESTER_KEY,
                format!("no connection tester registered as '{name}'"),
            )
        })?;
        let tester = factory();

        let mut cached = self.cached.write();
        if let Some(hit) = cached_for(&cached, name) {
            return Ok(hit);
        }
        *cached = Some(CachedTester {
            name: tester.name().to_owned(),
            tester: Arc::clone(&tester),
        });
        Ok(tester)
    }
}

fn cached_for(cached: &Option<CachedTester>, name: &str) -> Option<Arc<dyn ConnectionTester>> {
    cached
        .as_ref()
        .filter(|c| c.name == name)
        .map(|c| Arc::clone(&c.tester))
}

impl Default for TesterResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TesterResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TesterResolver")
            .field(
                "cached",
                &self.cached.read().as_ref().map(|c| c.name.clone()),
            )
            .finish()
    }
}
