//! Error types for the pool support subsystem
use thiserror::Error;

/// Result type for pool support operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause carried by errors that wrap a foreign failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for identity, credential, override and configuration operations.
///
/// Management registry failures are deliberately absent: the coordinator
/// swallows them (see [`RegistryError`](crate::management::RegistryError)).
#[derive(Error, Debug)]
pub enum Error {
    /// Reading credentials from a holder object failed
    #[error("Failed to discover default credentials: {source}")]
    CredentialDiscovery {
        /// The accessor failure
        #[source]
        source: BoxError,
    },

    /// An override map could not be serialized
    #[error("Failed to encode override map: {reason}")]
    Encoding {
        /// Why the map could not be represented
        reason: String,
    },

    /// The override envelope is malformed (header, brackets or hex payload)
    #[error("Malformed override envelope: {reason}")]
    Decoding {
        /// What is wrong with the envelope
        reason: String,
    },

    /// The envelope payload is not a valid serialized map
    #[error("Invalid serialized override map: {reason}")]
    Deserialization {
        /// What is wrong with the payload
        reason: String,
    },

    /// A configuration value could not be interpreted
    #[error("Configuration error for '{key}': {message}")]
    Configuration {
        /// The configuration key
        key: String,
        /// The error message
        message: String,
    },
}

impl Error {
    /// Wrap an accessor failure raised during credential discovery
    pub fn credential_discovery(source: impl Into<BoxError>) -> Self {
        Self::CredentialDiscovery {
            source: source.into(),
        }
    }

    /// Create an encoding error
    pub fn encoding<S: Into<String>>(reason: S) -> Self {
        Self::Encoding {
            reason: reason.into(),
        }
    }

    /// Create a decoding error
    pub fn decoding<S: Into<String>>(reason: S) -> Self {
        Self::Decoding {
            reason: reason.into(),
        }
    }

    /// Create a deserialization error
    pub fn deserialization<S: Into<String>>(reason: S) -> Self {
        Self::Deserialization {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<K: Into<String>, S: Into<String>>(key: K, message: S) -> Self {
        Self::Configuration {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Check if this error came from the override codec
    #[must_use]
    pub fn is_codec_error(&self) -> bool {
        matches!(
            self,
            Self::Encoding { .. } | Self::Decoding { .. } | Self::Deserialization { .. }
        )
    }
}
