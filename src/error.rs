//! Error types for PKI topology construction
//!
//! Errors carry the target or field they concern so a failed build can be
//! traced back to the configuration value or rule that caused it.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for topology builds
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An external lookup (well-known service IP, storage path) failed
    #[error("resolution error for {target}: {message}")]
    Resolution {
        /// What was being resolved (e.g., "serviceClusterIPRange", "secretStore")
        target: String,
        /// Description of what failed
        message: String,
    },

    /// The rule set produced an inconsistent task set
    ///
    /// This is a defect in the rules, not in the environment.
    #[error("topology invariant violated: {message}")]
    TopologyInvariant {
        /// Description of the violated invariant
        message: String,
    },

    /// Invalid cluster configuration
    #[error("validation error for {field}: {message}")]
    Validation {
        /// The invalid field path (e.g., "networking")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Reading a configuration file failed
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a resolution error for the given lookup target
    pub fn resolution(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Resolution {
            target: target.into(),
            message: msg.into(),
        }
    }

    /// Create a topology invariant error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::TopologyInvariant {
            message: msg.into(),
        }
    }

    /// Create a validation error for a configuration field
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an IO error for the given path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if a caller could reasonably retry the build
    ///
    /// Only environment failures qualify. Invariant, validation and
    /// serialization errors need a code or configuration change.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Resolution { .. } => true,
            Error::Io { .. } => true,
            Error::TopologyInvariant { .. } => false,
            Error::Validation { .. } => false,
            Error::Serialization(_) => false,
        }
    }

    /// Check if this error indicates a bug in the topology rules
    pub fn is_rule_defect(&self) -> bool {
        matches!(self, Error::TopologyInvariant { .. })
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
