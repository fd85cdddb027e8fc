//! Error taxonomy for credential resolution.
//!
//! Resolution can fail for three unrelated reasons and callers are expected
//! to treat them differently:
//!
//! - [`PolicyError`]: the request violates operator policy or is malformed.
//!   Reported before any network I/O and never worth retrying.
//! - [`DownstreamError`]: the AWS SDK, STS, or the network failed while
//!   building a session or fetching credentials.
//! - [`AuthError::Cancelled`]: the caller's cancellation token fired.

use std::error::Error as StdError;

/// Boxed error used for opaque downstream sources.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = AuthError> = std::result::Result<T, E>;

/// Top-level error returned by the resolver and the session cache.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// User configuration error.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// AWS or network failure.
    #[error(transparent)]
    Downstream(#[from] DownstreamError),

    /// The caller cancelled the resolution.
    #[error("credential resolution cancelled")]
    Cancelled,
}

impl AuthError {
    /// Whether the error is a configuration problem the caller must fix.
    pub fn is_policy(&self) -> bool {
        matches!(self, Self::Policy(_))
    }

    /// Whether the error came from AWS or the network.
    pub fn is_downstream(&self) -> bool {
        matches!(self, Self::Downstream(_))
    }

    /// Whether the caller cancelled the operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        Self::Policy(PolicyError::Config(err))
    }
}

/// Request rejected by operator policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The auth type is missing from the operator's allow-list.
    #[error("attempting to use an auth type that is not allowed: \"{auth_type}\"")]
    AuthTypeNotAllowed {
        /// Canonical token of the rejected auth type
        auth_type: String,
    },

    /// An assume-role ARN was supplied while assume role is disabled.
    #[error("attempting to use assume role (ARN) which is disabled")]
    AssumeRoleDisabled,

    /// The auth type token is not recognized.
    #[error("invalid auth type: {0}")]
    UnknownAuthType(String),

    /// A per-call setting is malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration parsing error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("invalid configuration: {field}: {reason}")]
    InvalidValue {
        /// Offending field or settings key
        field: String,
        /// Human readable reason
        reason: String,
    },

    /// Datasource JSON could not be decoded
    #[error("could not unmarshal datasource settings json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by the AWS SDK, STS, or the network.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed: {source}")]
pub struct DownstreamError {
    operation: &'static str,
    #[source]
    source: BoxError,
}

impl DownstreamError {
    /// Wraps an error raised while performing `operation`.
    pub fn new(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }

    /// Name of the operation that failed (`"assume role"`, `"load credentials"`, ...).
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}
