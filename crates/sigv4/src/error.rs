//! Signing middleware errors.

use awsauth_credential::error::{AuthError, BoxError, DownstreamError};

pub type Result<T, E = SigningError> = std::result::Result<T, E>;

/// Failure of one signed round trip.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// The middleware's static configuration is unusable. Every round trip
    /// fails with this until the configuration is fixed.
    #[error("invalid SigV4 configuration: {0}")]
    InvalidConfig(String),

    /// Credential resolution failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The request cannot be signed as given.
    #[error("cannot sign request: {0}")]
    InvalidRequest(String),

    /// The wrapped transport failed.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
}

impl SigningError {
    /// Whether the caller has to change configuration to recover.
    pub fn is_config(&self) -> bool {
        match self {
            Self::InvalidConfig(_) | Self::InvalidRequest(_) => true,
            Self::Auth(err) => err.is_policy(),
            Self::Transport(_) => false,
        }
    }
}

impl From<DownstreamError> for SigningError {
    fn from(err: DownstreamError) -> Self {
        Self::Auth(AuthError::Downstream(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use awsauth_credential::PolicyError;

    #[test]
    fn invalid_config_message() {
        let err = SigningError::InvalidConfig("invalid auth type: bogus".into());
        assert_eq!(
            err.to_string(),
            "invalid SigV4 configuration: invalid auth type: bogus"
        );
        assert!(err.is_config());
    }

    #[test]
    fn policy_errors_count_as_config() {
        let err = SigningError::from(AuthError::from(PolicyError::AssumeRoleDisabled));
        assert!(err.is_config());
        let err = SigningError::from(DownstreamError::new("assume role", "throttled"));
        assert!(!err.is_config());
    }
}
