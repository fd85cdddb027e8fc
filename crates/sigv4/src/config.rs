//! Static configuration of a signing middleware.

use std::str::FromStr;

use awsauth_credential::{AuthType, CredentialsConfig, SecretValue};
use http::HeaderName;

use crate::error::{Result, SigningError};

/// Headers signed when present; everything else is held back while signing.
pub const DEFAULT_SIGNED_HEADERS: [&str; 7] = [
    "host",
    "accept",
    "accept-encoding",
    "content-encoding",
    "content-length",
    "content-type",
    "uber-trace-id",
];

/// Signing target and credentials of one datasource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigV4Config {
    /// Auth type token. Unlike datasource settings, unknown tokens are
    /// rejected.
    pub auth_type: String,
    pub profile: String,
    /// Service name in the credential scope, e.g. `aps` or `es`.
    pub service: String,
    pub access_key: String,
    pub secret_key: SecretValue,
    pub session_token: SecretValue,
    pub assume_role_arn: String,
    pub external_id: String,
    pub region: String,
    pub endpoint: String,
}

impl SigV4Config {
    /// Checks the configuration and converts it into a resolver request.
    pub fn credentials_config(&self) -> Result<CredentialsConfig> {
        let auth_type = AuthType::from_str(&self.auth_type)
            .map_err(|err| SigningError::InvalidConfig(err.to_string()))?;
        if self.service.trim().is_empty() {
            return Err(SigningError::InvalidConfig("service must not be empty".into()));
        }
        if self.region.trim().is_empty() {
            return Err(SigningError::InvalidConfig("region must not be empty".into()));
        }
        Ok(CredentialsConfig {
            auth_type,
            profile: self.profile.clone(),
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            session_token: self.session_token.clone(),
            assume_role_arn: self.assume_role_arn.clone(),
            external_id: self.external_id.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            ..CredentialsConfig::default()
        })
    }
}

/// Parses header names, rejecting invalid ones.
pub fn header_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Vec<HeaderName>> {
    names
        .into_iter()
        .map(|name| {
            HeaderName::from_str(name).map_err(|_| {
                SigningError::InvalidConfig(format!("invalid header name {name:?}"))
            })
        })
        .collect()
}
