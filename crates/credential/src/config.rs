//! Per-call credential request.

use std::path::PathBuf;

use crate::auth_type::AuthType;
use crate::proxy::ProxySettings;
use crate::secret::SecretValue;

/// Region literal that means "not configured".
pub const DEFAULT_REGION_SENTINEL: &str = "default";

/// Everything the resolver needs to build one session.
///
/// Secrets are held in [`SecretValue`] so the derived `Debug` output is safe
/// to log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialsConfig {
    pub auth_type: AuthType,
    /// Shared credentials profile.
    pub profile: String,
    /// Shared credentials file; `None` uses the SDK default location.
    pub credentials_path: Option<PathBuf>,
    pub access_key: String,
    pub secret_key: SecretValue,
    pub session_token: SecretValue,
    pub assume_role_arn: String,
    /// Tenant supplied external ID. Ignored for the broker auth type.
    pub external_id: String,
    pub region: String,
    /// Deprecated fallback for `region`.
    pub default_region: String,
    /// Data-plane endpoint override.
    pub endpoint: String,
    pub proxy: ProxySettings,
    /// Extra user agent product appended by the host plugin.
    pub user_agent: Option<String>,
}

impl CredentialsConfig {
    /// Static key configuration.
    pub fn static_keys(access_key: impl Into<String>, secret_key: impl Into<SecretValue>) -> Self {
        Self {
            auth_type: AuthType::StaticKeys,
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            ..Self::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_assume_role(mut self, arn: impl Into<String>) -> Self {
        self.assume_role_arn = arn.into();
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = external_id.into();
        self
    }

    /// Whether an STS AssumeRole exchange follows the primary credentials.
    pub fn wants_assume_role(&self) -> bool {
        !self.assume_role_arn.is_empty()
    }

    /// The region to use, after treating `""` and `"default"` as unset.
    pub fn effective_region(&self) -> Option<&str> {
        let region = match self.region.as_str() {
            "" => self.default_region.as_str(),
            DEFAULT_REGION_SENTINEL => {
                tracing::warn!(
                    default_region = %self.default_region,
                    "region is set to \"default\", falling back to the deprecated default region"
                );
                self.default_region.as_str()
            }
            region => region,
        };
        match region {
            "" | DEFAULT_REGION_SENTINEL => None,
            region => Some(region),
        }
    }

    /// The endpoint override, if any.
    pub fn endpoint(&self) -> Option<&str> {
        let endpoint = self.endpoint.trim();
        (!endpoint.is_empty()).then_some(endpoint)
    }
}
