//! Datasource instance settings as stored by the host.
//!
//! Plain fields arrive as a JSON document; keys, tokens and the proxy
//! password arrive separately in the decrypted secure map.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::auth_type::AuthType;
use crate::config::{CredentialsConfig, DEFAULT_REGION_SENTINEL};
use crate::error::ConfigError;
use crate::proxy::{ProxyKind, ProxySettings};
use crate::secret::SecretValue;

/// Secure map key holding the access key.
pub const ACCESS_KEY: &str = "accessKey";
/// Secure map key holding the secret key.
pub const SECRET_KEY: &str = "secretKey";
/// Secure map key holding the session token.
pub const SESSION_TOKEN: &str = "sessionToken";
/// Secure map key holding the proxy password.
pub const PROXY_PASSWORD: &str = "proxyPassword";

/// AWS connection settings of one datasource instance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasourceSettings {
    pub profile: String,
    pub region: String,
    pub auth_type: AuthType,
    #[serde(rename = "assumeRoleARN")]
    pub assume_role_arn: String,
    pub external_id: String,
    pub endpoint: String,
    /// Deprecated, use `region`.
    pub default_region: String,
    pub credentials_path: Option<PathBuf>,
    pub proxy_type: ProxyKind,
    pub proxy_url: String,
    pub proxy_username: String,

    #[serde(skip)]
    pub access_key: String,
    #[serde(skip)]
    pub secret_key: SecretValue,
    #[serde(skip)]
    pub session_token: SecretValue,
    #[serde(skip)]
    pub proxy_password: SecretValue,
}

impl DatasourceSettings {
    /// Loads settings from the instance JSON and the decrypted secure map.
    ///
    /// `database` is the legacy location of the profile name and is only
    /// consulted when the JSON carries no profile.
    pub fn load(
        json: &[u8],
        secure: &HashMap<String, String>,
        database: &str,
    ) -> Result<Self, ConfigError> {
        let mut settings: Self = if json.len() > 1 {
            serde_json::from_slice(json)?
        } else {
            Self::default()
        };

        if settings.region.is_empty() || settings.region == DEFAULT_REGION_SENTINEL {
            settings.region = settings.default_region.clone();
        }
        if settings.profile.is_empty() {
            settings.profile = database.to_owned();
        }

        let secret = |key: &str| secure.get(key).cloned().unwrap_or_default();
        settings.access_key = secret(ACCESS_KEY);
        settings.secret_key = SecretValue::new(secret(SECRET_KEY));
        settings.session_token = SecretValue::new(secret(SESSION_TOKEN));
        settings.proxy_password = SecretValue::new(secret(PROXY_PASSWORD));

        tracing::debug!(
            auth_type = %settings.auth_type,
            region = %settings.region,
            has_access_key = !settings.access_key.is_empty(),
            "loaded datasource settings"
        );
        Ok(settings)
    }

    /// Converts into a resolver request.
    pub fn to_credentials_config(&self) -> CredentialsConfig {
        CredentialsConfig {
            auth_type: self.auth_type,
            profile: self.profile.clone(),
            credentials_path: self.credentials_path.clone(),
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            session_token: self.session_token.clone(),
            assume_role_arn: self.assume_role_arn.clone(),
            external_id: self.external_id.clone(),
            region: self.region.clone(),
            default_region: self.default_region.clone(),
            endpoint: self.endpoint.clone(),
            proxy: ProxySettings {
                kind: self.proxy_type,
                url: self.proxy_url.clone(),
                username: self.proxy_username.clone(),
                password: self.proxy_password.clone(),
            },
            user_agent: None,
        }
    }
}
