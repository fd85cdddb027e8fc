//! Per-datasource outbound proxy settings.

use std::fmt;

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;
use crate::secret::SecretValue;

/// How AWS traffic for a datasource leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// Direct connection.
    #[default]
    None,
    /// `HTTP(S)_PROXY` / `NO_PROXY` from the environment.
    Env,
    /// Explicit proxy URL.
    Url,
}

impl ProxyKind {
    /// Stable token used in fingerprints.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Env => "env",
            Self::Url => "url",
        }
    }
}

/// Proxy configuration attached to a datasource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    pub kind: ProxyKind,
    pub url: String,
    pub username: String,
    pub password: SecretValue,
}

impl ProxySettings {
    /// Parses the proxy URL, embedding user info when both username and
    /// password are set.
    pub fn proxy_url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.url)
            .map_err(|err| ConfigError::invalid("proxyUrl", err.to_string()))?;
        if !self.username.is_empty() && !self.password.is_empty() {
            url.set_username(&self.username)
                .map_err(|()| ConfigError::invalid("proxyUsername", "URL cannot carry credentials"))?;
            url.set_password(Some(self.password.expose()))
                .map_err(|()| ConfigError::invalid("proxyPassword", "URL cannot carry credentials"))?;
        }
        Ok(url)
    }

    /// Resolves the route AWS clients should use.
    pub fn route(&self) -> Result<ProxyRoute, ConfigError> {
        match self.kind {
            ProxyKind::None => Ok(ProxyRoute::Direct),
            ProxyKind::Env => Ok(ProxyRoute::Environment),
            ProxyKind::Url => self.proxy_url().map(ProxyRoute::Url),
        }
    }
}

/// Resolved proxy route carried by a session.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum ProxyRoute {
    #[default]
    Direct,
    Environment,
    Url(Url),
}

impl fmt::Debug for ProxyRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("Direct"),
            Self::Environment => f.write_str("Environment"),
            Self::Url(url) => {
                let mut shown = url.clone();
                if shown.password().is_some() {
                    let _ = shown.set_password(Some("REDACTED"));
                }
                f.debug_tuple("Url").field(&shown.as_str()).finish()
            }
        }
    }
}
