//! Resolved AWS client configuration.

use crate::credentials::SharedCredentialsProvider;
use crate::proxy::ProxyRoute;

/// Client-level settings shared by every session flavor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParams {
    pub region: Option<String>,
    /// Endpoint override. For sessions used to call STS this is the STS
    /// endpoint, otherwise the configured data-plane endpoint.
    pub endpoint: Option<String>,
    pub use_fips_endpoint: bool,
    /// Signal that STS must be called on its regional endpoint.
    pub sts_regional_endpoint: bool,
    pub proxy: ProxyRoute,
    pub user_agent: Option<String>,
}

/// A client configuration bound to a credential provider.
///
/// Sessions are immutable once built; the cache hands them out behind `Arc`.
#[derive(Debug, Clone)]
pub struct Session {
    params: SessionParams,
    credentials: SharedCredentialsProvider,
}

impl Session {
    pub fn new(params: SessionParams, credentials: SharedCredentialsProvider) -> Self {
        Self {
            params,
            credentials,
        }
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn region(&self) -> Option<&str> {
        self.params.region.as_deref()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.params.endpoint.as_deref()
    }

    pub fn use_fips_endpoint(&self) -> bool {
        self.params.use_fips_endpoint
    }

    pub fn sts_regional_endpoint(&self) -> bool {
        self.params.sts_regional_endpoint
    }

    pub fn proxy(&self) -> &ProxyRoute {
        &self.params.proxy
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.params.user_agent.as_deref()
    }

    /// The refreshable credential object.
    pub fn credentials(&self) -> &SharedCredentialsProvider {
        &self.credentials
    }
}

/// User agent attached to every session: `awsauth/<version> (<os>; <arch>)`
/// followed by the host plugin's product token, if any.
pub fn user_agent(product: Option<&str>) -> String {
    let base = format!(
        "awsauth/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    match product.map(str::trim).filter(|product| !product.is_empty()) {
        Some(product) => format!("{base} {product}"),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_appends_product() {
        let plain = user_agent(None);
        assert!(plain.starts_with("awsauth/"));
        assert!(plain.contains(std::env::consts::OS));
        assert_eq!(user_agent(Some("  ")), plain);
        assert_eq!(user_agent(Some("athena-plugin/2.1.0")), format!("{plain} athena-plugin/2.1.0"));
    }
}
