//! [`CredentialSource`] backed by `aws-config` and `aws-sdk-sts`.
//!
//! Every provider handed out is wrapped in [`LazyCachingProvider`], so the
//! SDK is contacted again only when the previous credentials near expiry.

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_config::ecs::EcsCredentialsProvider;
use aws_config::imds::credentials::ImdsCredentialsProvider;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::{BehaviorVersion, ConfigLoader, Region};
use aws_credential_types::provider::{
    self as sdk_provider, ProvideCredentials as _, SharedCredentialsProvider as SdkSharedProvider,
    future,
};
use chrono::{DateTime, Utc};

use crate::credentials::{
    Credentials, LazyCachingProvider, ProvideCredentials, SharedCredentialsProvider,
};
use crate::error::DownstreamError;
use crate::proxy::ProxyRoute;
use crate::secret::SecretValue;
use crate::session::{Session, SessionParams};
use crate::source::{AssumeRoleRequest, CredentialSource};

const ECS_RELATIVE_URI: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";
const ECS_FULL_URI: &str = "AWS_CONTAINER_CREDENTIALS_FULL_URI";

/// Production credential source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SdkCredentialSource;

impl SdkCredentialSource {
    pub fn new() -> Self {
        Self
    }

    /// Base loader for a session described by `params`.
    ///
    /// The SDK has no notion of a FIPS endpoint override, so a `-fips.`
    /// host is dropped in favor of the SDK's own FIPS resolution.
    fn loader(params: &SessionParams) -> ConfigLoader {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .use_fips(params.use_fips_endpoint);
        if let Some(region) = &params.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &params.endpoint {
            if params.use_fips_endpoint && endpoint.contains("-fips.") {
                tracing::debug!(endpoint = %endpoint, "FIPS endpoint resolved by the SDK");
            } else {
                loader = loader.endpoint_url(with_scheme(endpoint));
            }
        }
        if let Some(app_name) = params.user_agent.as_deref().and_then(app_name) {
            loader = loader.app_name(app_name);
        }
        if matches!(params.proxy, ProxyRoute::Url(_)) {
            tracing::warn!(
                "explicit proxy URLs are not applied to the SDK HTTP client, \
                 requests go through the environment's proxy settings"
            );
        }
        loader
    }

    fn cached(inner: SharedCredentialsProvider) -> SharedCredentialsProvider {
        LazyCachingProvider::new(inner).shared()
    }
}

#[async_trait]
impl CredentialSource for SdkCredentialSource {
    async fn default_chain(
        &self,
        params: &SessionParams,
    ) -> Result<SharedCredentialsProvider, DownstreamError> {
        let mut builder = DefaultCredentialsChain::builder();
        builder.set_region(params.region.clone().map(Region::new));
        let chain = builder.build().await;
        Ok(Self::cached(FromSdk::shared(chain, "default chain", "default_chain")))
    }

    async fn shared_file(
        &self,
        path: Option<&Path>,
        profile: &str,
    ) -> Result<SharedCredentialsProvider, DownstreamError> {
        let mut builder = ProfileFileCredentialsProvider::builder();
        if !profile.is_empty() {
            builder = builder.profile_name(profile);
        }
        if let Some(path) = path {
            builder = builder.profile_files(
                ProfileFiles::builder()
                    .with_file(ProfileFileKind::Credentials, path)
                    .build(),
            );
        }
        Ok(Self::cached(FromSdk::shared(builder.build(), "shared file", "shared_file")))
    }

    async fn remote(
        &self,
        _params: &SessionParams,
    ) -> Result<SharedCredentialsProvider, DownstreamError> {
        let container = env::var_os(ECS_RELATIVE_URI).is_some() || env::var_os(ECS_FULL_URI).is_some();
        let provider = if container {
            tracing::debug!("using container credentials endpoint");
            FromSdk::shared(EcsCredentialsProvider::builder().build(), "container credentials", "ecs")
        } else {
            tracing::debug!("using instance metadata credentials");
            FromSdk::shared(ImdsCredentialsProvider::builder().build(), "instance metadata", "imds")
        };
        Ok(Self::cached(provider))
    }

    async fn assume_role(
        &self,
        base: &Session,
        request: &AssumeRoleRequest,
    ) -> Result<SharedCredentialsProvider, DownstreamError> {
        let config = Self::loader(base.params())
            .credentials_provider(SdkSharedProvider::new(ToSdk(base.credentials().clone())))
            .load()
            .await;
        let provider = Self::cached(
            StsAssumeRole {
                client: aws_sdk_sts::Client::new(&config),
                request: request.clone(),
            }
            .into(),
        );
        // Fail the resolution, not the first signed request, on STS errors.
        provider.provide_credentials().await?;
        Ok(provider)
    }
}

/// Re-runs AssumeRole each time the cached credentials expire.
#[derive(Debug)]
struct StsAssumeRole {
    client: aws_sdk_sts::Client,
    request: AssumeRoleRequest,
}

impl From<StsAssumeRole> for SharedCredentialsProvider {
    fn from(provider: StsAssumeRole) -> Self {
        Arc::new(provider)
    }
}

#[async_trait]
impl ProvideCredentials for StsAssumeRole {
    async fn provide_credentials(&self) -> Result<Credentials, DownstreamError> {
        let duration = i32::try_from(self.request.duration.as_secs()).unwrap_or(i32::MAX);
        let output = self
            .client
            .assume_role()
            .role_arn(&self.request.role_arn)
            .role_session_name(&self.request.session_name)
            .set_external_id(self.request.external_id.clone())
            .duration_seconds(duration)
            .send()
            .await
            .map_err(|err| DownstreamError::new("assume role", err))?;

        let creds = output
            .credentials()
            .ok_or_else(|| DownstreamError::new("assume role", "STS returned no credentials"))?;
        let expires_at = DateTime::<Utc>::from_timestamp(creds.expiration().secs(), 0);
        Ok(Credentials::new(
            creds.access_key_id(),
            SecretValue::new(creds.secret_access_key()),
            Some(SecretValue::new(creds.session_token())),
            expires_at,
            "assume_role",
        ))
    }
}

/// Exposes an SDK provider through [`ProvideCredentials`].
#[derive(Debug)]
struct FromSdk {
    inner: SdkSharedProvider,
    operation: &'static str,
    provider_name: &'static str,
}

impl FromSdk {
    fn shared(
        inner: impl sdk_provider::ProvideCredentials + 'static,
        operation: &'static str,
        provider_name: &'static str,
    ) -> SharedCredentialsProvider {
        Arc::new(Self {
            inner: SdkSharedProvider::new(inner),
            operation,
            provider_name,
        })
    }
}

#[async_trait]
impl ProvideCredentials for FromSdk {
    async fn provide_credentials(&self) -> Result<Credentials, DownstreamError> {
        let creds = self
            .inner
            .provide_credentials()
            .await
            .map_err(|err| DownstreamError::new(self.operation, err))?;
        Ok(Credentials::new(
            creds.access_key_id(),
            SecretValue::new(creds.secret_access_key()),
            creds.session_token().map(SecretValue::new),
            creds.expiry().map(DateTime::<Utc>::from),
            self.provider_name,
        ))
    }
}

/// Hands our credentials to SDK clients, e.g. the STS client of an
/// intermediate session.
#[derive(Debug)]
struct ToSdk(SharedCredentialsProvider);

impl sdk_provider::ProvideCredentials for ToSdk {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(async move {
            let creds = self
                .0
                .provide_credentials()
                .await
                .map_err(sdk_provider::error::CredentialsError::provider_error)?;
            Ok(aws_credential_types::Credentials::new(
                creds.access_key_id(),
                creds.secret_access_key(),
                creds.session_token().map(str::to_owned),
                creds.expires_at().map(SystemTime::from),
                creds.provider_name(),
            ))
        })
    }
}

fn with_scheme(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_owned()
    } else {
        format!("https://{endpoint}")
    }
}

/// SDK app names only allow a restricted character set.
fn app_name(user_agent: &str) -> Option<aws_config::AppName> {
    let sanitized: String = user_agent
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c) {
                c
            } else {
                '-'
            }
        })
        .collect();
    aws_config::AppName::new(sanitized).ok()
}
