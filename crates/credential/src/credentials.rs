//! Credential snapshots and the providers that produce them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::DownstreamError;
use crate::secret::SecretValue;

/// A point-in-time AWS credential set.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: SecretValue,
    session_token: Option<SecretValue>,
    expires_at: Option<DateTime<Utc>>,
    provider_name: &'static str,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<SecretValue>,
        session_token: Option<SecretValue>,
        expires_at: Option<DateTime<Utc>>,
        provider_name: &'static str,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.filter(|token| !token.is_empty()),
            expires_at,
            provider_name,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        self.secret_access_key.expose()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_ref().map(SecretValue::expose)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Name of the provider that produced these credentials.
    pub fn provider_name(&self) -> &'static str {
        self.provider_name
    }

    /// Whether the credentials expire within `buffer` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        let buffer = chrono::Duration::from_std(buffer).unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(buffer)
            .is_none_or(|deadline| deadline >= expires_at)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("provider_name", &self.provider_name)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of AWS credentials, refreshed on demand.
#[async_trait]
pub trait ProvideCredentials: Send + Sync + fmt::Debug {
    /// Returns current credentials, contacting the backing service if needed.
    async fn provide_credentials(&self) -> Result<Credentials, DownstreamError>;
}

/// Shared handle to a credential provider.
pub type SharedCredentialsProvider = Arc<dyn ProvideCredentials>;

/// Provider that always returns the same credentials.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    credentials: Credentials,
}

impl StaticProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Builds a provider from raw key material.
    pub fn from_keys(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<SecretValue>,
        session_token: Option<SecretValue>,
    ) -> Self {
        Self::new(Credentials::new(
            access_key_id,
            secret_access_key,
            session_token,
            None,
            "static",
        ))
    }

    pub fn shared(self) -> SharedCredentialsProvider {
        Arc::new(self)
    }
}

#[async_trait]
impl ProvideCredentials for StaticProvider {
    async fn provide_credentials(&self) -> Result<Credentials, DownstreamError> {
        Ok(self.credentials.clone())
    }
}

/// Default margin before expiry at which cached credentials are refreshed.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(10);

/// Caches another provider's credentials until they are about to expire.
///
/// Concurrent callers share one refresh: the slot mutex is held across the
/// inner call so only the first caller reaches the backing service.
#[derive(Debug)]
pub struct LazyCachingProvider {
    inner: SharedCredentialsProvider,
    buffer: Duration,
    slot: Mutex<Option<Credentials>>,
}

impl LazyCachingProvider {
    pub fn new(inner: SharedCredentialsProvider) -> Self {
        Self::with_buffer(inner, DEFAULT_REFRESH_BUFFER)
    }

    pub fn with_buffer(inner: SharedCredentialsProvider, buffer: Duration) -> Self {
        Self {
            inner,
            buffer,
            slot: Mutex::new(None),
        }
    }

    pub fn shared(self) -> SharedCredentialsProvider {
        Arc::new(self)
    }
}

#[async_trait]
impl ProvideCredentials for LazyCachingProvider {
    async fn provide_credentials(&self) -> Result<Credentials, DownstreamError> {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if !cached.expires_within(Utc::now(), self.buffer) {
                return Ok(cached.clone());
            }
            tracing::debug!(
                provider = cached.provider_name(),
                "cached credentials are about to expire, refreshing"
            );
        }
        let fresh = self.inner.provide_credentials().await?;
        *slot = Some(fresh.clone());
        Ok(fresh)
    }
}
