//! In-memory stand-ins for the cloud SDK, used by tests.
//!
//! Available under `cfg(test)` and the `test-util` feature.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::CredentialsConfig;
use crate::credentials::{Credentials, SharedCredentialsProvider, StaticProvider};
use crate::error::{AuthError, DownstreamError, Result};
use crate::resolver::{ResolveSession, ResolvedSession};
use crate::secret::SecretValue;
use crate::session::{Session, SessionParams};
use crate::settings::AuthSettings;
use crate::source::{AssumeRoleRequest, BrokerKeySource, BrokerKeys, CredentialSource};

/// One call observed by [`StubCredentialSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    DefaultChain(SessionParams),
    SharedFile {
        path: Option<PathBuf>,
        profile: String,
    },
    Remote(SessionParams),
    AssumeRole {
        /// Parameters of the intermediate session STS was called through.
        sts: SessionParams,
        request: AssumeRoleRequest,
    },
}

/// Records every call and hands out fixed credentials.
///
/// | Operation       | Access key | Secret      |
/// |-----------------|------------|-------------|
/// | `default_chain` | `default`  | `chain`     |
/// | `shared_file`   | `shared`   | the profile |
/// | `remote`        | `remote`   | `instance`  |
/// | `assume_role`   | `assumed`  | `role`      |
#[derive(Debug, Default)]
pub struct StubCredentialSource {
    calls: Mutex<Vec<SourceCall>>,
    failing: Mutex<Option<&'static str>>,
    assume_role_delay: Mutex<Option<Duration>>,
}

impl StubCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `operation` (`"default chain"`, `"shared file"`, `"remote"` or
    /// `"assume role"`) fail with a downstream error.
    pub fn failing(self, operation: &'static str) -> Self {
        *self.failing.lock() = Some(operation);
        self
    }

    /// Delays every `assume_role` call.
    pub fn with_assume_role_delay(self, delay: Duration) -> Self {
        *self.assume_role_delay.lock() = Some(delay);
        self
    }

    /// Snapshot of the recorded calls, oldest first.
    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Requests passed to `assume_role`, with the intermediate session.
    pub fn assume_role_calls(&self) -> Vec<(SessionParams, AssumeRoleRequest)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SourceCall::AssumeRole { sts, request } => Some((sts.clone(), request.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&self, operation: &'static str, call: SourceCall) -> Result<(), DownstreamError> {
        self.calls.lock().push(call);
        if *self.failing.lock() == Some(operation) {
            return Err(DownstreamError::new(operation, "stubbed failure"));
        }
        Ok(())
    }

    fn provider(access_key: &str, secret: &str, provider_name: &'static str) -> SharedCredentialsProvider {
        StaticProvider::new(Credentials::new(
            access_key,
            SecretValue::new(secret),
            None,
            None,
            provider_name,
        ))
        .shared()
    }
}

#[async_trait]
impl CredentialSource for StubCredentialSource {
    async fn default_chain(
        &self,
        params: &SessionParams,
    ) -> Result<SharedCredentialsProvider, DownstreamError> {
        self.record("default chain", SourceCall::DefaultChain(params.clone()))?;
        Ok(Self::provider("default", "chain", "default_chain"))
    }

    async fn shared_file(
        &self,
        path: Option<&Path>,
        profile: &str,
    ) -> Result<SharedCredentialsProvider, DownstreamError> {
        self.record(
            "shared file",
            SourceCall::SharedFile {
                path: path.map(Path::to_path_buf),
                profile: profile.to_owned(),
            },
        )?;
        Ok(Self::provider("shared", profile, "shared_file"))
    }

    async fn remote(
        &self,
        params: &SessionParams,
    ) -> Result<SharedCredentialsProvider, DownstreamError> {
        self.record("remote", SourceCall::Remote(params.clone()))?;
        Ok(Self::provider("remote", "instance", "remote"))
    }

    async fn assume_role(
        &self,
        base: &Session,
        request: &AssumeRoleRequest,
    ) -> Result<SharedCredentialsProvider, DownstreamError> {
        let delay = *self.assume_role_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(
            "assume role",
            SourceCall::AssumeRole {
                sts: base.params().clone(),
                request: request.clone(),
            },
        )?;
        Ok(Self::provider("assumed", "role", "assume_role"))
    }
}

/// Broker keys held in memory.
#[derive(Debug, Clone, Default)]
pub struct StubBrokerKeys {
    keys: Option<BrokerKeys>,
}

impl StubBrokerKeys {
    pub fn provisioned(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            keys: Some(BrokerKeys {
                access_key_id: access_key_id.to_owned(),
                secret_access_key: SecretValue::new(secret_access_key),
            }),
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BrokerKeySource for StubBrokerKeys {
    async fn read_keys(&self) -> Option<BrokerKeys> {
        self.keys.clone()
    }
}

/// Resolver that counts invocations and returns static sessions.
///
/// Honors cancellation while its optional delay elapses, the same way the
/// real resolver races its SDK calls.
#[derive(Debug)]
pub struct CountingResolver {
    calls: AtomicUsize,
    lifetime: chrono::Duration,
    delay: Option<Duration>,
}

impl Default for CountingResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CountingResolver {
    /// Sessions live for one hour.
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            lifetime: chrono::Duration::hours(1),
            delay: None,
        }
    }

    /// Sets the session lifetime. A negative value yields already expired
    /// sessions.
    pub fn with_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl ResolveSession for CountingResolver {
    async fn resolve(
        &self,
        cfg: &CredentialsConfig,
        _policy: &AuthSettings,
        cancel: &CancellationToken,
    ) -> Result<ResolvedSession> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AuthError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
        let params = SessionParams {
            region: cfg.effective_region().map(str::to_owned),
            endpoint: cfg.endpoint().map(str::to_owned),
            ..SessionParams::default()
        };
        let credentials = StaticProvider::from_keys(format!("AKID{n}"), "counting", None).shared();
        Ok(ResolvedSession {
            session: Arc::new(Session::new(params, credentials)),
            expiration: Utc::now() + self.lifetime,
        })
    }
}
