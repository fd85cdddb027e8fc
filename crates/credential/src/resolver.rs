//! Turns a per-call [`CredentialsConfig`] into a ready-to-use [`Session`].
//!
//! Resolution runs in a fixed order:
//!
//! 1. policy check (no I/O),
//! 2. region normalization and endpoint planning,
//! 3. primary credentials for the auth type,
//! 4. optional STS AssumeRole exchange on an intermediate session,
//! 5. final session for the caller's region and endpoint.
//!
//! Every SDK call races the caller's [`CancellationToken`].

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::auth_type::AuthType;
use crate::config::CredentialsConfig;
use crate::credentials::{Credentials, SharedCredentialsProvider, StaticProvider};
use crate::endpoint::{EndpointPlan, STS_FALLBACK_REGION, is_opt_in_region};
use crate::error::{AuthError, PolicyError, Result};
use crate::proxy::{ProxyKind, ProxyRoute};
use crate::session::{Session, SessionParams, user_agent};
use crate::settings::AuthSettings;
use crate::source::{AssumeRoleRequest, BrokerKeySource, CredentialSource, FileBrokerKeys};

/// Assume-role duration used when policy does not set one.
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(15 * 60);

/// Shared credentials profile the broker falls back to.
pub const BROKER_PROFILE: &str = "assume_role_credentials";

/// Histogram of session creation latency in seconds, labelled by
/// `auth_type`.
pub const SESSION_CREATED_METRIC: &str = "aws_session_created_duration_seconds";

/// Resolver tunables.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Assume-role duration when [`AuthSettings::session_duration`] is unset.
    pub default_session_duration: Duration,
    /// Shared credentials profile read by the broker when no key files exist.
    pub broker_profile: String,
    /// Prefix of the STS role session name; a timestamp is appended.
    pub session_name_prefix: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_session_duration: DEFAULT_SESSION_DURATION,
            broker_profile: BROKER_PROFILE.to_owned(),
            session_name_prefix: "awsauth".to_owned(),
        }
    }
}

/// A resolved session and the instant after which it must not be reused.
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub session: Arc<Session>,
    pub expiration: DateTime<Utc>,
}

impl ResolvedSession {
    /// Fetches a credential snapshot from the session's provider.
    pub async fn credentials(&self) -> Result<Credentials> {
        Ok(self.session.credentials().provide_credentials().await?)
    }
}

/// Anything that can resolve a session; the cache is generic over this.
#[async_trait]
pub trait ResolveSession: Send + Sync {
    async fn resolve(
        &self,
        cfg: &CredentialsConfig,
        policy: &AuthSettings,
        cancel: &CancellationToken,
    ) -> Result<ResolvedSession>;
}

/// Validates `cfg` against operator policy.
pub fn check_policy(cfg: &CredentialsConfig, policy: &AuthSettings) -> Result<(), PolicyError> {
    if !policy.allows(cfg.auth_type) {
        return Err(PolicyError::AuthTypeNotAllowed {
            auth_type: cfg.auth_type.as_str().to_owned(),
        });
    }
    if cfg.wants_assume_role() && !policy.assume_role_enabled {
        return Err(PolicyError::AssumeRoleDisabled);
    }
    Ok(())
}

/// The credential resolution engine.
pub struct CredentialResolver {
    source: Arc<dyn CredentialSource>,
    broker_keys: Arc<dyn BrokerKeySource>,
    config: ResolverConfig,
}

impl CredentialResolver {
    /// Resolver with default tunables and the on-disk broker key files.
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            broker_keys: Arc::new(FileBrokerKeys::default()),
            config: ResolverConfig::default(),
        }
    }

    pub fn with_broker_keys(mut self, broker_keys: Arc<dyn BrokerKeySource>) -> Self {
        self.broker_keys = broker_keys;
        self
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    async fn primary_credentials(
        &self,
        cfg: &CredentialsConfig,
        base: &SessionParams,
    ) -> Result<SharedCredentialsProvider> {
        let provider = match cfg.auth_type {
            AuthType::StaticKeys => StaticProvider::from_keys(
                cfg.access_key.clone(),
                cfg.secret_key.clone(),
                Some(cfg.session_token.clone()),
            )
            .shared(),
            AuthType::SharedCredentials => {
                self.source
                    .shared_file(cfg.credentials_path.as_deref(), &cfg.profile)
                    .await?
            }
            AuthType::EC2InstanceRole => {
                // Remote providers only need the region; the endpoint
                // override belongs to the final session.
                let throwaway = SessionParams {
                    region: base.region.clone(),
                    proxy: base.proxy.clone(),
                    ..SessionParams::default()
                };
                self.source.remote(&throwaway).await?
            }
            AuthType::Default => self.source.default_chain(base).await?,
            AuthType::AssumeRoleBroker => match self.broker_keys.read_keys().await {
                Some(keys) => {
                    tracing::debug!("using provisioned broker keys");
                    StaticProvider::new(Credentials::new(
                        keys.access_key_id,
                        keys.secret_access_key,
                        None,
                        None,
                        "broker",
                    ))
                    .shared()
                }
                None => {
                    tracing::debug!(
                        profile = %self.config.broker_profile,
                        "broker keys not provisioned, using shared credentials profile"
                    );
                    self.source
                        .shared_file(cfg.credentials_path.as_deref(), &self.config.broker_profile)
                        .await?
                }
            },
        };
        Ok(provider)
    }

    /// The broker always uses the operator's external ID; everyone else may
    /// supply their own.
    fn external_id(cfg: &CredentialsConfig, policy: &AuthSettings) -> Option<String> {
        let external_id = match cfg.auth_type {
            AuthType::AssumeRoleBroker => policy.external_id.as_str(),
            _ => cfg.external_id.as_str(),
        };
        (!external_id.is_empty()).then(|| external_id.to_owned())
    }

    fn proxy_route(cfg: &CredentialsConfig, policy: &AuthSettings) -> Result<ProxyRoute> {
        if cfg.proxy.kind == ProxyKind::None {
            return Ok(ProxyRoute::Direct);
        }
        if !policy.proxy_enabled {
            tracing::debug!(
                proxy = cfg.proxy.kind.as_str(),
                "datasource proxy ignored, proxying is disabled by policy"
            );
            return Ok(ProxyRoute::Direct);
        }
        Ok(cfg.proxy.route()?)
    }

    fn session_name(&self) -> String {
        format!(
            "{}-{}",
            self.config.session_name_prefix,
            Utc::now().timestamp_millis()
        )
    }
}

#[async_trait]
impl ResolveSession for CredentialResolver {
    async fn resolve(
        &self,
        cfg: &CredentialsConfig,
        policy: &AuthSettings,
        cancel: &CancellationToken,
    ) -> Result<ResolvedSession> {
        check_policy(cfg, policy)?;
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        let started = Instant::now();
        let region = cfg.effective_region().map(str::to_owned);
        let endpoint = cfg.endpoint();
        let plan = EndpointPlan::new(endpoint, region.as_deref());
        tracing::debug!(
            auth_type = %cfg.auth_type,
            region = ?region,
            use_fips = plan.use_fips,
            assume_role = cfg.wants_assume_role(),
            "resolving aws session"
        );

        let base = SessionParams {
            region: region.clone(),
            endpoint: None,
            use_fips_endpoint: plan.use_fips,
            sts_regional_endpoint: false,
            proxy: Self::proxy_route(cfg, policy)?,
            user_agent: Some(user_agent(cfg.user_agent.as_deref())),
        };

        let primary = cancellable(cancel, self.primary_credentials(cfg, &base)).await?;
        let duration = policy
            .session_duration
            .unwrap_or(self.config.default_session_duration);

        let credentials = if cfg.wants_assume_role() {
            let mut sts_params = base.clone();
            sts_params.endpoint.clone_from(&plan.sts_endpoint);
            if let Some(target) = region.as_deref().filter(|r| is_opt_in_region(r)) {
                tracing::debug!(
                    region = target,
                    sts_region = STS_FALLBACK_REGION,
                    "opt-in region, calling STS through the fallback region"
                );
                sts_params.region = Some(STS_FALLBACK_REGION.to_owned());
                sts_params.sts_regional_endpoint = true;
            }
            let sts_session = Session::new(sts_params, primary);
            let request = AssumeRoleRequest {
                role_arn: cfg.assume_role_arn.clone(),
                session_name: self.session_name(),
                external_id: Self::external_id(cfg, policy),
                duration,
            };
            cancellable(cancel, self.source.assume_role(&sts_session, &request)).await?
        } else {
            primary
        };

        let expiration = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let final_params = SessionParams {
            endpoint: endpoint.map(str::to_owned),
            ..base
        };

        let elapsed = started.elapsed();
        metrics::histogram!(SESSION_CREATED_METRIC, "auth_type" => cfg.auth_type.as_str())
            .record(elapsed.as_secs_f64());
        tracing::debug!(
            auth_type = %cfg.auth_type,
            elapsed_ms = elapsed.as_millis() as u64,
            expiration = %expiration,
            "aws session created"
        );

        Ok(ResolvedSession {
            session: Arc::new(Session::new(final_params, credentials)),
            expiration,
        })
    }
}

/// Runs `fut` unless `cancel` fires first.
async fn cancellable<T, E>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T>
where
    AuthError: From<E>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AuthError::Cancelled),
        result = fut => result.map_err(AuthError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(allowed: &[&str]) -> AuthSettings {
        AuthSettings {
            allowed_auth_providers: allowed.iter().map(|s| (*s).to_owned()).collect(),
            ..AuthSettings::default()
        }
    }

    #[test]
    fn disallowed_auth_type_is_rejected() {
        let cfg = CredentialsConfig {
            auth_type: AuthType::EC2InstanceRole,
            ..CredentialsConfig::default()
        };
        let err = check_policy(&cfg, &policy(&["keys"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "attempting to use an auth type that is not allowed: \"ec2_iam_role\""
        );
    }

    #[test]
    fn arn_requires_assume_role_enabled() {
        let cfg = CredentialsConfig::static_keys("a", "b").with_assume_role("arn:aws:iam::1:role/x");
        let mut settings = policy(&["keys"]);
        assert!(check_policy(&cfg, &settings).is_ok());

        settings.assume_role_enabled = false;
        assert!(matches!(
            check_policy(&cfg, &settings),
            Err(PolicyError::AssumeRoleDisabled)
        ));
    }

    #[test]
    fn broker_ignores_tenant_external_id() {
        let mut settings = policy(&["grafana_assume_role"]);
        settings.external_id = "operator".into();
        let cfg = CredentialsConfig {
            auth_type: AuthType::AssumeRoleBroker,
            external_id: "tenant".into(),
            ..CredentialsConfig::default()
        };
        assert_eq!(
            CredentialResolver::external_id(&cfg, &settings).as_deref(),
            Some("operator")
        );

        let cfg = CredentialsConfig {
            auth_type: AuthType::StaticKeys,
            ..cfg
        };
        assert_eq!(
            CredentialResolver::external_id(&cfg, &settings).as_deref(),
            Some("tenant")
        );
    }

    #[test]
    fn empty_external_id_is_omitted() {
        let cfg = CredentialsConfig::static_keys("a", "b");
        assert_eq!(CredentialResolver::external_id(&cfg, &AuthSettings::default()), None);
    }

    #[tokio::test]
    async fn cancellable_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<()> = cancellable(&token, std::future::pending::<Result<(), AuthError>>()).await;
        assert!(matches!(result, Err(AuthError::Cancelled)));
    }
}
