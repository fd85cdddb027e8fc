//! AWS credential resolution for multi-tenant plugins
//!
//! Turns a per-datasource credential request into a ready-to-use AWS session,
//! under operator policy, and caches the result per request fingerprint.
//!
//! # Features
//!
//! - **Policy gating** - operator allow-list and assume-role switch, enforced
//!   before any network I/O
//! - **Five auth types** - default chain, shared file, static keys, instance
//!   role, and the assume-role broker
//! - **STS AssumeRole** - opt-in region, FIPS and GovCloud endpoint handling
//! - **Session cache** - fingerprint keyed, expiry aware, safe to share
//!   across tasks
//! - **Redacted secrets** - secret material never reaches `Debug` output
//!
//! # Cargo features
//!
//! - `aws-sdk` - [`sdk::SdkCredentialSource`], backed by `aws-config`
//! - `test-util` - in-memory stubs in [`testing`]
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use awsauth_credential::prelude::*;
//! use awsauth_credential::testing::StubCredentialSource;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), AuthError> {
//! let resolver = CredentialResolver::new(Arc::new(StubCredentialSource::new()));
//! let cache = SessionCache::new(Arc::new(resolver));
//!
//! let cfg = CredentialsConfig::static_keys("AKID", "secret").with_region("eu-north-1");
//! let resolved = cache
//!     .get(&cfg, &AuthSettings::default(), &CancellationToken::new())
//!     .await?;
//! assert_eq!(resolved.session.region(), Some("eu-north-1"));
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

/// Authentication method selector
pub mod auth_type;
/// Fingerprint keyed session cache
pub mod cache;
/// Per-call credential request
pub mod config;
/// Credential snapshots and providers
pub mod credentials;
/// Per-datasource JSON settings
pub mod datasource;
/// Interval parsing for policy values
pub mod duration;
/// Opt-in region, FIPS and GovCloud handling
pub mod endpoint;
/// Error taxonomy
pub mod error;
/// Datasource proxy settings
pub mod proxy;
/// Session resolution engine
pub mod resolver;
/// Redacted secret strings
pub mod secret;
/// Resolved client configuration
pub mod session;
/// Operator policy
pub mod settings;
/// Capability seam to the cloud SDK
pub mod source;

/// `aws-config` backed credential source
#[cfg(feature = "aws-sdk")]
pub mod sdk;

/// Stubs for tests
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// ── Root re-exports ─────────────────────────────────────────────────────────

pub use crate::auth_type::AuthType;
pub use crate::cache::{CacheStats, Fingerprint, SessionCache};
pub use crate::config::CredentialsConfig;
pub use crate::credentials::{
    Credentials, LazyCachingProvider, ProvideCredentials, SharedCredentialsProvider,
    StaticProvider,
};
pub use crate::datasource::DatasourceSettings;
pub use crate::endpoint::EndpointPlan;
pub use crate::error::{AuthError, ConfigError, DownstreamError, PolicyError, Result};
pub use crate::proxy::{ProxyKind, ProxyRoute, ProxySettings};
pub use crate::resolver::{
    CredentialResolver, ResolveSession, ResolvedSession, ResolverConfig, check_policy,
};
pub use crate::secret::SecretValue;
pub use crate::session::{Session, SessionParams};
pub use crate::settings::{AuthSettings, EnvSource, SettingsSource};
pub use crate::source::{
    AssumeRoleRequest, BrokerKeySource, BrokerKeys, CredentialSource, FileBrokerKeys,
};

#[cfg(feature = "aws-sdk")]
pub use crate::sdk::SdkCredentialSource;

/// Commonly used types and traits
pub mod prelude {
    pub use crate::auth_type::AuthType;
    pub use crate::cache::SessionCache;
    pub use crate::config::CredentialsConfig;
    pub use crate::credentials::{Credentials, ProvideCredentials};
    pub use crate::datasource::DatasourceSettings;
    pub use crate::error::{AuthError, DownstreamError, PolicyError};
    pub use crate::resolver::{CredentialResolver, ResolveSession, ResolvedSession};
    pub use crate::session::Session;
    pub use crate::settings::AuthSettings;
    pub use crate::source::CredentialSource;

    #[cfg(feature = "aws-sdk")]
    pub use crate::sdk::SdkCredentialSource;
}
