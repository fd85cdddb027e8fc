//! # awsauth-sigv4
//!
//! AWS Signature Version 4 request signing on top of the
//! `awsauth-credential` session cache.
//!
//! [`SigningTransport`] wraps any [`HttpTransport`]. For each request it
//! resolves (or reuses) a session for the configured tenant, signs the
//! request with the session's credentials and forwards it.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use awsauth_credential::{AuthSettings, CredentialResolver, SessionCache};
//! use awsauth_credential::testing::StubCredentialSource;
//! use awsauth_sigv4::{SigV4Config, SigningTransport, HttpTransport};
//! # async fn run(inner: impl HttpTransport) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let resolver = CredentialResolver::new(Arc::new(StubCredentialSource::new()));
//! let cache = Arc::new(SessionCache::new(Arc::new(resolver)));
//! let config = SigV4Config {
//!     auth_type: "default".into(),
//!     service: "aps".into(),
//!     region: "eu-west-1".into(),
//!     ..SigV4Config::default()
//! };
//!
//! let signing = SigningTransport::new(inner, &config, AuthSettings::default(), cache);
//! let request = http::Request::get("https://aps-workspaces.eu-west-1.amazonaws.com/")
//!     .body(bytes::Bytes::new())?;
//! let response = signing.send(request).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

/// Signing timestamp sources.
pub mod clock;
/// Per-datasource signing configuration.
pub mod config;
pub mod error;
/// Transport decorator.
pub mod middleware;
/// Canonical request construction and signature computation.
pub mod signer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{DEFAULT_SIGNED_HEADERS, SigV4Config};
pub use error::{Result, SigningError};
pub use middleware::{HttpTransport, SigningTransport};
pub use signer::{SigningOutput, SigningParams, sign};
