//! Capability seam between the resolver and the AWS SDK.
//!
//! The resolver never talks to AWS directly. Each primitive provider the SDK
//! offers is one method on [`CredentialSource`], so tests can substitute a
//! fake and the SDK binding lives behind the `aws-sdk` feature.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::credentials::SharedCredentialsProvider;
use crate::error::DownstreamError;
use crate::secret::SecretValue;
use crate::session::{Session, SessionParams};

/// Parameters of one STS AssumeRole call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub session_name: String,
    pub external_id: Option<String>,
    pub duration: Duration,
}

/// Primitive credential providers offered by the cloud SDK.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// The SDK's default discovery chain (environment, shared file, instance
    /// metadata).
    async fn default_chain(
        &self,
        params: &SessionParams,
    ) -> Result<SharedCredentialsProvider, DownstreamError>;

    /// A named profile from a shared credentials file. `path` of `None`
    /// means the SDK default location.
    async fn shared_file(
        &self,
        path: Option<&Path>,
        profile: &str,
    ) -> Result<SharedCredentialsProvider, DownstreamError>;

    /// Container or instance-metadata credentials, built on a throwaway
    /// session described by `params`.
    async fn remote(
        &self,
        params: &SessionParams,
    ) -> Result<SharedCredentialsProvider, DownstreamError>;

    /// Temporary role credentials obtained by calling STS through `base`.
    async fn assume_role(
        &self,
        base: &Session,
        request: &AssumeRoleRequest,
    ) -> Result<SharedCredentialsProvider, DownstreamError>;
}

/// Pre-provisioned base keys for the assume-role broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerKeys {
    pub access_key_id: String,
    pub secret_access_key: SecretValue,
}

/// Where the broker's base keys come from.
#[async_trait]
pub trait BrokerKeySource: Send + Sync {
    /// Returns the keys when both halves are available.
    async fn read_keys(&self) -> Option<BrokerKeys>;
}

/// Default location of the broker access key file.
pub const BROKER_ACCESS_KEY_PATH: &str = "/tmp/aws.credentials/access-key-id";
/// Default location of the broker secret key file.
pub const BROKER_SECRET_KEY_PATH: &str = "/tmp/aws.credentials/secret-access-key";

/// Reads the broker keys from two files on disk.
#[derive(Debug, Clone)]
pub struct FileBrokerKeys {
    access_key_path: PathBuf,
    secret_key_path: PathBuf,
}

impl Default for FileBrokerKeys {
    fn default() -> Self {
        Self::new(BROKER_ACCESS_KEY_PATH, BROKER_SECRET_KEY_PATH)
    }
}

impl FileBrokerKeys {
    pub fn new(access_key_path: impl Into<PathBuf>, secret_key_path: impl Into<PathBuf>) -> Self {
        Self {
            access_key_path: access_key_path.into(),
            secret_key_path: secret_key_path.into(),
        }
    }

    async fn read_trimmed(path: &Path) -> Option<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let value = contents.trim();
                (!value.is_empty()).then(|| value.to_owned())
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "broker key file not readable");
                None
            }
        }
    }
}

#[async_trait]
impl BrokerKeySource for FileBrokerKeys {
    async fn read_keys(&self) -> Option<BrokerKeys> {
        let access_key_id = Self::read_trimmed(&self.access_key_path).await?;
        let secret = Self::read_trimmed(&self.secret_key_path).await?;
        Some(BrokerKeys {
            access_key_id,
            secret_access_key: SecretValue::new(secret),
        })
    }
}
