//! Supported credential acquisition strategies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PolicyError;

/// How a datasource obtains its AWS credentials.
///
/// The canonical token returned by [`AuthType::as_str`] is stable: it is
/// compared against the operator allow-list and is part of every cache
/// fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthType {
    /// SDK default discovery chain (environment, shared file, instance metadata).
    #[default]
    Default,
    /// Named profile from a shared credentials file.
    SharedCredentials,
    /// Access key and secret key supplied with the datasource.
    StaticKeys,
    /// EC2 instance role or ECS task role.
    EC2InstanceRole,
    /// Hosted assume-role broker with operator-provisioned base credentials.
    AssumeRoleBroker,
}

impl AuthType {
    /// Every variant, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Default,
        Self::SharedCredentials,
        Self::StaticKeys,
        Self::EC2InstanceRole,
        Self::AssumeRoleBroker,
    ];

    /// Canonical token.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::SharedCredentials => "credentials",
            Self::StaticKeys => "keys",
            Self::EC2InstanceRole => "ec2_iam_role",
            Self::AssumeRoleBroker => "grafana_assume_role",
        }
    }

    /// Canonical token or another spelling of the same strategy.
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "default" => Some(Self::Default),
            "credentials" | "sharedCreds" => Some(Self::SharedCredentials),
            "keys" => Some(Self::StaticKeys),
            "ec2_iam_role" => Some(Self::EC2InstanceRole),
            "grafana_assume_role" | "assume_role_broker" => Some(Self::AssumeRoleBroker),
            _ => None,
        }
    }

    /// Looks up a token, including the migration of retired strategies.
    fn lookup(token: &str) -> Option<Self> {
        match token {
            // Old "arn" datasources resolved through the default chain.
            "arn" => Some(Self::Default),
            other => Self::from_token(other),
        }
    }

    /// Whether an allow-list entry names this strategy.
    ///
    /// Retired strategies migrated by [`AuthType::parse`] never match: an
    /// allow-list entry `arn` does not permit [`AuthType::Default`].
    pub fn is_named_by(self, entry: &str) -> bool {
        Self::from_token(entry.trim()) == Some(self)
    }

    /// Lenient parse used for previously saved configuration.
    ///
    /// Unknown or empty tokens resolve to [`AuthType::Default`] and emit a
    /// warning instead of failing.
    pub fn parse(token: &str) -> Self {
        let trimmed = token.trim();
        match Self::lookup(trimmed) {
            Some(auth_type) => auth_type,
            None => {
                if !trimmed.is_empty() {
                    tracing::warn!(
                        auth_type = trimmed,
                        "unrecognized auth type, falling back to default"
                    );
                }
                Self::Default
            }
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse: unknown tokens are a policy error.
impl FromStr for AuthType {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s.trim()).ok_or_else(|| PolicyError::UnknownAuthType(s.to_owned()))
    }
}

impl Serialize for AuthType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuthType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = Option::<String>::deserialize(deserializer)?;
        Ok(token.as_deref().map_or(Self::Default, Self::parse))
    }
}
