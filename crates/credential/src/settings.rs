//! Operator-level auth policy and the sources it is read from.

use std::collections::{BTreeSet, HashMap};
use std::hash::BuildHasher;
use std::time::Duration;

use crate::auth_type::AuthType;
use crate::duration::parse_interval;

/// Comma separated list of permitted auth type tokens.
pub const ALLOWED_AUTH_PROVIDERS_KEY: &str = "AWS_AUTH_AllowedAuthProviders";
/// Whether assume-role ARNs may be used at all.
pub const ASSUME_ROLE_ENABLED_KEY: &str = "AWS_AUTH_AssumeRoleEnabled";
/// External ID injected into broker assume-role calls.
pub const EXTERNAL_ID_KEY: &str = "AWS_AUTH_EXTERNAL_ID";
/// Assume-role session duration.
pub const SESSION_DURATION_KEY: &str = "AWS_AUTH_SESSION_DURATION";
/// Whether per-datasource proxy routing is honored.
pub const PROXY_ENABLED_KEY: &str = "AWS_AUTH_PROXY_ENABLED";

const AUTH_KEYS: [&str; 5] = [
    ALLOWED_AUTH_PROVIDERS_KEY,
    ASSUME_ROLE_ENABLED_KEY,
    EXTERNAL_ID_KEY,
    SESSION_DURATION_KEY,
    PROXY_ENABLED_KEY,
];

const DEFAULT_ALLOWED: [AuthType; 3] = [
    AuthType::Default,
    AuthType::StaticKeys,
    AuthType::SharedCredentials,
];

/// Read-only key/value view over host configuration.
pub trait SettingsSource {
    /// Returns the raw value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;
}

impl<S: BuildHasher> SettingsSource for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Process environment, optionally namespaced with a prefix.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    prefix: Option<String>,
}

impl EnvSource {
    /// Reads keys verbatim.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `<prefix><key>` instead of `<key>`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl SettingsSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        let name = match &self.prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_owned(),
        };
        std::env::var(name).ok()
    }
}

/// Operator policy applied to every resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    /// Canonical tokens of permitted auth types.
    pub allowed_auth_providers: BTreeSet<String>,
    /// Whether assume-role ARNs are permitted.
    pub assume_role_enabled: bool,
    /// External ID for broker assume-role calls.
    pub external_id: String,
    /// Overrides the provider's default assume-role duration.
    pub session_duration: Option<Duration>,
    /// Whether per-datasource proxy routing is honored.
    pub proxy_enabled: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            allowed_auth_providers: default_allowed(),
            assume_role_enabled: true,
            external_id: String::new(),
            session_duration: None,
            proxy_enabled: false,
        }
    }
}

impl AuthSettings {
    /// Loads policy from `source`. Never fails; every malformed field falls
    /// back to its documented default.
    pub fn load(source: &dyn SettingsSource) -> Self {
        let mut settings = Self::default();

        let allowed: BTreeSet<String> = lookup(source, ALLOWED_AUTH_PROVIDERS_KEY)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        if allowed.is_empty() {
            tracing::warn!(
                key = ALLOWED_AUTH_PROVIDERS_KEY,
                "no allowed auth providers configured, using default, keys and credentials"
            );
        } else {
            settings.allowed_auth_providers = allowed;
        }

        match lookup(source, ASSUME_ROLE_ENABLED_KEY) {
            None => tracing::warn!(
                key = ASSUME_ROLE_ENABLED_KEY,
                "assume role enabled not set, defaulting to enabled"
            ),
            Some(raw) => match parse_bool(&raw) {
                Some(enabled) => settings.assume_role_enabled = enabled,
                None => tracing::error!(
                    key = ASSUME_ROLE_ENABLED_KEY,
                    value = %raw,
                    "could not parse assume role enabled, defaulting to enabled"
                ),
            },
        }

        if let Some(external_id) = lookup(source, EXTERNAL_ID_KEY) {
            settings.external_id = external_id;
        }

        if let Some(raw) = lookup(source, SESSION_DURATION_KEY) {
            match parse_interval(&raw) {
                Ok(duration) => settings.session_duration = Some(duration),
                Err(err) => tracing::error!(
                    key = SESSION_DURATION_KEY,
                    error = %err,
                    "could not parse session duration, using provider default"
                ),
            }
        }

        if let Some(raw) = lookup(source, PROXY_ENABLED_KEY) {
            match parse_bool(&raw) {
                Some(enabled) => settings.proxy_enabled = enabled,
                None => tracing::error!(
                    key = PROXY_ENABLED_KEY,
                    value = %raw,
                    "could not parse proxy enabled, defaulting to disabled"
                ),
            }
        }

        settings
    }

    /// Reads policy from the host configuration when it carries any auth
    /// key, otherwise from the process environment.
    ///
    /// Operators usually set the session duration as a plain environment
    /// variable, so it is taken from the environment when the host map
    /// lacks it.
    pub fn read(host: Option<&dyn SettingsSource>) -> Self {
        let env = EnvSource::new();
        match host {
            Some(host) if AUTH_KEYS.iter().any(|key| lookup(host, key).is_some()) => {
                let mut settings = Self::load(host);
                if settings.session_duration.is_none() && lookup(host, SESSION_DURATION_KEY).is_none()
                {
                    settings.session_duration = lookup(&env, SESSION_DURATION_KEY)
                        .and_then(|raw| parse_interval(&raw).ok());
                }
                settings
            }
            _ => Self::load(&env),
        }
    }

    /// Whether `auth_type` is on the allow-list.
    pub fn allows(&self, auth_type: AuthType) -> bool {
        self.allowed_auth_providers
            .iter()
            .any(|entry| auth_type.is_named_by(entry))
    }
}

fn default_allowed() -> BTreeSet<String> {
    DEFAULT_ALLOWED
        .iter()
        .map(|auth_type| auth_type.as_str().to_owned())
        .collect()
}

/// Empty values count as unset.
fn lookup(source: &dyn SettingsSource, key: &str) -> Option<String> {
    source.get(key).filter(|value| !value.trim().is_empty())
}

/// Accepts `1`, `t`, `true` and their negative and case variants.
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn empty_source_uses_defaults() {
        let settings = AuthSettings::load(&source(&[]));
        assert_eq!(settings, AuthSettings::default());
        assert!(settings.allows(AuthType::Default));
        assert!(settings.allows(AuthType::StaticKeys));
        assert!(settings.allows(AuthType::SharedCredentials));
        assert!(!settings.allows(AuthType::EC2InstanceRole));
    }

    #[test]
    fn allow_list_is_trimmed_and_deduplicated() {
        let settings = AuthSettings::load(&source(&[(
            ALLOWED_AUTH_PROVIDERS_KEY,
            " keys , ,ec2_iam_role,keys,",
        )]));
        let expected: BTreeSet<String> = ["ec2_iam_role", "keys"].map(String::from).into();
        assert_eq!(settings.allowed_auth_providers, expected);
    }

    #[test]
    fn allow_list_of_only_separators_falls_back() {
        let settings = AuthSettings::load(&source(&[(ALLOWED_AUTH_PROVIDERS_KEY, " , ,")]));
        assert_eq!(settings.allowed_auth_providers, default_allowed());
    }

    #[test]
    fn assume_role_enabled_parsing() {
        let disabled = AuthSettings::load(&source(&[(ASSUME_ROLE_ENABLED_KEY, "false")]));
        assert!(!disabled.assume_role_enabled);

        let garbage = AuthSettings::load(&source(&[(ASSUME_ROLE_ENABLED_KEY, "nope")]));
        assert!(garbage.assume_role_enabled);
    }

    #[test]
    fn external_id_duration_and_proxy() {
        let settings = AuthSettings::load(&source(&[
            (EXTERNAL_ID_KEY, "operator-id"),
            (SESSION_DURATION_KEY, "20m"),
            (PROXY_ENABLED_KEY, "true"),
        ]));
        assert_eq!(settings.external_id, "operator-id");
        assert_eq!(settings.session_duration, Some(Duration::from_secs(1200)));
        assert!(settings.proxy_enabled);
    }

    #[test]
    fn malformed_duration_and_proxy_flag_use_defaults() {
        let settings = AuthSettings::load(&source(&[
            (SESSION_DURATION_KEY, "eventually"),
            (PROXY_ENABLED_KEY, "maybe"),
        ]));
        assert_eq!(settings.session_duration, None);
        assert!(!settings.proxy_enabled);
    }

    #[test]
    fn broker_is_allowed_under_either_spelling() {
        for entry in ["grafana_assume_role", "assume_role_broker"] {
            let settings = AuthSettings::load(&source(&[(ALLOWED_AUTH_PROVIDERS_KEY, entry)]));
            assert!(settings.allows(AuthType::parse("grafana_assume_role")));
            assert!(!settings.allows(AuthType::StaticKeys));
        }
    }

    #[test]
    fn read_prefers_host_map_with_auth_keys() {
        let host = source(&[(ALLOWED_AUTH_PROVIDERS_KEY, "ec2_iam_role")]);
        let settings = AuthSettings::read(Some(&host as &dyn SettingsSource));
        assert!(settings.allows(AuthType::EC2InstanceRole));
        assert!(!settings.allows(AuthType::StaticKeys));
    }

    #[test]
    fn bool_spellings() {
        for raw in ["1", "t", "T", "true", "TRUE", "True"] {
            assert_eq!(parse_bool(raw), Some(true), "{raw}");
        }
        for raw in ["0", "f", "F", "false", "FALSE", "False"] {
            assert_eq!(parse_bool(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_bool("yes"), None);
    }
}
