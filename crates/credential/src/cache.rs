//! Process-wide session cache keyed by a fingerprint of the request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::auth_type::AuthType;
use crate::config::CredentialsConfig;
use crate::error::{AuthError, Result};
use crate::resolver::{ResolveSession, ResolvedSession, check_policy};
use crate::settings::AuthSettings;

const FIELD_SEPARATOR: char = ':';

/// Cache key derived from every input that influences resolution.
///
/// The key covers secrets so that tenants with different keys never share a
/// slot, and the policy values that shape the session (proxy switch, session
/// duration, broker external ID). Only a SHA-256 digest is kept, and
/// `Debug`/`Display` print a short prefix of it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprints a request resolved under `policy`.
    pub fn of(cfg: &CredentialsConfig, policy: &AuthSettings) -> Self {
        Self(Sha256::digest(composite_key(cfg, policy).as_bytes()).into())
    }

    /// Full hex digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..6]))
    }
}

/// Escapes `\` and `:` so that joining fields with `:` stays injective.
fn escape_into(out: &mut String, field: &str) {
    for ch in field.chars() {
        if ch == '\\' || ch == FIELD_SEPARATOR {
            out.push('\\');
        }
        out.push(ch);
    }
}

/// Pre-hash composite key. Contains secrets; never log it.
pub(crate) fn composite_key(cfg: &CredentialsConfig, policy: &AuthSettings) -> String {
    let credentials_path = cfg
        .credentials_path
        .as_deref()
        .map(|path| path.to_string_lossy())
        .unwrap_or_default();
    let session_duration = policy
        .session_duration
        .map(|duration| duration.as_millis().to_string())
        .unwrap_or_default();
    let broker_external_id = match cfg.auth_type {
        AuthType::AssumeRoleBroker => policy.external_id.as_str(),
        _ => "",
    };
    let fields: [&str; 18] = [
        cfg.auth_type.as_str(),
        &cfg.access_key,
        cfg.secret_key.expose(),
        cfg.session_token.expose(),
        &cfg.profile,
        &credentials_path,
        &cfg.assume_role_arn,
        &cfg.external_id,
        &cfg.region,
        &cfg.default_region,
        &cfg.endpoint,
        cfg.proxy.kind.as_str(),
        &cfg.proxy.url,
        &cfg.proxy.username,
        cfg.proxy.password.expose(),
        if policy.proxy_enabled { "1" } else { "0" },
        &session_duration,
        broker_external_id,
    ];

    let mut key = String::with_capacity(fields.iter().map(|f| f.len() + 1).sum());
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            key.push(FIELD_SEPARATOR);
        }
        escape_into(&mut key, field);
    }
    key
}

#[derive(Debug, Clone)]
struct CacheEntry {
    resolved: ResolvedSession,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.resolved.expiration
    }
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Hit rate as a fraction in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Concurrent fingerprint → session map.
///
/// Lookups take a shared lock. Resolution runs with no lock held, so a slow
/// STS call for one fingerprint never blocks another; the exclusive lock is
/// taken only to insert the result. Two concurrent misses on the same
/// fingerprint may both resolve, in which case the later insert wins.
pub struct SessionCache {
    resolver: Arc<dyn ResolveSession>,
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SessionCache {
    pub fn new(resolver: Arc<dyn ResolveSession>) -> Self {
        Self {
            resolver,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns a live session for `cfg`, resolving one on miss or expiry.
    ///
    /// `policy` is enforced on every call, hits included. Nothing is stored
    /// when resolution fails or `cancel` fires.
    pub async fn get(
        &self,
        cfg: &CredentialsConfig,
        policy: &AuthSettings,
        cancel: &CancellationToken,
    ) -> Result<ResolvedSession> {
        check_policy(cfg, policy)?;
        let fingerprint = Fingerprint::of(cfg, policy);

        if let Some(resolved) = self.lookup(&fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(%fingerprint, "session cache hit");
            return Ok(resolved);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%fingerprint, auth_type = %cfg.auth_type, "session cache miss");

        let resolved = self.resolver.resolve(cfg, policy, cancel).await?;
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        self.entries.write().insert(
            fingerprint,
            CacheEntry {
                resolved: resolved.clone(),
            },
        );
        Ok(resolved)
    }

    fn lookup(&self, fingerprint: &Fingerprint) -> Option<ResolvedSession> {
        let now = Utc::now();
        self.entries
            .read()
            .get(fingerprint)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.resolved.clone())
    }

    /// Drops the entry for `cfg` under `policy`. Returns whether one existed.
    pub fn invalidate(&self, cfg: &CredentialsConfig, policy: &AuthSettings) -> bool {
        self.entries
            .write()
            .remove(&Fingerprint::of(cfg, policy))
            .is_some()
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, live or expired.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::SecretValue;
    use proptest::prelude::*;
    use std::time::Duration;

    fn base() -> CredentialsConfig {
        CredentialsConfig::static_keys("AKID", "secret").with_region("eu-north-1")
    }

    fn key(cfg: &CredentialsConfig) -> String {
        composite_key(cfg, &AuthSettings::default())
    }

    fn fingerprint(cfg: &CredentialsConfig) -> Fingerprint {
        Fingerprint::of(cfg, &AuthSettings::default())
    }

    #[test]
    fn separator_inside_field_does_not_collide() {
        let left = CredentialsConfig {
            access_key: "a:b".into(),
            secret_key: SecretValue::new("c"),
            ..base()
        };
        let right = CredentialsConfig {
            access_key: "a".into(),
            secret_key: SecretValue::new("b:c"),
            ..base()
        };
        assert_ne!(key(&left), key(&right));
        assert_ne!(fingerprint(&left), fingerprint(&right));
    }

    #[test]
    fn escape_character_does_not_collide() {
        let left = CredentialsConfig {
            access_key: "a\\".into(),
            secret_key: SecretValue::new(":b"),
            ..base()
        };
        let right = CredentialsConfig {
            access_key: "a\\:".into(),
            secret_key: SecretValue::new("b"),
            ..base()
        };
        assert_ne!(key(&left), key(&right));
    }

    #[test]
    fn fingerprint_is_deterministic_and_redacted() {
        let fp = fingerprint(&base());
        assert_eq!(fp, fingerprint(&base()));
        assert_eq!(fp.to_hex().len(), 64);
        let shown = format!("{fp:?}");
        assert!(!shown.contains("secret"));
        assert_eq!(shown, format!("Fingerprint({})", &fp.to_hex()[..12]));
    }

    #[test]
    fn auth_type_participates() {
        let mut other = base();
        other.auth_type = AuthType::Default;
        assert_ne!(fingerprint(&base()), fingerprint(&other));
    }

    #[test]
    fn policy_values_participate() {
        let default = AuthSettings::default();
        let proxied = AuthSettings {
            proxy_enabled: true,
            ..AuthSettings::default()
        };
        let longer = AuthSettings {
            session_duration: Some(Duration::from_secs(1200)),
            ..AuthSettings::default()
        };
        let base_key = composite_key(&base(), &default);
        assert_ne!(base_key, composite_key(&base(), &proxied));
        assert_ne!(base_key, composite_key(&base(), &longer));
    }

    #[test]
    fn operator_external_id_only_matters_for_the_broker() {
        let operator = AuthSettings {
            external_id: "operator-id".into(),
            ..AuthSettings::default()
        };
        let default = AuthSettings::default();
        assert_eq!(
            composite_key(&base(), &default),
            composite_key(&base(), &operator)
        );

        let broker = CredentialsConfig {
            auth_type: AuthType::AssumeRoleBroker,
            ..base()
        };
        assert_ne!(
            composite_key(&broker, &default),
            composite_key(&broker, &operator)
        );
    }

    #[test]
    fn hit_rate_handles_zero() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            entries: 1,
        };
        assert_eq!(stats.hit_rate(), 0.75);
    }

    fn field() -> impl Strategy<Value = String> {
        prop::string::string_regex(r"[a-c:\\]{0,6}").unwrap()
    }

    proptest! {
        #[test]
        fn changing_one_field_changes_the_key(
            a in field(), b in field(), c in field(), d in field(),
            replacement in field(), which in 0usize..7,
        ) {
            let original = CredentialsConfig {
                auth_type: AuthType::StaticKeys,
                access_key: a.clone(),
                secret_key: SecretValue::new(b.clone()),
                profile: c.clone(),
                assume_role_arn: d.clone(),
                region: a.clone(),
                endpoint: b.clone(),
                ..CredentialsConfig::default()
            };
            let mut changed = original.clone();
            let unchanged = match which {
                0 => { let same = changed.access_key == replacement; changed.access_key = replacement; same }
                1 => { let same = changed.secret_key.expose() == replacement; changed.secret_key = SecretValue::new(replacement); same }
                2 => { let same = changed.profile == replacement; changed.profile = replacement; same }
                3 => { let same = changed.assume_role_arn == replacement; changed.assume_role_arn = replacement; same }
                4 => { let same = changed.region == replacement; changed.region = replacement; same }
                5 => { let same = changed.endpoint == replacement; changed.endpoint = replacement; same }
                _ => { changed.auth_type = AuthType::SharedCredentials; false }
            };
            prop_assume!(!unchanged);
            prop_assert_ne!(key(&original), key(&changed));
        }

        #[test]
        fn adjacent_fields_never_merge(x in field(), y in field(), u in field(), v in field()) {
            prop_assume!(x != u || y != v);
            let left = CredentialsConfig { access_key: x, secret_key: SecretValue::new(y), ..CredentialsConfig::default() };
            let right = CredentialsConfig { access_key: u, secret_key: SecretValue::new(v), ..CredentialsConfig::default() };
            prop_assert_ne!(key(&left), key(&right));
        }
    }
}
