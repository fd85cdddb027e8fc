//! Session cache behavior: reuse, expiry, cancellation and concurrency.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use awsauth_credential::prelude::*;
use awsauth_credential::testing::{CountingResolver, StubCredentialSource};
use awsauth_credential::{
    CacheStats, ProxyKind, ProxyRoute, ProxySettings, Result, StaticProvider,
};
use chrono::Utc;
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

fn keys(access_key: &str) -> CredentialsConfig {
    CredentialsConfig::static_keys(access_key, "secret").with_region("eu-north-1")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

async fn get(cache: &SessionCache, cfg: &CredentialsConfig) -> Result<ResolvedSession> {
    init_tracing();
    cache
        .get(cfg, &AuthSettings::default(), &CancellationToken::new())
        .await
}

#[tokio::test]
async fn identical_requests_share_one_session() {
    let resolver = CountingResolver::new().shared();
    let cache = SessionCache::new(resolver.clone());

    let first = get(&cache, &keys("AKID")).await.unwrap();
    let second = get(&cache, &keys("AKID")).await.unwrap();

    assert!(Arc::ptr_eq(&first.session, &second.session));
    assert_eq!(first.expiration, second.expiration);
    assert_eq!(resolver.calls(), 1);

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
}

#[tokio::test]
async fn different_secrets_get_different_sessions() {
    let resolver = CountingResolver::new().shared();
    let cache = SessionCache::new(resolver.clone());

    let a = get(&cache, &keys("AKID")).await.unwrap();
    let b = get(
        &cache,
        &CredentialsConfig::static_keys("AKID", "other-secret").with_region("eu-north-1"),
    )
    .await
    .unwrap();

    assert!(!Arc::ptr_eq(&a.session, &b.session));
    assert_eq!(resolver.calls(), 2);
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn expired_entry_is_resolved_exactly_once_more() {
    let resolver = CountingResolver::new()
        .with_lifetime(chrono::Duration::seconds(-1))
        .shared();
    let cache = SessionCache::new(resolver.clone());

    get(&cache, &keys("AKID")).await.unwrap();
    assert_eq!(resolver.calls(), 1);

    let refreshed = get(&cache, &keys("AKID")).await.unwrap();
    assert_eq!(resolver.calls(), 2);
    assert!(refreshed.expiration < Utc::now());
    assert_eq!(cache.len(), 1, "the refresh replaces the stale entry");

    assert_eq!(cache.purge_expired(), 1);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn invalidate_forces_a_new_resolution() {
    let resolver = CountingResolver::new().shared();
    let cache = SessionCache::new(resolver.clone());

    let first = get(&cache, &keys("AKID")).await.unwrap();
    let policy = AuthSettings::default();
    assert!(cache.invalidate(&keys("AKID"), &policy));
    assert!(!cache.invalidate(&keys("AKID"), &policy));

    let second = get(&cache, &keys("AKID")).await.unwrap();
    assert!(!Arc::ptr_eq(&first.session, &second.session));
    assert_eq!(resolver.calls(), 2);
}

#[tokio::test]
async fn cancelled_resolution_leaves_no_entry() {
    let resolver = CountingResolver::new()
        .with_delay(Duration::from_secs(30))
        .shared();
    let cache = SessionCache::new(resolver.clone());
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = cache
        .get(&keys("AKID"), &AuthSettings::default(), &token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn failed_resolution_leaves_no_entry() {
    let source = Arc::new(StubCredentialSource::new().failing("default chain"));
    let cache = SessionCache::new(Arc::new(CredentialResolver::new(source.clone())));
    let cfg = CredentialsConfig::default();

    for _ in 0..2 {
        let err = get(&cache, &cfg).await.unwrap_err();
        assert!(err.is_downstream());
    }
    assert!(cache.is_empty());
    assert_eq!(cache.stats().misses, 2);
    assert_eq!(source.call_count(), 2);
}

#[tokio::test]
async fn disallowed_auth_type_fails_before_lookup() {
    let source = Arc::new(StubCredentialSource::new());
    let cache = SessionCache::new(Arc::new(CredentialResolver::new(source.clone())));
    let cfg = CredentialsConfig {
        auth_type: AuthType::EC2InstanceRole,
        ..CredentialsConfig::default()
    };

    for _ in 0..2 {
        let err = get(&cache, &cfg).await.unwrap_err();
        assert!(err.is_policy());
    }
    assert!(cache.is_empty());
    assert_eq!(cache.stats(), CacheStats::default());
    assert_eq!(source.call_count(), 0);
}

#[tokio::test]
async fn tightened_policy_rejects_cached_sessions() {
    let resolver = CountingResolver::new().shared();
    let cache = SessionCache::new(resolver.clone());
    let cfg = keys("AKID").with_assume_role("arn:aws:iam::123456789012:role/reader");
    get(&cache, &cfg).await.unwrap();

    let keys_removed = AuthSettings {
        allowed_auth_providers: ["default".to_owned()].into(),
        ..AuthSettings::default()
    };
    let err = cache
        .get(&cfg, &keys_removed, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "attempting to use an auth type that is not allowed: \"keys\""
    );

    let assume_role_off = AuthSettings {
        assume_role_enabled: false,
        ..AuthSettings::default()
    };
    let err = cache
        .get(&cfg, &assume_role_off, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Policy(PolicyError::AssumeRoleDisabled)));

    assert_eq!(resolver.calls(), 1);
    assert_eq!(cache.stats().hits, 0);
}

#[tokio::test]
async fn enabling_the_proxy_resolves_a_new_session() {
    let source = Arc::new(StubCredentialSource::new());
    let cache = SessionCache::new(Arc::new(CredentialResolver::new(source)));
    let cfg = CredentialsConfig {
        proxy: ProxySettings {
            kind: ProxyKind::Env,
            ..ProxySettings::default()
        },
        ..keys("AKID")
    };

    let direct = get(&cache, &cfg).await.unwrap();
    assert_eq!(direct.session.proxy(), &ProxyRoute::Direct);

    let proxied_policy = AuthSettings {
        proxy_enabled: true,
        ..AuthSettings::default()
    };
    let proxied = cache
        .get(&cfg, &proxied_policy, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(proxied.session.proxy(), &ProxyRoute::Environment);
    assert!(!Arc::ptr_eq(&direct.session, &proxied.session));
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn session_duration_change_resolves_a_new_session() {
    let resolver = CountingResolver::new().shared();
    let cache = SessionCache::new(resolver.clone());
    let longer = AuthSettings {
        session_duration: Some(Duration::from_secs(3600)),
        ..AuthSettings::default()
    };

    get(&cache, &keys("AKID")).await.unwrap();
    cache
        .get(&keys("AKID"), &longer, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(resolver.calls(), 2);
}

/// Resolves only once `parties` resolutions are in flight at the same time.
struct RendezvousResolver {
    barrier: Barrier,
}

#[async_trait]
impl ResolveSession for RendezvousResolver {
    async fn resolve(
        &self,
        cfg: &CredentialsConfig,
        _policy: &AuthSettings,
        _cancel: &CancellationToken,
    ) -> Result<ResolvedSession> {
        self.barrier.wait().await;
        let credentials =
            StaticProvider::from_keys(cfg.access_key.clone(), cfg.secret_key.clone(), None).shared();
        Ok(ResolvedSession {
            session: Arc::new(Session::new(Default::default(), credentials)),
            expiration: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn misses_for_different_fingerprints_resolve_in_parallel() {
    const TENANTS: usize = 8;
    let cache = Arc::new(SessionCache::new(Arc::new(RendezvousResolver {
        barrier: Barrier::new(TENANTS),
    })));

    let tasks: Vec<_> = (0..TENANTS)
        .map(|tenant| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { get(&cache, &keys(&format!("AKID{tenant}"))).await })
        })
        .collect();

    let all = tokio::time::timeout(Duration::from_secs(10), async {
        let mut sessions = Vec::with_capacity(TENANTS);
        for task in tasks {
            sessions.push(task.await.unwrap().unwrap());
        }
        sessions
    })
    .await
    .expect("resolutions were serialized");

    assert_eq!(all.len(), TENANTS);
    assert_eq!(cache.len(), TENANTS);
    let first = all[0].credentials().await.unwrap();
    assert_eq!(first.access_key_id(), "AKID0");
}
