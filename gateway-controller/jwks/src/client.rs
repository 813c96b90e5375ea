use crate::{
    metrics::{Lookup, Metrics},
    source::{Source, SourceError},
};
use gateway_controller_cache::{Cache, Expiration, Sweeper};
use jsonwebtoken::jwk::{Jwk, PublicKeyUse};
use std::sync::Arc;
use tokio::{
    sync::Semaphore,
    time::{Duration, Instant},
};
use tracing::Instrument;

/// How long a fetched key may be served before it must be fetched again.
pub const PUB_KEY_EXPIRATION: Duration = Duration::from_secs(12 * 60 * 60);

/// How often expired keys are removed from the cache.
pub const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// How long a fetched key is served before a background refresh is attempted.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(5 * 60);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Keys older than this are still served, but trigger a background refresh.
    pub refresh: Duration,

    /// Keys older than this are evicted and must be fetched synchronously.
    pub ttl: Duration,

    /// How often expired keys are swept from the cache. Zero disables sweeping.
    pub cleanup_interval: Duration,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid refresh {refresh:?}: must be less than ttl {ttl:?}")]
    RefreshExceedsTtl { refresh: Duration, ttl: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("JWK {kid} not found (use: {})", .key_use.as_deref().unwrap_or("any"))]
    KeyNotFound {
        kid: String,
        key_use: Option<String>,
    },
}

/// Looks up JSON Web Keys by key ID, caching them for the configured TTL.
///
/// At most one background refresh runs at a time across all keys.
#[derive(Debug)]
pub struct Client<S> {
    inner: Arc<Inner<S>>,
    _sweeper: Option<Sweeper>,
}

#[derive(Debug)]
struct Inner<S> {
    source: S,
    cache: Cache<Arc<CachedKey>>,
    refresh: Duration,
    ttl: Duration,
    refreshing: Arc<Semaphore>,
    metrics: Metrics,
}

#[derive(Debug)]
struct CachedKey {
    jwk: Jwk,
    refresh_at: Instant,
}

// === impl Config ===

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh: DEFAULT_REFRESH,
            ttl: PUB_KEY_EXPIRATION,
            cleanup_interval: CACHE_CLEANUP_INTERVAL,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh >= self.ttl {
            return Err(ConfigError::RefreshExceedsTtl {
                refresh: self.refresh,
                ttl: self.ttl,
            });
        }
        Ok(())
    }
}

// === impl Client ===

impl<S: Source> Client<S> {
    /// Creates a client and spawns its cache sweeper.
    ///
    /// Must be called from within a Tokio runtime. The sweeper is stopped when the client is
    /// dropped.
    pub fn new(source: S, config: Config, metrics: Metrics) -> Result<Self, ConfigError> {
        config.validate()?;

        let cache = Cache::new(config.ttl);
        cache.on_evicted({
            let metrics = metrics.clone();
            move |kid, _| {
                tracing::debug!(%kid, "Evicted expired key");
                metrics.evicted();
            }
        });
        let sweeper = cache.spawn_sweeper(config.cleanup_interval);

        Ok(Self {
            inner: Arc::new(Inner {
                source,
                cache,
                refresh: config.refresh,
                ttl: config.ttl,
                refreshing: Arc::new(Semaphore::new(1)),
                metrics,
            }),
            _sweeper: sweeper,
        })
    }

    /// Returns the key identified by `kid`.
    ///
    /// When `key_use` is set, keys that declare a different use are not returned.
    ///
    /// Cached keys are returned without waiting on the network. When a cached key is past
    /// its refresh deadline, a background refresh is started unless one is already running;
    /// its failure is logged and the cached key remains in use. Uncached keys are fetched
    /// before returning.
    pub async fn get_key(&self, kid: &str, key_use: Option<&PublicKeyUse>) -> Result<Jwk, Error> {
        if let Some(cached) = self.inner.cache.get(kid) {
            if matches_use(&cached.jwk, key_use) {
                if Instant::now() <= cached.refresh_at {
                    self.inner.metrics.lookup(Lookup::Hit);
                    return Ok(cached.jwk.clone());
                }

                self.inner.metrics.lookup(Lookup::Stale);
                self.spawn_refresh(kid, key_use);
                return Ok(cached.jwk.clone());
            }
        }

        self.inner.metrics.lookup(Lookup::Miss);
        self.inner.refresh(kid, key_use).await
    }

    fn spawn_refresh(&self, kid: &str, key_use: Option<&PublicKeyUse>) {
        let Ok(permit) = self.inner.refreshing.clone().try_acquire_owned() else {
            tracing::trace!(%kid, "Refresh already in flight");
            return;
        };

        let inner = self.inner.clone();
        let kid = kid.to_string();
        let key_use = key_use.cloned();
        let span = tracing::debug_span!("refresh", %kid);
        tokio::spawn(
            async move {
                // Released on every exit path, including cancellation.
                let _permit = permit;
                if let Err(error) = inner.refresh(&kid, key_use.as_ref()).await {
                    tracing::warn!(%error, "Unable to refresh key");
                }
            }
            .instrument(span),
        );
    }
}

// === impl Inner ===

impl<S: Source> Inner<S> {
    /// Fetches the full key set and caches the requested key.
    async fn refresh(&self, kid: &str, key_use: Option<&PublicKeyUse>) -> Result<Jwk, Error> {
        let jwks = match self.source.get_jwks().await {
            Ok(jwks) => {
                self.metrics.refreshed(true);
                jwks
            }
            Err(error) => {
                self.metrics.refreshed(false);
                return Err(error.into());
            }
        };

        let jwk = jwks
            .keys
            .into_iter()
            .find(|jwk| jwk.common.key_id.as_deref() == Some(kid) && matches_use(jwk, key_use))
            .ok_or_else(|| Error::KeyNotFound {
                kid: kid.to_string(),
                key_use: key_use.map(use_name),
            })?;

        let cached = CachedKey {
            jwk: jwk.clone(),
            refresh_at: Instant::now() + self.refresh,
        };
        self.cache
            .store(kid, Arc::new(cached), Expiration::After(self.ttl));
        tracing::debug!(%kid, "Cached key");
        Ok(jwk)
    }
}

/// Keys that do not declare a use satisfy any requested use.
fn matches_use(jwk: &Jwk, key_use: Option<&PublicKeyUse>) -> bool {
    match (key_use, &jwk.common.public_key_use) {
        (Some(want), Some(have)) => want == have,
        _ => true,
    }
}

fn use_name(key_use: &PublicKeyUse) -> String {
    match key_use {
        PublicKeyUse::Signature => "sig".to_string(),
        PublicKeyUse::Encryption => "enc".to_string(),
        PublicKeyUse::Other(other) => other.clone(),
    }
}
