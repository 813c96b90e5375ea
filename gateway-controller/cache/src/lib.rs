//! An in-memory key/value cache with per-entry expiration.
//!
//! Entries expire lazily: a lookup never returns an entry whose deadline has passed, but the
//! entry stays in the map until it is swept, either by an explicit call to
//! [`Cache::delete_expired`] or by a [`Sweeper`] task spawned with [`Cache::spawn_sweeper`].
//! The sweeper's lifetime is owned by the caller; dropping the handle stops the task.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod sweep;

#[cfg(test)]
mod tests;

pub use self::sweep::Sweeper;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tokio::time::{Duration, Instant};

/// Determines when a stored entry expires.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Expiration {
    /// Use the cache's default expiration.
    #[default]
    Default,

    /// The entry is never expired.
    Never,

    /// The entry expires once the given duration has elapsed. A zero duration is treated as
    /// [`Expiration::Default`].
    After(Duration),
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("item {0} already exists")]
    AlreadyExists(String),
}

/// Invoked with each entry removed by a sweep.
pub type OnEvicted<V> = Arc<dyn Fn(String, V) + Send + Sync + 'static>;

/// A cache of `V` values keyed by string.
///
/// Clones share the same underlying map.
pub struct Cache<V> {
    inner: Arc<Inner<V>>,
}

struct Inner<V> {
    /// `None` when entries stored with [`Expiration::Default`] never expire.
    default_ttl: Option<Duration>,
    state: RwLock<State<V>>,
}

struct State<V> {
    items: HashMap<String, Item<V>>,
    on_evicted: Option<OnEvicted<V>>,
}

#[derive(Debug)]
struct Item<V> {
    value: V,
    expires_at: Option<Instant>,
}

// === impl Cache ===

impl<V> Cache<V> {
    /// Creates an empty cache. Entries stored with [`Expiration::Default`] expire after
    /// `default_ttl`, or never when it is zero.
    pub fn new(default_ttl: Duration) -> Self {
        let default_ttl = Some(default_ttl).filter(|ttl| !ttl.is_zero());
        Self {
            inner: Arc::new(Inner {
                default_ttl,
                state: RwLock::new(State {
                    items: HashMap::new(),
                    on_evicted: None,
                }),
            }),
        }
    }

    /// Stores `value` under `key`, replacing any existing entry.
    ///
    /// Replaced entries are not reported to the eviction callback.
    pub fn store(&self, key: impl Into<String>, value: V, expiration: Expiration) {
        let expires_at = self.inner.expires_at(expiration, Instant::now());
        self.inner
            .state
            .write()
            .items
            .insert(key.into(), Item { value, expires_at });
    }

    /// Stores `value` under `key` only if the key is absent or its entry has expired.
    pub fn add(
        &self,
        key: impl Into<String>,
        value: V,
        expiration: Expiration,
    ) -> Result<(), Error> {
        let key = key.into();
        let now = Instant::now();
        let expires_at = self.inner.expires_at(expiration, now);

        let mut state = self.inner.state.write();
        if let Some(item) = state.items.get(&key) {
            if !item.is_expired(now) {
                return Err(Error::AlreadyExists(key));
            }
        }
        state.items.insert(key, Item { value, expires_at });
        Ok(())
    }

    /// Registers the callback invoked for every entry removed by a sweep.
    pub fn on_evicted(&self, f: impl Fn(String, V) + Send + Sync + 'static) {
        self.inner.state.write().on_evicted = Some(Arc::new(f));
    }

    /// Removes all expired entries, returning the number removed.
    ///
    /// The eviction callback runs after the cache lock is released, so it may use the cache.
    pub fn delete_expired(&self) -> usize {
        self.inner.delete_expired()
    }

    /// Returns the number of entries held, including expired entries that have not yet been
    /// swept.
    pub fn len(&self) -> usize {
        self.inner.state.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Cache<V> {
    /// Returns a clone of the live value stored under `key`.
    ///
    /// Expired entries are reported as missing but are left in place for the sweeper.
    pub fn get(&self, key: &str) -> Option<V> {
        let state = self.inner.state.read();
        let item = state.items.get(key)?;
        if item.is_expired(Instant::now()) {
            return None;
        }
        Some(item.value.clone())
    }
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> std::fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("default_ttl", &self.inner.default_ttl)
            .field("len", &self.len())
            .finish()
    }
}

// === impl Inner ===

impl<V> Inner<V> {
    fn expires_at(&self, expiration: Expiration, now: Instant) -> Option<Instant> {
        let ttl = match expiration {
            Expiration::Never => None,
            Expiration::After(ttl) if !ttl.is_zero() => Some(ttl),
            Expiration::After(_) | Expiration::Default => self.default_ttl,
        };
        ttl.map(|ttl| now + ttl)
    }

    fn delete_expired(&self) -> usize {
        let now = Instant::now();
        let (evicted, on_evicted) = {
            let mut state = self.state.write();
            let expired = state
                .items
                .iter()
                .filter(|(_, item)| item.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect::<Vec<_>>();
            let evicted = expired
                .into_iter()
                .filter_map(|key| state.items.remove(&key).map(|item| (key, item.value)))
                .collect::<Vec<_>>();
            (evicted, state.on_evicted.clone())
        };

        let count = evicted.len();
        if let Some(on_evicted) = on_evicted {
            for (key, value) in evicted {
                on_evicted(key, value);
            }
        }
        count
    }
}

// === impl Item ===

impl<V> Item<V> {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }
}
