//! In-process key/value cache with per-entry expiry.
//!
//! Expired entries are removed lazily when read and eagerly by a periodic
//! sweep, so keys that are written but never read again do not accumulate.
//! A single `RwLock` guards the map: writers, lazy removals and sweeps are
//! mutually exclusive while plain hits may proceed concurrently.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contest_core::config::ttl_from_secs;
use contest_core::ContestResult;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(self.inserted_at) > ttl,
            None => false,
        }
    }
}

/// Generic expiring cache shared across requests.
pub struct TtlCache<K, V> {
    name: &'static str,
    store: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// `name` labels log lines and metrics.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            store: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Insert or overwrite. `ttl = None` never expires.
    pub fn put(&self, key: K, value: V, ttl: Option<Duration>) {
        self.store.write().insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Like [`put`](Self::put) with a TTL in seconds as read from
    /// configuration. Negative or non-finite values are rejected.
    pub fn put_secs(&self, key: K, value: V, ttl_secs: Option<f64>) -> ContestResult<()> {
        let ttl = ttl_secs.map(ttl_from_secs).transpose()?;
        self.put(key, value, ttl);
        Ok(())
    }

    /// Returns the value unless it is missing or expired. An expired entry
    /// is removed before returning.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = Instant::now();
        {
            let store = self.store.read();
            match store.get(key) {
                None => {
                    metrics::counter!("cache.miss", "cache" => self.name).increment(1);
                    return None;
                }
                Some(entry) if !entry.is_expired(now) => {
                    metrics::counter!("cache.hit", "cache" => self.name).increment(1);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // Re-check under the write lock: the key may have been refreshed
        // between releasing the read guard and acquiring this one.
        let mut store = self.store.write();
        let now = Instant::now();
        let live = store
            .get(key)
            .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));
        match live {
            Some(Some(value)) => {
                metrics::counter!("cache.hit", "cache" => self.name).increment(1);
                Some(value)
            }
            Some(None) => {
                store.remove(key);
                metrics::counter!("cache.expired", "cache" => self.name).increment(1);
                None
            }
            None => {
                metrics::counter!("cache.miss", "cache" => self.name).increment(1);
                None
            }
        }
    }

    /// Remove the key. Missing keys are ignored.
    pub fn expire<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.store.write().remove(key);
    }

    /// Drop every entry whose TTL has elapsed. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.write();
        let before = store.len();
        store.retain(|_, entry| !entry.is_expired(now));
        before - store.len()
    }

    /// Number of stored entries, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Sweep on a fixed period until the cache is dropped. A pass that panics
    /// is logged and the timer keeps running; this only holds when panics
    /// unwind, since the release profile sets `panic = "abort"` and a
    /// panicking pass ends the process there.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        let name = self.name;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(cache) = cache.upgrade() else {
                    debug!(cache = name, "Cache dropped, sweeper exiting");
                    break;
                };
                match std::panic::catch_unwind(AssertUnwindSafe(|| cache.sweep())) {
                    Ok(0) => {}
                    Ok(evicted) => {
                        metrics::counter!("cache.swept", "cache" => name).increment(evicted as u64);
                        debug!(cache = name, evicted = evicted, "Cache sweep complete");
                    }
                    Err(_) => error!(cache = name, "Cache sweep pass panicked"),
                }
            }
        })
    }
}
