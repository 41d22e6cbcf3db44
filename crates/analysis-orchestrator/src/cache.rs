//! Bounded result cache with per-key single-flight.
//!
//! Concurrent callers for the same key share one in-flight computation.
//! Successful values live for the TTL; failures are handed to every waiter
//! and never stored.

use analysis_core::{AnalysisError, AnalysisResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_CAPACITY: usize = 500;
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Internal cache entry with timestamp and recency tick
struct CacheEntry<V> {
    data: V,
    cached_at: Instant,
    last_used: AtomicU64,
}

type InFlight<V> = Shared<BoxFuture<'static, AnalysisResult<V>>>;

struct Inner<V> {
    entries: DashMap<String, CacheEntry<V>>,
    in_flight: DashMap<String, InFlight<V>>,
    capacity: usize,
    ttl: Duration,
    clock: AtomicU64,
}

impl<V> Inner<V> {
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }
}

/// Cheap to clone; clones share storage.
pub struct ResultCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for ResultCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> ResultCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                capacity: capacity.max(1),
                ttl,
                clock: AtomicU64::new(0),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Fresh value for `key`, refreshing its recency. Expired entries are
    /// dropped on sight.
    pub fn get(&self, key: &str) -> Option<V> {
        let ttl = self.inner.ttl;
        let expired = match self.inner.entries.get(key) {
            Some(entry) if entry.cached_at.elapsed() < ttl => {
                entry.last_used.store(self.inner.tick(), Ordering::Relaxed);
                return Some(entry.data.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.inner
                .entries
                .remove_if(key, |_, entry| entry.cached_at.elapsed() >= ttl);
        }
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.inner.entries.insert(
            key.into(),
            CacheEntry {
                data: value,
                cached_at: Instant::now(),
                last_used: AtomicU64::new(self.inner.tick()),
            },
        );
        self.evict();
    }

    /// Cached value, or the result of the one computation running for `key`.
    ///
    /// `factory` is only invoked when neither exists. The computation runs on
    /// its own task, so a caller going away does not strand the other waiters.
    pub async fn compute_and_cache<F, Fut>(&self, key: &str, factory: F) -> AnalysisResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AnalysisResult<V>> + Send + 'static,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let shared = match self.inner.in_flight.entry(key.to_string()) {
            Entry::Occupied(pending) => pending.get().clone(),
            Entry::Vacant(slot) => {
                // a leader may have stored its value between our miss and here
                if let Some(value) = self.get(key) {
                    return Ok(value);
                }

                let work = factory();
                let cache = self.clone();
                let owned_key = key.to_string();
                let task = tokio::spawn(async move {
                    let result = work.await;
                    if let Ok(value) = &result {
                        cache.insert(owned_key.clone(), value.clone());
                    }
                    cache.inner.in_flight.remove(&owned_key);
                    result
                });

                let label = key.to_string();
                let shared = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(AnalysisError::CacheError(format!(
                            "computation for {} aborted: {}",
                            label, e
                        )))
                    })
                }
                .boxed()
                .shared();

                slot.insert(shared.clone());
                shared
            }
        };

        shared.await
    }

    /// Expired entries go first, then least recently used until within capacity.
    fn evict(&self) {
        let entries = &self.inner.entries;
        if entries.len() <= self.inner.capacity {
            return;
        }

        let ttl = self.inner.ttl;
        entries.retain(|_, entry| entry.cached_at.elapsed() < ttl);

        while entries.len() > self.inner.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|entry| entry.last_used.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    tracing::debug!(key = %key, "cache.evict");
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
