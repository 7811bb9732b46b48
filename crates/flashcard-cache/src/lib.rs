//! Content-addressed two-tier cache.
//!
//! Entries are keyed by a caller-supplied fingerprint. A hot L1 tier keeps a
//! bounded number of entries (and, optionally, bytes) in memory; an optional
//! L2 tier persists entries to disk so a restarted process can resume
//! without recomputing already-fingerprinted work. Concurrent callers asking
//! for the same fingerprint share a single computation.
//!
//! # Examples
//!
//! ```
//! use flashcard_cache::{Cache, CacheConfig};
//!
//! # async fn example() -> Result<(), flashcard_cache::CacheError<String>> {
//! let cache: Cache<String, String, String> = Cache::new(CacheConfig::builder().build());
//!
//! let value = cache
//!     .get_or_compute("fingerprint-1".to_string(), || async { Ok("computed".to_string()) })
//!     .await?;
//! assert_eq!(value, "computed");
//! # Ok(())
//! # }
//! ```

mod coalesce;
mod config;
mod error;
mod eviction;
mod events;
mod l2;
mod store;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use error::CacheError;
pub use events::CacheEvent;

use coalesce::{InFlight, Role};
#[cfg(any(feature = "tracing", feature = "metrics"))]
use flashcard_core::events::ResilienceEvent;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use store::L1Store;

/// A content-addressed two-tier cache keyed by fingerprint `K`, storing
/// values `V`, and propagating `compute` errors of type `E`.
pub struct Cache<K, V, E> {
    config: Arc<CacheConfig>,
    l1: Mutex<L1Store<K, V>>,
    l2: Option<l2::L2Store>,
    in_flight: InFlight<K, V, E>,
}

/// Releases an in-flight reservation if dropped before `complete` is called,
/// e.g. because the leading task panicked or was cancelled.
struct LeaderGuard<'a, K: Hash + Eq, V: Clone, E: Clone> {
    in_flight: &'a InFlight<K, V, E>,
    key: K,
}

impl<K: Hash + Eq, V: Clone, E: Clone> Drop for LeaderGuard<'_, K, V, E> {
    fn drop(&mut self) {
        self.in_flight.cancel(&self.key);
    }
}

impl<K, V, E> Cache<K, V, E>
where
    K: Hash + Eq + Clone + ToString + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        let l2 = config.l2_dir.clone().map(l2::L2Store::new);
        Self {
            l1: Mutex::new(L1Store::new(config.l1_capacity, config.l1_max_bytes)),
            l2,
            in_flight: InFlight::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the cached value for `key`, computing it at most once across
    /// any number of concurrent callers.
    ///
    /// On a miss, `compute` runs, its result is written through to L1 (and
    /// L2, if configured), and the in-flight reservation is released only
    /// after the write completes.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> Result<V, CacheError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.l1_get(&key) {
            self.emit(CacheEvent::Hit {
                pattern_name: self.config.name.clone(),
                timestamp: Instant::now(),
                tier: "l1",
            });
            return Ok(value);
        }

        if let Some(value) = self.l2_get(&key).await? {
            self.l1_insert(key, value.clone());
            self.emit(CacheEvent::Hit {
                pattern_name: self.config.name.clone(),
                timestamp: Instant::now(),
                tier: "l2",
            });
            return Ok(value);
        }

        match self.in_flight.join_or_lead(key.clone()) {
            Role::Waiter(mut rx) => {
                self.emit(CacheEvent::Coalesced {
                    pattern_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                });
                match rx.recv().await {
                    Ok(result) => result.map_err(CacheError::Compute),
                    Err(_) => Err(CacheError::Lost),
                }
            }
            Role::Leader => {
                self.emit(CacheEvent::Miss {
                    pattern_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                });
                let guard = LeaderGuard {
                    in_flight: &self.in_flight,
                    key: key.clone(),
                };
                let result = compute().await;
                if let Ok(value) = &result {
                    if let Err(e) = self.l2_put(&key, value).await {
                        self.in_flight.complete(&key, result.clone());
                        return Err(CacheError::Io(e));
                    }
                    self.l1_insert(key.clone(), value.clone());
                }
                self.in_flight.complete(&key, result.clone());
                drop(guard);
                result.map_err(CacheError::Compute)
            }
        }
    }

    /// Removes `key` from both tiers. Any in-flight computation for `key` is
    /// left to complete and store normally; invalidation is advisory for
    /// work already underway.
    pub async fn invalidate(&self, key: &K) {
        self.l1.lock().unwrap().remove(key);
        if let Some(l2) = &self.l2 {
            let _ = l2.remove(&key.to_string()).await;
        }
    }

    fn l1_get(&self, key: &K) -> Option<V> {
        self.l1.lock().unwrap().get(key).cloned()
    }

    fn l1_insert(&self, key: K, value: V) {
        let size_bytes = serde_json::to_vec(&value).map(|b| b.len()).unwrap_or(0);
        let evicted = self.l1.lock().unwrap().insert(key, value, size_bytes);
        if evicted {
            self.emit(CacheEvent::Eviction {
                pattern_name: self.config.name.clone(),
                timestamp: Instant::now(),
            });
        }
    }

    async fn l2_get(&self, key: &K) -> Result<Option<V>, CacheError<E>> {
        match &self.l2 {
            Some(l2) => l2.get(&key.to_string()).await.map_err(CacheError::Io),
            None => Ok(None),
        }
    }

    async fn l2_put(&self, key: &K, value: &V) -> std::io::Result<()> {
        match &self.l2 {
            Some(l2) => l2.put(&key.to_string(), value).await,
            None => Ok(()),
        }
    }

    fn emit(&self, event: CacheEvent) {
        self.config.event_listeners.emit(&event);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            pattern = event.pattern_name(),
            event = event.event_type(),
            "cache event"
        );
        #[cfg(feature = "metrics")]
        metrics::counter!("flashcard_cache_events_total", "event" => event.event_type().to_string())
            .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    fn cache() -> Cache<String, String, String> {
        Cache::new(CacheConfig::builder().build())
    }

    #[tokio::test]
    async fn computes_on_miss_and_hits_thereafter() {
        let cache = cache();
        let calls = StdArc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let value = cache
            .get_or_compute("fp1".to_string(), || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("v1".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "v1");

        let c = calls.clone();
        let value = cache
            .get_or_compute("fp1".to_string(), || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("recomputed".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_coalesce_into_one_computation() {
        let cache = StdArc::new(cache());
        let calls = StdArc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("shared".to_string(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok::<_, String>("result".to_string())
                    })
                    .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "result");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn compute_error_propagates_to_every_waiter() {
        let cache = StdArc::new(cache());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("boom".to_string(), || async move {
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Err::<String, _>("compute failed".to_string())
                    })
                    .await
            }));
        }

        for h in handles {
            match h.await.unwrap() {
                Err(CacheError::Compute(msg)) => assert_eq!(msg, "compute failed"),
                other => panic!("expected compute error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn invalidate_removes_from_l1() {
        let cache = cache();
        cache
            .get_or_compute("fp".to_string(), || async { Ok::<_, String>("v".to_string()) })
            .await
            .unwrap();
        cache.invalidate(&"fp".to_string()).await;

        let calls = StdArc::new(AtomicUsize::new(0));
        let c = calls.clone();
        cache
            .get_or_compute("fp".to_string(), || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("v2".to_string())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn l2_hit_promotes_to_l1() {
        let dir = tempfile::tempdir().unwrap();
        let cache: Cache<String, String, String> =
            Cache::new(CacheConfig::builder().l2_dir(dir.path()).build());

        cache
            .get_or_compute("fp".to_string(), || async { Ok::<_, String>("v".to_string()) })
            .await
            .unwrap();

        let cache2: Cache<String, String, String> =
            Cache::new(CacheConfig::builder().l2_dir(dir.path()).build());
        let calls = StdArc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let value = cache2
            .get_or_compute("fp".to_string(), || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("recomputed".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "v");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
