//! Two-tier schema cache with in-flight deduplication.
//!
//! Values live in a process-local map backed by a [`KeyValueStore`]. A miss
//! on both tiers starts at most one computation per key: concurrent callers
//! await the same shared future. The computation is spawned, so it completes
//! and populates the cache even if every caller stops waiting.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};
use crate::kv::KeyValueStore;

/// Namespace for cache keys in the key-value store.
pub const KEY_NAMESPACE: &str = "collection:schema";

/// Full key-value store key for a collection.
#[must_use]
pub fn cache_key(collection_key: &str) -> String {
    format!("{KEY_NAMESPACE}:{collection_key}")
}

type InFlight<V> = Shared<BoxFuture<'static, Result<V>>>;

struct Inner<V> {
    memory: RwLock<HashMap<String, V>>,
    kv: Arc<dyn KeyValueStore>,
    in_flight: Mutex<HashMap<String, InFlight<V>>>,
    /// Bumped on every invalidation; computations started before it are
    /// not written back.
    generation: AtomicU64,
}

impl<V> Inner<V> {
    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlight<V>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes the in-flight entry when the computation ends, however it ends.
struct InFlightGuard<V> {
    inner: Arc<Inner<V>>,
    key: String,
}

impl<V> Drop for InFlightGuard<V> {
    fn drop(&mut self) {
        self.inner.in_flight().remove(&self.key);
    }
}

/// Schema cache keyed by collection key.
pub struct SchemaCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for SchemaCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> SchemaCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates a cache over the given key-value store.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                memory: RwLock::new(HashMap::new()),
                kv,
                in_flight: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    fn memory_get(&self, key: &str) -> Option<V> {
        self.inner
            .memory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn memory_set(inner: &Inner<V>, key: &str, value: V) {
        inner
            .memory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    /// Looks a value up in memory, then in the key-value store.
    ///
    /// Store failures and undecodable entries are logged and treated as a
    /// miss.
    pub async fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.memory_get(key) {
            return Some(value);
        }

        let raw = match self.inner.kv.get(&cache_key(key)).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(collection = %key, error = %e, "Cache store read failed");
                return None;
            }
        };
        match serde_json::from_str::<V>(&raw) {
            Ok(value) => {
                Self::memory_set(&self.inner, key, value.clone());
                Some(value)
            }
            Err(e) => {
                warn!(collection = %key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Stores a value in both tiers.
    pub async fn set(&self, key: &str, value: V) {
        Self::write_through(&self.inner, key, value).await;
    }

    async fn write_through(inner: &Inner<V>, key: &str, value: V) {
        let encoded = serde_json::to_string(&value);
        Self::memory_set(inner, key, value);
        match encoded {
            Ok(encoded) => {
                if let Err(e) = inner.kv.set(&cache_key(key), &encoded).await {
                    warn!(collection = %key, error = %e, "Cache store write failed");
                }
            }
            Err(e) => warn!(collection = %key, error = %e, "Failed to encode cache entry"),
        }
    }

    /// Returns the cached value or computes it.
    ///
    /// Concurrent calls for the same key share one computation. Its error,
    /// if any, is returned to every caller and nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns the computation's error, or [`MigrateError::Task`] if it
    /// panicked.
    pub async fn resolve<F, Fut>(&self, key: &str, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let shared = {
            let mut in_flight = self.inner.in_flight();
            if let Some(existing) = in_flight.get(key) {
                debug!(collection = %key, "Joining in-flight schema resolution");
                existing.clone()
            } else if let Some(value) = self.memory_get(key) {
                // Finished between the tier check and taking the lock.
                return Ok(value);
            } else {
                let shared = self.spawn(key, compute());
                in_flight.insert(key.to_string(), shared.clone());
                shared
            }
        };

        shared.await
    }

    fn spawn<Fut>(&self, key: &str, computation: Fut) -> InFlight<V>
    where
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        let generation = inner.generation.load(Ordering::SeqCst);
        debug!(collection = %key, "Resolving schema");

        let handle = tokio::spawn(async move {
            let _guard = InFlightGuard {
                inner: Arc::clone(&inner),
                key: key.clone(),
            };
            let value = computation.await?;
            if inner.generation.load(Ordering::SeqCst) == generation {
                Self::write_through(&inner, &key, value.clone()).await;
            } else {
                debug!(collection = %key, "Cache invalidated during resolution; not storing");
            }
            Ok::<V, MigrateError>(value)
        });

        async move {
            handle
                .await
                .map_err(|e| MigrateError::Task(e.to_string()))?
        }
        .boxed()
        .shared()
    }

    /// Removes one key from both tiers.
    pub async fn invalidate(&self, key: &str) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner
            .memory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if let Err(e) = self.inner.kv.delete(&cache_key(key)).await {
            warn!(collection = %key, error = %e, "Cache store delete failed");
        }
    }

    /// Removes every key from both tiers.
    pub async fn clear(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner
            .memory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        if let Err(e) = self.inner.kv.clear(&format!("{KEY_NAMESPACE}:")).await {
            warn!(error = %e, "Cache store clear failed");
        }
    }

    /// Number of computations currently running.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::future::join_all;

    use super::*;
    use crate::kv::MemoryKvStore;

    struct FailingKv;

    #[async_trait]
    impl KeyValueStore for FailingKv {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(MigrateError::Task("store unavailable".into()))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(MigrateError::Task("store unavailable".into()))
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Err(MigrateError::Task("store unavailable".into()))
        }

        async fn clear(&self, _prefix: &str) -> Result<()> {
            Err(MigrateError::Task("store unavailable".into()))
        }
    }

    fn counting_compute(
        calls: &Arc<AtomicUsize>,
        value: &str,
    ) -> impl Future<Output = Result<String>> + Send + 'static {
        let calls = Arc::clone(calls);
        let value = value.to_string();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(value)
        }
    }

    async fn explode() -> Result<String> {
        panic!("boom")
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("page"), "collection:schema:page");
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_share_one_computation() {
        let cache: SchemaCache<String> = SchemaCache::new(Arc::new(MemoryKvStore::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        let results = join_all(
            (0..8).map(|_| cache.resolve("page", || counting_compute(&calls, "schema"))),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| matches!(r.as_deref(), Ok("schema"))));
        assert_eq!(cache.in_flight_count(), 0);

        // Subsequent calls are served from memory.
        cache
            .resolve("page", || counting_compute(&calls, "other"))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_compute_separately() {
        let cache: SchemaCache<String> = SchemaCache::new(Arc::new(MemoryKvStore::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.resolve("page", || counting_compute(&calls, "a")),
            cache.resolve("post", || counting_compute(&calls, "b")),
        );
        assert_eq!(a.unwrap(), "a");
        assert_eq!(b.unwrap(), "b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_reach_every_waiter_and_are_not_cached() {
        let cache: SchemaCache<String> = SchemaCache::new(Arc::new(MemoryKvStore::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<String, _>(MigrateError::MigrationRequired {
                    collection: "page".into(),
                })
            }
        };

        let (a, b) = tokio::join!(cache.resolve("page", failing), cache.resolve("page", failing));
        assert!(matches!(a, Err(MigrateError::MigrationRequired { .. })));
        assert!(matches!(b, Err(MigrateError::MigrationRequired { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight_count(), 0);
        assert!(cache.get("page").await.is_none());
    }

    #[tokio::test]
    async fn test_panicking_computation_is_cleaned_up() {
        let cache: SchemaCache<String> = SchemaCache::new(Arc::new(MemoryKvStore::new()));

        let result = cache.resolve("page", explode).await;
        assert!(matches!(result, Err(MigrateError::Task(_))));
        assert_eq!(cache.in_flight_count(), 0);

        let value = cache
            .resolve("page", || async { Ok("recovered".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "recovered");
    }

    #[tokio::test]
    async fn test_store_hit_populates_memory() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(&cache_key("page"), "\"from store\"").await.unwrap();
        let cache: SchemaCache<String> = SchemaCache::new(kv.clone());

        assert_eq!(cache.get("page").await.as_deref(), Some("from store"));

        kv.delete(&cache_key("page")).await.unwrap();
        assert_eq!(cache.get("page").await.as_deref(), Some("from store"));
    }

    #[tokio::test]
    async fn test_resolution_writes_both_tiers() {
        let kv = Arc::new(MemoryKvStore::new());
        let cache: SchemaCache<String> = SchemaCache::new(kv.clone());

        cache
            .resolve("page", || async { Ok("fresh".to_string()) })
            .await
            .unwrap();
        assert_eq!(
            kv.get(&cache_key("page")).await.unwrap().as_deref(),
            Some("\"fresh\"")
        );
    }

    #[tokio::test]
    async fn test_failing_store_never_fails_requests() {
        let cache: SchemaCache<String> = SchemaCache::new(Arc::new(FailingKv));

        let value = cache
            .resolve("page", || async { Ok("schema".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "schema");
        assert_eq!(cache.get("page").await.as_deref(), Some("schema"));

        cache.invalidate("page").await;
        assert!(cache.get("page").await.is_none());
    }

    #[tokio::test]
    async fn test_abandoned_computation_still_populates_cache() {
        let cache: SchemaCache<String> = SchemaCache::new(Arc::new(MemoryKvStore::new()));

        let slow = cache.resolve("page", || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok("late".to_string())
        });
        assert!(tokio::time::timeout(Duration::from_millis(5), slow).await.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get("page").await.as_deref(), Some("late"));
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_invalidation_during_computation_discards_result() {
        let cache: SchemaCache<String> = SchemaCache::new(Arc::new(MemoryKvStore::new()));

        let resolving = cache.resolve("page", || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok("stale".to_string())
        });
        let (value, ()) = tokio::join!(resolving, async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cache.clear().await;
        });

        assert_eq!(value.unwrap(), "stale");
        assert!(cache.get("page").await.is_none());
    }
}
