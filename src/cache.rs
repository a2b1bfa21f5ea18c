use std::hash::Hash;
use std::time::Duration;

use moka::future::Cache;

/// Time-boxed cache with explicit get/set/expire.
///
/// Entries disappear `ttl` after insertion. Used for price-feed responses so
/// repeated backfills inside the TTL do not hit the third-party API again.
#[derive(Clone)]
pub struct TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Cache<K, V>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { inner }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).await
    }

    pub async fn set(&self, key: K, value: V) {
        self.inner.insert(key, value).await;
    }

    /// Drop an entry before its TTL elapses.
    pub async fn expire(&self, key: &K) {
        self.inner.invalidate(key).await;
    }
}
