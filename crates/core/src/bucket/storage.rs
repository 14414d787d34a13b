//! Keyed bucket storage
//!
//! One storage per classification (login, password, ip). Keys are compared
//! by their raw string value; no normalization happens here.

use super::SharedBucket;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Key → bucket map capability
///
/// Absent keys are not errors: `get` returns `None`, `delete` is a no-op.
#[async_trait]
pub trait BucketStorage: Send + Sync {
    /// Insert or overwrite the bucket for `key`
    async fn add(&self, key: &str, bucket: SharedBucket) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<SharedBucket>>;

    /// Fetch the bucket for `key`, creating it with `make` on a miss
    ///
    /// Concurrent callers racing on the same new key all receive the same
    /// bucket; `make` runs at most once per winning insert.
    async fn get_or_insert_with(
        &self,
        key: &str,
        make: &(dyn Fn() -> Result<SharedBucket> + Send + Sync),
    ) -> Result<SharedBucket>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every bucket whose key satisfies `matches`, returning how many
    async fn delete_matching(
        &self,
        matches: &(dyn for<'k> Fn(&'k str) -> bool + Send + Sync),
    ) -> Result<usize>;

    async fn has(&self, key: &str) -> Result<bool>;

    async fn count(&self) -> Result<usize>;

    /// Evict buckets that report `is_active(now) == false`, returning how many
    async fn clear_not_active(&self, now: Instant) -> Result<usize>;
}

/// In-memory bucket storage
///
/// A single `RwLock` guards the map. Sweeps hold the write lock for the
/// whole scan, which pauses concurrent lookups on this storage for a time
/// proportional to its size.
#[derive(Clone, Default)]
pub struct MemoryBucketStorage {
    buckets: Arc<RwLock<HashMap<String, SharedBucket>>>,
}

impl MemoryBucketStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BucketStorage for MemoryBucketStorage {
    async fn add(&self, key: &str, bucket: SharedBucket) -> Result<()> {
        self.buckets.write().await.insert(key.to_string(), bucket);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SharedBucket>> {
        Ok(self.buckets.read().await.get(key).cloned())
    }

    async fn get_or_insert_with(
        &self,
        key: &str,
        make: &(dyn Fn() -> Result<SharedBucket> + Send + Sync),
    ) -> Result<SharedBucket> {
        if let Some(bucket) = self.buckets.read().await.get(key) {
            return Ok(Arc::clone(bucket));
        }

        let mut buckets = self.buckets.write().await;
        // Another task may have inserted between the two locks
        if let Some(bucket) = buckets.get(key) {
            return Ok(Arc::clone(bucket));
        }

        let bucket = make()?;
        buckets.insert(key.to_string(), Arc::clone(&bucket));
        tracing::trace!(key, "Created bucket");
        Ok(bucket)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.buckets.write().await.remove(key);
        Ok(())
    }

    async fn delete_matching(
        &self,
        matches: &(dyn for<'k> Fn(&'k str) -> bool + Send + Sync),
    ) -> Result<usize> {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|key, _| !matches(key));
        Ok(before - buckets.len())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.buckets.read().await.contains_key(key))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.buckets.read().await.len())
    }

    async fn clear_not_active(&self, now: Instant) -> Result<usize> {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| bucket.is_active(now));
        Ok(before - buckets.len())
    }
}
