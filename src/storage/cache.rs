use super::{ArchiveError, ArchiveStorage, StorageReference};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Read-through LRU cache in front of another archive. Archived objects are
/// immutable and content-addressed, so cached entries never go stale.
pub struct CachedArchive<A> {
    inner: A,
    cache: Arc<RwLock<LruCache<StorageReference, Arc<Vec<u8>>>>>,
    cache_hits: Arc<AtomicU64>,
    cache_misses: Arc<AtomicU64>,
}

impl<A: ArchiveStorage> CachedArchive<A> {
    pub fn new(inner: A, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Arc::new(RwLock::new(LruCache::new(capacity))),
            cache_hits: Arc::new(AtomicU64::new(0)),
            cache_misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Percentage of fetches served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            return 0.0;
        }

        (hits as f64 / total as f64) * 100.0
    }
}

#[async_trait]
impl<A: ArchiveStorage> ArchiveStorage for CachedArchive<A> {
    async fn archive(&self, bytes: &[u8]) -> Result<StorageReference, ArchiveError> {
        self.inner.archive(bytes).await
    }

    async fn fetch(&self, reference: &StorageReference) -> Result<Vec<u8>, ArchiveError> {
        {
            let mut cache = self.cache.write().await;
            if let Some(bytes) = cache.get(reference) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(bytes.as_ref().clone());
            }
        }

        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        let bytes = self.inner.fetch(reference).await?;

        self.cache
            .write()
            .await
            .put(reference.clone(), Arc::new(bytes.clone()));
        Ok(bytes)
    }
}
