use super::{ArchiveError, ArchiveStorage, StorageReference};
use crate::crypto::Fingerprint;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory archive with switchable failure and latency, for tests and
/// local runs without a data directory.
#[derive(Default)]
pub struct MemoryArchive {
    objects: Arc<RwLock<HashMap<StorageReference, Vec<u8>>>>,
    unavailable: AtomicBool,
    delay_ms: AtomicU64,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    async fn simulate(&self) -> Result<(), ArchiveError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ArchiveError::Unavailable("memory archive switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveStorage for MemoryArchive {
    async fn archive(&self, bytes: &[u8]) -> Result<StorageReference, ArchiveError> {
        self.simulate().await?;
        let reference = StorageReference::new(format!("memory://{}", Fingerprint::of(bytes)));
        self.objects
            .write()
            .await
            .entry(reference.clone())
            .or_insert_with(|| bytes.to_vec());
        Ok(reference)
    }

    async fn fetch(&self, reference: &StorageReference) -> Result<Vec<u8>, ArchiveError> {
        self.simulate().await?;
        self.objects
            .read()
            .await
            .get(reference)
            .cloned()
            .ok_or_else(|| ArchiveError::NotFound(reference.clone()))
    }
}
