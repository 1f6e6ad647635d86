use super::{RecordStore, StoreError, Transition, sort_by_issue_time};
use crate::crypto::Fingerprint;
use crate::pki::CertificateRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Volatile store. Same guarantees as [`super::JournalStore`] minus
/// durability.
#[derive(Default, Clone)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<Fingerprint, CertificateRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn put(&self, record: CertificateRecord) -> Result<(), StoreError> {
        match self.records.write().await.entry(record.fingerprint) {
            Entry::Occupied(_) => Err(StoreError::DuplicateFingerprint(record.fingerprint)),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CertificateRecord>, StoreError> {
        Ok(self.records.read().await.get(fingerprint).cloned())
    }

    async fn list_by_issuer(&self, issuer: &str) -> Result<Vec<CertificateRecord>, StoreError> {
        let mut found: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.issuer == issuer)
            .cloned()
            .collect();
        sort_by_issue_time(&mut found);
        Ok(found)
    }

    async fn mark_revoked(
        &self,
        fingerprint: &Fingerprint,
        revoked_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Transition, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(fingerprint)
            .ok_or(StoreError::NotFound(*fingerprint))?;
        if record.revoke(revoked_by, at) {
            Ok(Transition::Applied(record.clone()))
        } else {
            Ok(Transition::AlreadyRevoked(record.clone()))
        }
    }

    async fn records(&self) -> Result<Vec<CertificateRecord>, StoreError> {
        let mut all: Vec<_> = self.records.read().await.values().cloned().collect();
        sort_by_issue_time(&mut all);
        Ok(all)
    }
}
