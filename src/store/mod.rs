//! Certificate record store.
//!
//! The store is the only shared mutable state in the registry. Every
//! implementation guarantees:
//!
//! - `put` is insert-if-absent: of any number of concurrent puts for one
//!   fingerprint, at most one succeeds and the rest see
//!   [`StoreError::DuplicateFingerprint`];
//! - `mark_revoked` is a compare-and-set from `Active` to `Revoked`;
//! - records are never removed.

pub mod journal;
pub mod memory;

pub use journal::JournalStore;
pub use memory::MemoryStore;

use crate::crypto::Fingerprint;
use crate::pki::CertificateRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a record for {0} already exists")]
    DuplicateFingerprint(Fingerprint),
    #[error("no record for {0}")]
    NotFound(Fingerprint),
    #[error("store I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("record encoding: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("journal corrupt at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },
}

/// Result of a status compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(CertificateRecord),
    AlreadyRevoked(CertificateRecord),
}

impl Transition {
    pub fn record(&self) -> &CertificateRecord {
        match self {
            Transition::Applied(record) | Transition::AlreadyRevoked(record) => record,
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put(&self, record: CertificateRecord) -> Result<(), StoreError>;

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CertificateRecord>, StoreError>;

    /// All records created by `issuer`, oldest first.
    async fn list_by_issuer(&self, issuer: &str) -> Result<Vec<CertificateRecord>, StoreError>;

    async fn mark_revoked(
        &self,
        fingerprint: &Fingerprint,
        revoked_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Transition, StoreError>;

    /// Snapshot of every record, oldest first.
    async fn records(&self) -> Result<Vec<CertificateRecord>, StoreError>;
}

pub(crate) fn sort_by_issue_time(records: &mut [CertificateRecord]) {
    records.sort_by(|a, b| {
        a.issued_at
            .cmp(&b.issued_at)
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });
}
