//! Durable record store backed by an append-only journal file.
//!
//! Each mutation is one frame: a little-endian `u32` payload length followed
//! by the bincode-encoded [`JournalEntry`]. A frame is synced to disk before
//! the in-memory index changes, so readers only ever observe committed
//! state. Reopening replays the journal; a torn final frame (crash during
//! append) is cut off, anything else undecodable is corruption.

use super::{RecordStore, StoreError, Transition, sort_by_issue_time};
use crate::crypto::Fingerprint;
use crate::pki::CertificateRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

const FRAME_HEADER: usize = 4;
const MAX_FRAME: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum JournalEntry {
    Issued(CertificateRecord),
    Revoked {
        fingerprint: Fingerprint,
        revoked_by: String,
        revoked_at: DateTime<Utc>,
    },
}

struct JournalWriter {
    file: File,
    len: u64,
}

pub struct JournalStore {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    records: RwLock<HashMap<Fingerprint, CertificateRecord>>,
}

impl JournalStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let existing = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let (records, valid_len) = replay(&existing)?;

        if valid_len < existing.len() as u64 {
            warn!(
                "journal {}: discarding {} bytes of torn trailing frame",
                path.display(),
                existing.len() as u64 - valid_len
            );
            let file = OpenOptions::new().write(true).open(&path).await?;
            file.set_len(valid_len).await?;
            file.sync_all().await?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        info!(
            "journal {} opened with {} records",
            path.display(),
            records.len()
        );

        Ok(Self {
            path,
            writer: Mutex::new(JournalWriter { file, len: valid_len }),
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    async fn append(writer: &mut JournalWriter, entry: &JournalEntry) -> Result<(), StoreError> {
        let payload = bincode::serialize(entry)?;
        let mut frame = Vec::with_capacity(FRAME_HEADER + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);

        let written = async {
            writer.file.write_all(&frame).await?;
            writer.file.sync_data().await
        }
        .await;

        if let Err(e) = written {
            // drop whatever part of the frame made it out
            if let Err(rollback) = writer.file.set_len(writer.len).await {
                warn!("journal rollback to {} failed: {}", writer.len, rollback);
            }
            return Err(e.into());
        }
        writer.len += frame.len() as u64;
        Ok(())
    }
}

fn replay(bytes: &[u8]) -> Result<(HashMap<Fingerprint, CertificateRecord>, u64), StoreError> {
    let mut records = HashMap::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let remaining = bytes.len() - offset;
        if remaining < FRAME_HEADER {
            break;
        }
        let mut header = [0u8; FRAME_HEADER];
        header.copy_from_slice(&bytes[offset..offset + FRAME_HEADER]);
        let len = u32::from_le_bytes(header) as usize;
        if len > MAX_FRAME {
            return Err(StoreError::Corrupt {
                offset: offset as u64,
                reason: format!("frame length {len} exceeds limit"),
            });
        }
        if remaining - FRAME_HEADER < len {
            break;
        }

        let payload = &bytes[offset + FRAME_HEADER..offset + FRAME_HEADER + len];
        let entry: JournalEntry =
            bincode::deserialize(payload).map_err(|e| StoreError::Corrupt {
                offset: offset as u64,
                reason: e.to_string(),
            })?;
        apply(&mut records, entry).map_err(|reason| StoreError::Corrupt {
            offset: offset as u64,
            reason,
        })?;

        offset += FRAME_HEADER + len;
    }

    debug!("replayed {} journal bytes", offset);
    Ok((records, offset as u64))
}

fn apply(
    records: &mut HashMap<Fingerprint, CertificateRecord>,
    entry: JournalEntry,
) -> Result<(), String> {
    match entry {
        JournalEntry::Issued(record) => {
            if records.contains_key(&record.fingerprint) {
                return Err(format!("second issuance of {}", record.fingerprint));
            }
            records.insert(record.fingerprint, record);
        }
        JournalEntry::Revoked {
            fingerprint,
            revoked_by,
            revoked_at,
        } => {
            let record = records
                .get_mut(&fingerprint)
                .ok_or_else(|| format!("revocation of unknown {fingerprint}"))?;
            if !record.revoke(&revoked_by, revoked_at) {
                warn!("journal revokes {} twice; keeping first revocation", fingerprint);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl RecordStore for JournalStore {
    async fn put(&self, record: CertificateRecord) -> Result<(), StoreError> {
        let mut writer = self.writer.lock().await;
        if self.records.read().await.contains_key(&record.fingerprint) {
            return Err(StoreError::DuplicateFingerprint(record.fingerprint));
        }

        Self::append(&mut writer, &JournalEntry::Issued(record.clone())).await?;
        self.records.write().await.insert(record.fingerprint, record);
        Ok(())
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
        let mut writer = self.writer.lock().await;
        let current = self
            .records
            .read()
            .await
            .get(fingerprint)
            .cloned()
            .ok_or(StoreError::NotFound(*fingerprint))?;
        if !current.is_active() {
            return Ok(Transition::AlreadyRevoked(current));
        }

        let entry = JournalEntry::Revoked {
            fingerprint: *fingerprint,
            revoked_by: revoked_by.to_string(),
            revoked_at: at,
        };
        Self::append(&mut writer, &entry).await?;

        let mut records = self.records.write().await;
        let record = records
            .get_mut(fingerprint)
            .ok_or(StoreError::NotFound(*fingerprint))?;
        record.revoke(revoked_by, at);
        Ok(Transition::Applied(record.clone()))
    }

    async fn records(&self) -> Result<Vec<CertificateRecord>, StoreError> {
        let mut all: Vec<_> = self.records.read().await.values().cloned().collect();
        sort_by_issue_time(&mut all);
        Ok(all)
    }
}
