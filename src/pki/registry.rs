use super::certificate::{CertificateRecord, CertificateStatus, IssueRequest, Issuer};
use crate::blockchain::{LedgerEvent, LedgerMirror};
use crate::crypto::{Fingerprint, fingerprint};
use crate::error::{RegistryError, RegistryResult};
use crate::storage::ArchiveStorage;
use crate::store::{RecordStore, Transition};
use chrono::Utc;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RegistryLimits {
    pub max_file_bytes: usize,
    pub archive_timeout: Duration,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            archive_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of a revocation request. Revoking twice is not an error: the
/// second call reports the record as it already stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revocation {
    Revoked(CertificateRecord),
    AlreadyRevoked(CertificateRecord),
}

impl Revocation {
    pub fn record(&self) -> &CertificateRecord {
        match self {
            Revocation::Revoked(record) | Revocation::AlreadyRevoked(record) => record,
        }
    }

    pub fn into_record(self) -> CertificateRecord {
        match self {
            Revocation::Revoked(record) | Revocation::AlreadyRevoked(record) => record,
        }
    }

    pub fn was_already_revoked(&self) -> bool {
        matches!(self, Revocation::AlreadyRevoked(_))
    }
}

/// Issuance and revocation rules over a [`RecordStore`].
pub struct RegistryEngine {
    store: Arc<dyn RecordStore>,
    archive: Arc<dyn ArchiveStorage>,
    ledger: Option<LedgerMirror>,
    limits: RegistryLimits,
    // held from store commit until the ledger event is queued, so the
    // mirror sees events in commit order
    commits: Mutex<()>,
}

impl RegistryEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        archive: Arc<dyn ArchiveStorage>,
        limits: RegistryLimits,
    ) -> Self {
        Self {
            store,
            archive,
            ledger: None,
            limits,
            commits: Mutex::new(()),
        }
    }

    pub fn with_ledger(mut self, mirror: LedgerMirror) -> Self {
        self.ledger = Some(mirror);
        self
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    pub fn limits(&self) -> &RegistryLimits {
        &self.limits
    }

    pub async fn issue(&self, issuer: &Issuer, request: IssueRequest) -> RegistryResult<CertificateRecord> {
        if !issuer.can_issue() {
            warn!("rejected issuance by unauthorized issuer {}", issuer.id);
            return Err(RegistryError::Unauthorized {
                issuer: issuer.id.clone(),
                action: "issue certificates",
            });
        }

        let recipient = required("recipient", &request.recipient)?;
        let title = required("title", &request.title)?;
        let description = request
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        if request.file.is_empty() {
            return Err(RegistryError::InvalidField {
                field: "file",
                reason: "certificate file is empty".to_string(),
            });
        }
        if request.file.len() > self.limits.max_file_bytes {
            return Err(RegistryError::PayloadTooLarge {
                size: request.file.len(),
                limit: self.limits.max_file_bytes,
            });
        }

        let fingerprint = fingerprint(&request.file);
        if self.store.get(&fingerprint).await?.is_some() {
            return Err(RegistryError::AlreadyIssued(fingerprint));
        }

        let archived =
            tokio::time::timeout(self.limits.archive_timeout, self.archive.archive(&request.file)).await;
        let storage_reference = match archived {
            Ok(Ok(reference)) => reference,
            Ok(Err(e)) => {
                error!("archiving {} failed: {}", fingerprint, e);
                return Err(RegistryError::IssuanceFailed(e.to_string()));
            }
            Err(_) => {
                error!(
                    "archiving {} timed out after {:?}",
                    fingerprint, self.limits.archive_timeout
                );
                return Err(RegistryError::IssuanceFailed(format!(
                    "archive did not respond within {:?}",
                    self.limits.archive_timeout
                )));
            }
        };

        let record = CertificateRecord {
            fingerprint,
            issuer: issuer.id.clone(),
            recipient,
            title,
            description,
            storage_reference,
            issued_at: Utc::now(),
            status: CertificateStatus::Active,
            revoked_at: None,
            revoked_by: None,
        };
        let commit = self.commits.lock().await;
        // a concurrent issuance of the same bytes loses here with AlreadyIssued
        self.store.put(record.clone()).await?;
        self.mirror(LedgerEvent::record_issued(fingerprint, &issuer.id, record.issued_at));
        drop(commit);

        info!(
            "issued {} \"{}\" to {} by {}",
            record.fingerprint, record.title, record.recipient, record.issuer
        );
        Ok(record)
    }

    pub async fn revoke(&self, issuer: &Issuer, fingerprint: &Fingerprint) -> RegistryResult<Revocation> {
        let record = self
            .store
            .get(fingerprint)
            .await?
            .ok_or(RegistryError::NotFound(*fingerprint))?;

        if !issuer.can_revoke(&record) {
            warn!(
                "{} attempted to revoke {} issued by {}",
                issuer.id, fingerprint, record.issuer
            );
            return Err(RegistryError::Unauthorized {
                issuer: issuer.id.clone(),
                action: "revoke this certificate",
            });
        }
        if !record.is_active() {
            return Ok(Revocation::AlreadyRevoked(record));
        }

        let commit = self.commits.lock().await;
        let at = Utc::now();
        match self.store.mark_revoked(fingerprint, &issuer.id, at).await? {
            Transition::Applied(record) => {
                self.mirror(LedgerEvent::record_revoked(*fingerprint, at));
                drop(commit);
                info!("revoked {} by {}", fingerprint, issuer.id);
                Ok(Revocation::Revoked(record))
            }
            Transition::AlreadyRevoked(record) => Ok(Revocation::AlreadyRevoked(record)),
        }
    }

    pub async fn certificate(&self, fingerprint: &Fingerprint) -> RegistryResult<Option<CertificateRecord>> {
        Ok(self.store.get(fingerprint).await?)
    }

    pub async fn list_by_issuer(&self, issuer: &str) -> RegistryResult<Vec<CertificateRecord>> {
        Ok(self.store.list_by_issuer(issuer).await?)
    }

    /// Newest first.
    pub async fn recent_issuances(&self, issuer: &str, limit: usize) -> RegistryResult<Vec<CertificateRecord>> {
        let mut records = self.store.list_by_issuer(issuer).await?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    /// Retrieve the archived original and check it still hashes to its
    /// fingerprint.
    pub async fn fetch_original(&self, fingerprint: &Fingerprint) -> RegistryResult<Vec<u8>> {
        let record = self
            .store
            .get(fingerprint)
            .await?
            .ok_or(RegistryError::NotFound(*fingerprint))?;

        let fetched = tokio::time::timeout(
            self.limits.archive_timeout,
            self.archive.fetch(&record.storage_reference),
        )
        .await
        .map_err(|_| RegistryError::ArchiveUnavailable("archive fetch timed out".to_string()))?;
        let bytes = fetched.map_err(|e| RegistryError::ArchiveUnavailable(e.to_string()))?;

        if !fingerprint.matches(&bytes) {
            error!("archived copy of {} does not match its fingerprint", fingerprint);
            return Err(RegistryError::ArchiveUnavailable(format!(
                "archived copy of {fingerprint} is corrupt"
            )));
        }
        Ok(bytes)
    }

    fn mirror(&self, event: LedgerEvent) {
        if let Some(ledger) = &self.ledger {
            ledger.publish(event);
        }
    }
}

fn required(field: &'static str, value: &str) -> RegistryResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RegistryError::InvalidField {
            field,
            reason: "must not be blank".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::MirrorConfig;
    use crate::blockchain::mirror::tests::FlakyLedger;
    use crate::storage::MemoryArchive;
    use crate::store::MemoryStore;
    use tokio_test::{assert_err, assert_ok};

    struct Fixture {
        engine: RegistryEngine,
        store: MemoryStore,
        archive: Arc<MemoryArchive>,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let archive = Arc::new(MemoryArchive::new());
        let engine = RegistryEngine::new(
            Arc::new(store.clone()),
            archive.clone(),
            RegistryLimits {
                max_file_bytes: 1024,
                archive_timeout: Duration::from_millis(200),
            },
        );
        Fixture { engine, store, archive }
    }

    fn diploma() -> IssueRequest {
        IssueRequest::new("0xabc", "BSc CS", b"%PDF diploma".to_vec())
    }

    #[tokio::test]
    async fn issue_creates_active_record() {
        let fx = fixture();
        let record = assert_ok!(
            fx.engine
                .issue(&Issuer::authorized("uni-a"), diploma().with_description("  with honours "))
                .await
        );
        assert_eq!(record.status, CertificateStatus::Active);
        assert_eq!(record.fingerprint, fingerprint(b"%PDF diploma"));
        assert_eq!(record.description.as_deref(), Some("with honours"));
        assert_eq!(fx.archive.len().await, 1);
        assert_eq!(fx.store.len().await, 1);
    }

    #[tokio::test]
    async fn unauthorized_issuer_is_rejected() {
        let fx = fixture();
        let err = assert_err!(fx.engine.issue(&Issuer::unauthorized("mallory"), diploma()).await);
        assert!(matches!(err, RegistryError::Unauthorized { .. }));
        assert_eq!(fx.archive.len().await, 0);
    }

    #[tokio::test]
    async fn duplicate_content_is_already_issued() {
        let fx = fixture();
        fx.engine.issue(&Issuer::authorized("uni-a"), diploma()).await.unwrap();
        let again = IssueRequest::new("someone else", "Other title", b"%PDF diploma".to_vec());
        let err = fx.engine.issue(&Issuer::authorized("uni-b"), again).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyIssued(fp) if fp == fingerprint(b"%PDF diploma")));
    }

    #[tokio::test]
    async fn input_validation() {
        let fx = fixture();
        let issuer = Issuer::authorized("uni-a");

        let blank_title = IssueRequest::new("r", "   ", b"x".to_vec());
        assert!(matches!(
            fx.engine.issue(&issuer, blank_title).await,
            Err(RegistryError::InvalidField { field: "title", .. })
        ));
        let empty_file = IssueRequest::new("r", "t", vec![]);
        assert!(matches!(
            fx.engine.issue(&issuer, empty_file).await,
            Err(RegistryError::InvalidField { field: "file", .. })
        ));
        let huge = IssueRequest::new("r", "t", vec![7u8; 2048]);
        assert!(matches!(
            fx.engine.issue(&issuer, huge).await,
            Err(RegistryError::PayloadTooLarge { size: 2048, limit: 1024 })
        ));
    }

    #[tokio::test]
    async fn archive_failure_leaves_no_record() {
        let fx = fixture();
        fx.archive.set_unavailable(true);
        let err = fx.engine.issue(&Issuer::authorized("uni-a"), diploma()).await.unwrap_err();
        assert!(matches!(err, RegistryError::IssuanceFailed(_)));
        assert_eq!(fx.store.len().await, 0);
    }

    #[tokio::test]
    async fn slow_archive_times_out() {
        let fx = fixture();
        fx.archive.set_delay(Duration::from_secs(5));
        let err = fx.engine.issue(&Issuer::authorized("uni-a"), diploma()).await.unwrap_err();
        assert!(matches!(err, RegistryError::IssuanceFailed(_)));
        assert_eq!(fx.store.len().await, 0);
    }

    #[tokio::test]
    async fn revoke_by_issuer_then_again() {
        let fx = fixture();
        let issuer = Issuer::authorized("uni-a");
        let record = fx.engine.issue(&issuer, diploma()).await.unwrap();

        let first = fx.engine.revoke(&issuer, &record.fingerprint).await.unwrap();
        assert!(!first.was_already_revoked());
        assert_eq!(first.record().status, CertificateStatus::Revoked);
        assert_eq!(first.record().revoked_by.as_deref(), Some("uni-a"));

        let second = fx.engine.revoke(&issuer, &record.fingerprint).await.unwrap();
        assert!(second.was_already_revoked());
        assert_eq!(second.into_record().revoked_at, first.record().revoked_at);
    }

    #[tokio::test]
    async fn revoke_authority() {
        let fx = fixture();
        let record = fx.engine.issue(&Issuer::authorized("uni-a"), diploma()).await.unwrap();

        let err = fx
            .engine
            .revoke(&Issuer::authorized("uni-b"), &record.fingerprint)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized { .. }));

        let by_admin = fx
            .engine
            .revoke(&Issuer::admin("registrar"), &record.fingerprint)
            .await
            .unwrap();
        assert_eq!(by_admin.record().revoked_by.as_deref(), Some("registrar"));
    }

    #[tokio::test]
    async fn deauthorized_admin_cannot_revoke() {
        let fx = fixture();
        let record = fx.engine.issue(&Issuer::authorized("uni-a"), diploma()).await.unwrap();

        let former: Issuer = serde_json::from_str(r#"{"id":"ex-admin","admin":true}"#).unwrap();
        let err = fx.engine.revoke(&former, &record.fingerprint).await.unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized { .. }));
        assert!(fx.store.get(&record.fingerprint).await.unwrap().unwrap().is_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_revocations_apply_once() {
        let fx = fixture();
        let record = fx.engine.issue(&Issuer::authorized("uni-a"), diploma()).await.unwrap();
        let engine = Arc::new(fx.engine);

        let mut handles = Vec::new();
        for i in 0..16 {
            let engine = engine.clone();
            let fp = record.fingerprint;
            handles.push(tokio::spawn(async move {
                let revoker = if i % 2 == 0 {
                    Issuer::authorized("uni-a")
                } else {
                    Issuer::admin(format!("registrar-{i}"))
                };
                engine.revoke(&revoker, &fp).await
            }));
        }

        let mut applied = 0;
        let mut outcomes = Vec::new();
        for handle in handles {
            let revocation = handle.await.unwrap().unwrap();
            if !revocation.was_already_revoked() {
                applied += 1;
            }
            outcomes.push(revocation.into_record());
        }
        assert_eq!(applied, 1);

        let stored = fx.store.get(&record.fingerprint).await.unwrap().unwrap();
        assert_eq!(stored.status, CertificateStatus::Revoked);
        for seen in outcomes {
            assert_eq!(seen.revoked_by, stored.revoked_by);
            assert_eq!(seen.revoked_at, stored.revoked_at);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn ledger_sees_issue_before_racing_revoke() {
        let ledger = Arc::new(FlakyLedger::new(0));
        let (mirror, handle) = LedgerMirror::spawn(
            ledger.clone(),
            MirrorConfig {
                max_attempts: 1,
                initial_backoff: Duration::from_millis(1),
                submit_timeout: Duration::from_secs(5),
            },
        );
        let engine = Arc::new(fixture().engine.with_ledger(mirror));

        let mut tasks = Vec::new();
        for i in 0..20u8 {
            let document = vec![b'd', i];
            let fp = fingerprint(&document);
            let issuing = engine.clone();
            tasks.push(tokio::spawn(async move {
                issuing
                    .issue(&Issuer::authorized("uni-a"), IssueRequest::new("r", "t", document))
                    .await
                    .map(|_| ())
            }));
            let revoking = engine.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    match revoking.revoke(&Issuer::authorized("uni-a"), &fp).await {
                        Err(RegistryError::NotFound(_)) => tokio::task::yield_now().await,
                        other => break other.map(|_| ()),
                    }
                }
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        drop(engine);
        handle.await.unwrap();

        for i in 0..20u8 {
            let events = ledger.chain.events_for(&fingerprint(&[b'd', i])).await;
            assert_eq!(events.len(), 2);
            assert_eq!(events[0].1.function_name(), "recordIssued");
            assert_eq!(events[1].1.function_name(), "recordRevoked");
        }
    }

    #[tokio::test]
    async fn revoke_unknown_is_not_found() {
        let fx = fixture();
        let missing = fingerprint(b"never issued");
        let err = fx
            .engine
            .revoke(&Issuer::admin("registrar"), &missing)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(fp) if fp == missing));
    }

    #[tokio::test]
    async fn recent_issuances_newest_first() {
        let fx = fixture();
        let issuer = Issuer::authorized("uni-a");
        for i in 0..5u8 {
            let req = IssueRequest::new("r", format!("Cert {i}"), vec![i + 1]);
            fx.engine.issue(&issuer, req).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let recent = fx.engine.recent_issuances("uni-a", 3).await.unwrap();
        let titles: Vec<_> = recent.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Cert 4", "Cert 3", "Cert 2"]);
        assert_eq!(fx.engine.list_by_issuer("uni-a").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn fetch_original_round_trip() {
        let fx = fixture();
        let record = fx.engine.issue(&Issuer::authorized("uni-a"), diploma()).await.unwrap();
        let bytes = fx.engine.fetch_original(&record.fingerprint).await.unwrap();
        assert_eq!(bytes, b"%PDF diploma");

        fx.archive.set_unavailable(true);
        assert!(matches!(
            fx.engine.fetch_original(&record.fingerprint).await,
            Err(RegistryError::ArchiveUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn ledger_outage_does_not_block_issuance() {
        let ledger = Arc::new(FlakyLedger::new(u32::MAX));
        let (mirror, handle) = LedgerMirror::spawn(
            ledger.clone(),
            MirrorConfig {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                submit_timeout: Duration::from_millis(50),
            },
        );
        let fx = fixture();
        let engine = fx.engine.with_ledger(mirror.clone());
        let issuer = Issuer::authorized("uni-a");

        let record = engine.issue(&issuer, diploma()).await.unwrap();
        engine.revoke(&issuer, &record.fingerprint).await.unwrap();

        drop(engine);
        let stats = loop {
            let stats = mirror.stats();
            if stats.abandoned == 2 {
                break stats;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert_eq!(stats.delivered, 0);
        drop(mirror);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn events_are_mirrored_after_commit() {
        let ledger = Arc::new(FlakyLedger::new(1));
        let (mirror, handle) = LedgerMirror::spawn(
            ledger.clone(),
            MirrorConfig {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                submit_timeout: Duration::from_millis(200),
            },
        );
        let fx = fixture();
        let engine = fx.engine.with_ledger(mirror);
        let issuer = Issuer::authorized("uni-a");

        let record = engine.issue(&issuer, diploma()).await.unwrap();
        engine.revoke(&issuer, &record.fingerprint).await.unwrap();
        drop(engine);
        handle.await.unwrap();

        let events = ledger.chain.events_for(&record.fingerprint).await;
        assert_eq!(events.len(), 2);
        ledger.chain.verify_integrity().await.unwrap();
    }
}
