use super::qr::parse_qr_payload;
use crate::crypto::{Fingerprint, fingerprint};
use crate::error::RegistryResult;
use crate::metrics::VerificationStats;
use crate::pki::{CertificateRecord, CertificateStatus};
use crate::storage::StorageReference;
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum VerificationInput {
    File(Vec<u8>),
    /// Fingerprint as typed by a user; surrounding whitespace is ignored.
    Fingerprint(String),
    /// Raw QR payload.
    ExternalReference(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    Valid,
    Revoked,
    NotFound,
    Malformed,
}

impl VerificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationOutcome::Valid => "valid",
            VerificationOutcome::Revoked => "revoked",
            VerificationOutcome::NotFound => "not_found",
            VerificationOutcome::Malformed => "malformed",
        }
    }
}

/// Fields of a record a verifying party is allowed to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRecord {
    pub issuer: String,
    pub title: String,
    pub issued_at: DateTime<Utc>,
    pub storage_reference: StorageReference,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<&CertificateRecord> for PublicRecord {
    fn from(record: &CertificateRecord) -> Self {
        Self {
            issuer: record.issuer.clone(),
            title: record.title.clone(),
            issued_at: record.issued_at,
            storage_reference: record.storage_reference.clone(),
            revoked_at: record.revoked_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub outcome: VerificationOutcome,
    pub fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<PublicRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerificationReport {
    fn malformed(reason: String) -> Self {
        Self {
            outcome: VerificationOutcome::Malformed,
            fingerprint: None,
            record: None,
            reason: Some(reason),
        }
    }
}

/// Answers verification queries straight from the record store. Never
/// writes to the store.
pub struct Resolver {
    store: Arc<dyn RecordStore>,
    stats: Arc<VerificationStats>,
}

impl Resolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            stats: Arc::new(VerificationStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<VerificationStats> {
        self.stats.clone()
    }

    pub async fn verify(&self, input: VerificationInput) -> RegistryResult<VerificationReport> {
        let parsed = match input {
            VerificationInput::File(bytes) => Ok(fingerprint(&bytes)),
            VerificationInput::Fingerprint(text) => {
                Fingerprint::parse(text.trim()).map_err(|e| e.to_string())
            }
            VerificationInput::ExternalReference(payload) => {
                parse_qr_payload(&payload).map_err(|e| e.to_string())
            }
        };

        let report = match parsed {
            Err(reason) => VerificationReport::malformed(reason),
            Ok(fp) => self.lookup(fp).await?,
        };

        debug!(
            "verification of {:?}: {}",
            report.fingerprint,
            report.outcome.as_str()
        );
        self.stats.record(report.outcome);
        Ok(report)
    }

    async fn lookup(&self, fp: Fingerprint) -> RegistryResult<VerificationReport> {
        let record = self.store.get(&fp).await?;
        let outcome = match record.as_ref().map(|r| r.status) {
            None => VerificationOutcome::NotFound,
            Some(CertificateStatus::Active) => VerificationOutcome::Valid,
            Some(CertificateStatus::Revoked) => VerificationOutcome::Revoked,
        };
        Ok(VerificationReport {
            outcome,
            fingerprint: Some(fp),
            record: record.as_ref().map(PublicRecord::from),
            reason: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::memory::tests::sample;
    use crate::verify::encode_qr_payload;

    async fn seeded() -> (Resolver, MemoryStore) {
        let store = MemoryStore::new();
        store.put(sample("uni-a", b"active", Utc::now())).await.unwrap();
        store.put(sample("uni-a", b"revoked", Utc::now())).await.unwrap();
        store
            .mark_revoked(&fingerprint(b"revoked"), "uni-a", Utc::now())
            .await
            .unwrap();
        (Resolver::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn every_input_form_resolves() {
        let (resolver, _) = seeded().await;
        let fp = fingerprint(b"active");

        for input in [
            VerificationInput::File(b"active".to_vec()),
            VerificationInput::Fingerprint(fp.to_hex()),
            VerificationInput::Fingerprint(format!("  0x{}\n", fp.to_hex().to_uppercase())),
            VerificationInput::ExternalReference(encode_qr_payload(&fp)),
        ] {
            let report = resolver.verify(input).await.unwrap();
            assert_eq!(report.outcome, VerificationOutcome::Valid);
            assert_eq!(report.fingerprint, Some(fp));
            let public = report.record.unwrap();
            assert_eq!(public.issuer, "uni-a");
            assert_eq!(public.revoked_at, None);
        }
    }

    #[tokio::test]
    async fn revoked_and_unknown() {
        let (resolver, _) = seeded().await;

        let revoked = resolver
            .verify(VerificationInput::File(b"revoked".to_vec()))
            .await
            .unwrap();
        assert_eq!(revoked.outcome, VerificationOutcome::Revoked);
        assert!(revoked.record.unwrap().revoked_at.is_some());

        let unknown = resolver
            .verify(VerificationInput::File(b"tampered copy".to_vec()))
            .await
            .unwrap();
        assert_eq!(unknown.outcome, VerificationOutcome::NotFound);
        assert!(unknown.record.is_none());
    }

    #[tokio::test]
    async fn malformed_inputs_are_outcomes_not_errors() {
        let (resolver, _) = seeded().await;
        for input in [
            VerificationInput::Fingerprint("not-a-hash".to_string()),
            VerificationInput::Fingerprint("ab".repeat(31)),
            VerificationInput::Fingerprint("zz".repeat(32)),
            VerificationInput::ExternalReference("https://example.org/cert/1".to_string()),
        ] {
            let report = resolver.verify(input).await.unwrap();
            assert_eq!(report.outcome, VerificationOutcome::Malformed);
            assert!(report.fingerprint.is_none());
            assert!(report.reason.is_some());
        }
    }

    #[tokio::test]
    async fn verification_is_read_only_and_counted() {
        let (resolver, store) = seeded().await;
        let before = store.records().await.unwrap();

        resolver
            .verify(VerificationInput::File(b"active".to_vec()))
            .await
            .unwrap();
        resolver
            .verify(VerificationInput::Fingerprint("nope".to_string()))
            .await
            .unwrap();

        assert_eq!(store.records().await.unwrap(), before);
        let snapshot = resolver.stats().snapshot();
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.valid, 1);
        assert_eq!(snapshot.malformed, 1);
    }
}
