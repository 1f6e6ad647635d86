use crate::crypto::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEvent {
    pub event_id: String,
    pub kind: LedgerEventKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEventKind {
    RecordIssued {
        fingerprint: Fingerprint,
        issuer: String,
    },
    RecordRevoked {
        fingerprint: Fingerprint,
    },
}

impl LedgerEvent {
    pub fn record_issued(fingerprint: Fingerprint, issuer: &str, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            LedgerEventKind::RecordIssued {
                fingerprint,
                issuer: issuer.to_string(),
            },
            timestamp,
        )
    }

    pub fn record_revoked(fingerprint: Fingerprint, timestamp: DateTime<Utc>) -> Self {
        Self::new(LedgerEventKind::RecordRevoked { fingerprint }, timestamp)
    }

    fn new(kind: LedgerEventKind, timestamp: DateTime<Utc>) -> Self {
        let (fingerprint, issuer) = match &kind {
            LedgerEventKind::RecordIssued { fingerprint, issuer } => (fingerprint, issuer.as_str()),
            LedgerEventKind::RecordRevoked { fingerprint } => (fingerprint, ""),
        };
        let data = format!(
            "{}|{}|{}|{}",
            kind_name(&kind),
            fingerprint,
            issuer,
            timestamp.to_rfc3339()
        );
        Self {
            event_id: format!("{:x}", Sha256::digest(data.as_bytes())),
            kind,
            timestamp,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        match &self.kind {
            LedgerEventKind::RecordIssued { fingerprint, .. }
            | LedgerEventKind::RecordRevoked { fingerprint } => fingerprint,
        }
    }

    /// Contract function an external ledger would be invoked with.
    pub fn function_name(&self) -> &'static str {
        kind_name(&self.kind)
    }
}

fn kind_name(kind: &LedgerEventKind) -> &'static str {
    match kind {
        LedgerEventKind::RecordIssued { .. } => "recordIssued",
        LedgerEventKind::RecordRevoked { .. } => "recordRevoked",
    }
}
