use crate::pki::{CertificateRecord, CertificateStatus};
use crate::verify::VerificationOutcome;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct VerificationStats {
    valid: AtomicU64,
    revoked: AtomicU64,
    not_found: AtomicU64,
    malformed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationSnapshot {
    pub total: u64,
    pub valid: u64,
    pub revoked: u64,
    pub not_found: u64,
    pub malformed: u64,
    /// Share of verifications that came back valid, in percent.
    pub verification_rate: f64,
}

impl VerificationStats {
    pub fn record(&self, outcome: VerificationOutcome) {
        let counter = match outcome {
            VerificationOutcome::Valid => &self.valid,
            VerificationOutcome::Revoked => &self.revoked,
            VerificationOutcome::NotFound => &self.not_found,
            VerificationOutcome::Malformed => &self.malformed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> VerificationSnapshot {
        let valid = self.valid.load(Ordering::Relaxed);
        let revoked = self.revoked.load(Ordering::Relaxed);
        let not_found = self.not_found.load(Ordering::Relaxed);
        let malformed = self.malformed.load(Ordering::Relaxed);
        let total = valid + revoked + not_found + malformed;

        let verification_rate = if total == 0 {
            0.0
        } else {
            (valid as f64 / total as f64) * 100.0
        };

        VerificationSnapshot {
            total,
            valid,
            revoked,
            not_found,
            malformed,
            verification_rate,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerSummary {
    pub issued: usize,
    pub active: usize,
    pub revoked: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub generated_at: String,
    pub total: usize,
    pub active: usize,
    pub revoked: usize,
    pub issuers: BTreeMap<String, IssuerSummary>,
}

impl RegistrySummary {
    pub fn from_records(records: &[CertificateRecord]) -> Self {
        let mut issuers: BTreeMap<String, IssuerSummary> = BTreeMap::new();
        let mut active = 0;

        for record in records {
            let entry = issuers.entry(record.issuer.clone()).or_default();
            entry.issued += 1;
            match record.status {
                CertificateStatus::Active => {
                    entry.active += 1;
                    active += 1;
                }
                CertificateStatus::Revoked => entry.revoked += 1,
            }
        }

        Self {
            generated_at: Utc::now().to_rfc3339(),
            total: records.len(),
            active,
            revoked: records.len() - active,
            issuers,
        }
    }
}

impl fmt::Display for RegistrySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Certificate registry summary ({})", self.generated_at)?;
        writeln!(
            f,
            "  total: {}  active: {}  revoked: {}",
            self.total, self.active, self.revoked
        )?;
        for (issuer, summary) in &self.issuers {
            writeln!(
                f,
                "  {:<24} issued {:>6}  active {:>6}  revoked {:>6}",
                issuer, summary.issued, summary.active, summary.revoked
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::tests::sample;

    #[test]
    fn rate_is_share_of_valid() {
        let stats = VerificationStats::default();
        assert_eq!(stats.snapshot().verification_rate, 0.0);

        stats.record(VerificationOutcome::Valid);
        stats.record(VerificationOutcome::Valid);
        stats.record(VerificationOutcome::Revoked);
        stats.record(VerificationOutcome::NotFound);

        let snap = stats.snapshot();
        assert_eq!(snap.total, 4);
        assert_eq!(snap.verification_rate, 50.0);
    }

    #[test]
    fn summary_groups_by_issuer() {
        let mut revoked = sample("uni-a", b"2", Utc::now());
        revoked.revoke("uni-a", Utc::now());
        let records = vec![
            sample("uni-a", b"1", Utc::now()),
            revoked,
            sample("uni-b", b"3", Utc::now()),
        ];

        let summary = RegistrySummary::from_records(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.active, 2);
        assert_eq!(summary.revoked, 1);
        assert_eq!(
            summary.issuers["uni-a"],
            IssuerSummary { issued: 2, active: 1, revoked: 1 }
        );
        assert!(summary.to_string().contains("uni-b"));
    }
}
