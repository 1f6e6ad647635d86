use crate::crypto::Fingerprint;
use crate::storage::StorageReference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateRecord {
    pub fingerprint: Fingerprint,
    pub issuer: String,
    pub recipient: String,
    pub title: String,
    pub description: Option<String>,
    pub storage_reference: StorageReference,
    pub issued_at: DateTime<Utc>,
    pub status: CertificateStatus,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Active,
    Revoked,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Active => "active",
            CertificateStatus::Revoked => "revoked",
        }
    }
}

impl CertificateRecord {
    pub fn is_active(&self) -> bool {
        self.status == CertificateStatus::Active
    }

    /// Move an active record to `Revoked`. Returns false, leaving the record
    /// untouched, when it is already revoked.
    pub fn revoke(&mut self, revoked_by: &str, at: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = CertificateStatus::Revoked;
        self.revoked_at = Some(at);
        self.revoked_by = Some(revoked_by.to_string());
        true
    }
}

/// Caller identity together with the capabilities it holds. Passed into
/// every mutating registry call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issuer {
    pub id: String,
    #[serde(default)]
    pub authorized: bool,
    #[serde(default)]
    pub admin: bool,
}

impl Issuer {
    pub fn authorized(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authorized: true,
            admin: false,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authorized: true,
            admin: true,
        }
    }

    pub fn unauthorized(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authorized: false,
            admin: false,
        }
    }

    pub fn can_issue(&self) -> bool {
        self.authorized
    }

    pub fn can_revoke(&self, record: &CertificateRecord) -> bool {
        self.authorized && (self.admin || self.id == record.issuer)
    }
}

#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub recipient: String,
    pub title: String,
    pub description: Option<String>,
    pub file: Vec<u8>,
}

impl IssueRequest {
    pub fn new(recipient: impl Into<String>, title: impl Into<String>, file: Vec<u8>) -> Self {
        Self {
            recipient: recipient.into(),
            title: title.into(),
            description: None,
            file,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
