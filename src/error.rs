use crate::crypto::Fingerprint;
use crate::store::StoreError;
use thiserror::Error;

/// Failures surfaced by the registry engine and resolver.
///
/// Revoking an already-revoked certificate and verifying an unknown one are
/// not errors; they come back as ordinary values.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{issuer} is not permitted to {action}")]
    Unauthorized { issuer: String, action: &'static str },
    #[error("certificate {0} has already been issued")]
    AlreadyIssued(Fingerprint),
    #[error("no certificate with fingerprint {0}")]
    NotFound(Fingerprint),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("certificate file is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("issuance failed: {0}")]
    IssuanceFailed(String),
    #[error("archived file unavailable: {0}")]
    ArchiveUnavailable(String),
    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateFingerprint(fp) => RegistryError::AlreadyIssued(fp),
            StoreError::NotFound(fp) => RegistryError::NotFound(fp),
            other => RegistryError::StoreUnavailable(other.to_string()),
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
