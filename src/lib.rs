//! Certificate registry: issue, revoke and verify document certificates
//! identified by the SHA-256 fingerprint of the document itself.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod pki;
pub mod storage;
pub mod store;
pub mod verify;

pub use config::Config;
pub use crypto::{Fingerprint, fingerprint};
pub use error::{RegistryError, RegistryResult};
pub use pki::{CertificateRecord, CertificateStatus, IssueRequest, Issuer, RegistryEngine, Revocation};
pub use verify::{Resolver, VerificationInput, VerificationOutcome, VerificationReport};
