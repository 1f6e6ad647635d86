pub mod certificate;
pub mod registry;

pub use certificate::{CertificateRecord, CertificateStatus, IssueRequest, Issuer};
pub use registry::{RegistryEngine, RegistryLimits, Revocation};
