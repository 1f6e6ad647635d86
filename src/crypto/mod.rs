pub mod fingerprint;

pub use fingerprint::{Fingerprint, FingerprintError, fingerprint};
