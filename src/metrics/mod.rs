pub mod export;
pub mod stats;

pub use export::{save_records_csv, write_records_csv};
pub use stats::{IssuerSummary, RegistrySummary, VerificationSnapshot, VerificationStats};
