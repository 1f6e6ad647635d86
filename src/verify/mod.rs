pub mod qr;
pub mod resolver;

pub use qr::{QR_PREFIX, QrPayloadError, encode_qr_payload, parse_qr_payload};
pub use resolver::{PublicRecord, Resolver, VerificationInput, VerificationOutcome, VerificationReport};
