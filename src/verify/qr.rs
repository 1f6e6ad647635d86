//! QR payload encoding.
//!
//! A certificate QR code carries exactly `urn:certificate:sha256:` followed by
//! the 64 lowercase hex digits of the fingerprint. No whitespace, no prefix
//! variants, no trailing data.

use crate::crypto::Fingerprint;
use thiserror::Error;

pub const QR_PREFIX: &str = "urn:certificate:sha256:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QrPayloadError {
    #[error("payload does not start with {QR_PREFIX}")]
    UnknownScheme,
    #[error("payload digest must be {} lowercase hex characters", Fingerprint::HEX_LEN)]
    BadDigest,
}

pub fn encode_qr_payload(fingerprint: &Fingerprint) -> String {
    format!("{QR_PREFIX}{}", fingerprint.to_hex())
}

pub fn parse_qr_payload(payload: &str) -> Result<Fingerprint, QrPayloadError> {
    let digest = payload
        .strip_prefix(QR_PREFIX)
        .ok_or(QrPayloadError::UnknownScheme)?;

    let canonical = digest.len() == Fingerprint::HEX_LEN
        && digest
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !canonical {
        return Err(QrPayloadError::BadDigest);
    }
    Fingerprint::parse(digest).map_err(|_| QrPayloadError::BadDigest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::fingerprint;

    #[test]
    fn encode_then_parse() {
        let fp = fingerprint(b"diploma.pdf");
        let payload = encode_qr_payload(&fp);
        assert!(payload.starts_with("urn:certificate:sha256:"));
        assert_eq!(payload.len(), QR_PREFIX.len() + 64);
        assert_eq!(parse_qr_payload(&payload), Ok(fp));
    }

    #[test]
    fn deviations_are_rejected() {
        let fp = fingerprint(b"diploma.pdf");
        let good = encode_qr_payload(&fp);
        let hex = fp.to_hex();

        assert_eq!(parse_qr_payload(&hex), Err(QrPayloadError::UnknownScheme));
        assert_eq!(
            parse_qr_payload(&format!("URN:CERTIFICATE:SHA256:{hex}")),
            Err(QrPayloadError::UnknownScheme)
        );
        assert_eq!(
            parse_qr_payload(&format!(" {good}")),
            Err(QrPayloadError::UnknownScheme)
        );
        assert_eq!(parse_qr_payload(&format!("{good}\n")), Err(QrPayloadError::BadDigest));
        assert_eq!(
            parse_qr_payload(&format!("{QR_PREFIX}{}", hex.to_uppercase())),
            Err(QrPayloadError::BadDigest)
        );
        assert_eq!(
            parse_qr_payload(&format!("{QR_PREFIX}0x{}", &hex[..62])),
            Err(QrPayloadError::BadDigest)
        );
        assert_eq!(parse_qr_payload(QR_PREFIX), Err(QrPayloadError::BadDigest));
        assert_eq!(
            parse_qr_payload("https://example.org/verify?hash=abc"),
            Err(QrPayloadError::UnknownScheme)
        );
    }
}
