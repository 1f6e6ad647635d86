use crate::pki::CertificateRecord;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Serialize)]
struct AuditRow<'a> {
    fingerprint: String,
    issuer: &'a str,
    recipient: &'a str,
    title: &'a str,
    description: &'a str,
    storage_reference: &'a str,
    issued_at: String,
    status: &'static str,
    revoked_at: String,
    revoked_by: &'a str,
}

impl<'a> From<&'a CertificateRecord> for AuditRow<'a> {
    fn from(record: &'a CertificateRecord) -> Self {
        Self {
            fingerprint: record.fingerprint.to_hex(),
            issuer: &record.issuer,
            recipient: &record.recipient,
            title: &record.title,
            description: record.description.as_deref().unwrap_or(""),
            storage_reference: record.storage_reference.as_str(),
            issued_at: record.issued_at.to_rfc3339(),
            status: record.status.as_str(),
            revoked_at: record.revoked_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            revoked_by: record.revoked_by.as_deref().unwrap_or(""),
        }
    }
}

/// Write the audit trail, one row per record, with a header line.
pub fn write_records_csv<W: Write>(records: &[CertificateRecord], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(AuditRow::from(record))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn save_records_csv(records: &[CertificateRecord], path: impl AsRef<Path>) -> Result<(), csv::Error> {
    let file = std::fs::File::create(path)?;
    write_records_csv(records, file)
}
