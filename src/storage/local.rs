use super::{ArchiveError, ArchiveStorage, StorageReference};
use crate::crypto::Fingerprint;
use async_trait::async_trait;
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const SCHEME: &str = "archive://sha256/";

static TMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Content-addressed archive on the local filesystem.
///
/// Objects live at `<root>/<first two hex digits>/<full hex digest>`, so
/// archiving the same bytes twice is a no-op returning the same reference.
pub struct LocalArchive {
    root: PathBuf,
}

impl LocalArchive {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reference_for(digest: &Fingerprint) -> StorageReference {
        StorageReference::new(format!("{SCHEME}{}", digest.to_hex()))
    }

    fn digest_of(reference: &StorageReference) -> Result<Fingerprint, ArchiveError> {
        reference
            .as_str()
            .strip_prefix(SCHEME)
            .filter(|hex| hex.len() == Fingerprint::HEX_LEN)
            .and_then(|hex| Fingerprint::parse(hex).ok())
            .ok_or_else(|| ArchiveError::InvalidReference(reference.to_string()))
    }

    fn object_path(&self, digest: &Fingerprint) -> PathBuf {
        let hex = digest.to_hex();
        self.root.join(&hex[..2]).join(hex)
    }
}

#[async_trait]
impl ArchiveStorage for LocalArchive {
    async fn archive(&self, bytes: &[u8]) -> Result<StorageReference, ArchiveError> {
        let digest = Fingerprint::of(bytes);
        let path = self.object_path(&digest);
        let reference = Self::reference_for(&digest);

        if tokio::fs::try_exists(&path).await? {
            debug!("archive already holds {}", reference);
            return Ok(reference);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // write-then-rename so a reader never sees a half-written object
        let sequence = TMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp-{}-{sequence}", std::process::id()));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("archived {} bytes as {}", bytes.len(), reference);
        Ok(reference)
    }

    async fn fetch(&self, reference: &StorageReference) -> Result<Vec<u8>, ArchiveError> {
        let digest = Self::digest_of(reference)?;
        let bytes = match tokio::fs::read(self.object_path(&digest)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArchiveError::NotFound(reference.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        if !digest.matches(&bytes) {
            return Err(ArchiveError::IntegrityMismatch(reference.clone()));
        }
        Ok(bytes)
    }
}
