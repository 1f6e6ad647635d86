//! Archival collaborator: keeps the original certificate files.
//!
//! The registry only ever sees an opaque [`StorageReference`]; backends are
//! free to be slow or to fail, and the engine bounds every call.

pub mod cache;
pub mod local;
pub mod memory;

pub use cache::CachedArchive;
pub use local::LocalArchive;
pub use memory::MemoryArchive;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageReference(String);

impl StorageReference {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive unavailable: {0}")]
    Unavailable(String),
    #[error("no archived object for {0}")]
    NotFound(StorageReference),
    #[error("unrecognised storage reference {0}")]
    InvalidReference(String),
    #[error("archived object {0} does not match its digest")]
    IntegrityMismatch(StorageReference),
    #[error("archive I/O: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ArchiveStorage: Send + Sync {
    async fn archive(&self, bytes: &[u8]) -> Result<StorageReference, ArchiveError>;
    async fn fetch(&self, reference: &StorageReference) -> Result<Vec<u8>, ArchiveError>;
}
