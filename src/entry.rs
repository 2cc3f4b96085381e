//! A file discovered during traversal.

use std::cell::OnceCell;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// An absolute path plus metadata that is fetched on first use and cached.
///
/// Entries live only for one run and are never persisted.
#[derive(Debug, Clone)]
pub struct FileEntry {
    path: PathBuf,
    metadata: OnceCell<Metadata>,
}

impl FileEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            metadata: OnceCell::new(),
        }
    }

    /// Builds an entry whose metadata is already known, e.g. from the walker.
    pub fn with_metadata(path: impl Into<PathBuf>, metadata: Metadata) -> Self {
        Self {
            path: path.into(),
            metadata: OnceCell::from(metadata),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }

    /// Stats the file on first call; later calls reuse the result.
    /// A failed stat is not cached.
    pub fn metadata(&self) -> io::Result<&Metadata> {
        if let Some(metadata) = self.metadata.get() {
            return Ok(metadata);
        }
        let metadata = fs::metadata(&self.path)?;
        Ok(self.metadata.get_or_init(|| metadata))
    }

    /// Size in bytes.
    pub fn size(&self) -> io::Result<u64> {
        self.metadata().map(Metadata::len)
    }

    /// Last modification time.
    pub fn modified(&self) -> io::Result<SystemTime> {
        self.metadata()?.modified()
    }
}
