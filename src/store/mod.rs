pub mod archive;
pub mod snapshots;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use archive::{DiffArchive, DiffRecord};
pub use snapshots::SnapshotStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed reading {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("corrupt JSON in {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed writing {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed encoding {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("archive entry already exists: {}", .path.display())]
    ArchiveCollision { path: PathBuf },
}

impl StoreError {
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Corrupt { .. })
    }
}

pub(crate) fn namespace_dir(root: &Path, key: &str) -> PathBuf {
    root.join(key)
}

pub(crate) fn create_namespace(root: &Path, key: &str) -> Result<PathBuf, StoreError> {
    let dir = namespace_dir(root, key);
    std::fs::create_dir_all(&dir).map_err(|source| StoreError::Write {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}
