use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::catalog::{Record, Snapshot};
use crate::store::{create_namespace, namespace_dir, StoreError};

pub const LATEST_SNAPSHOT_FILE: &str = "latest-snapshot.json";
const PENDING_SNAPSHOT_FILE: &str = ".latest-snapshot.json.tmp";

/// Keeps the most recent snapshot of every source, one directory per key.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_path(&self, key: &str) -> PathBuf {
        namespace_dir(&self.root, key).join(LATEST_SNAPSHOT_FILE)
    }

    /// Creates the directory for `key`. Safe to call on every run.
    pub fn ensure_namespace(&self, key: &str) -> Result<PathBuf, StoreError> {
        create_namespace(&self.root, key)
    }

    /// Returns `None` when the source has never been persisted.
    pub fn load(&self, key: &str) -> Result<Option<Snapshot>, StoreError> {
        let path = self.snapshot_path(key);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        let snapshot =
            serde_json::from_str(&data).map_err(|source| StoreError::Corrupt { path, source })?;
        Ok(Some(snapshot))
    }

    /// Replaces the latest snapshot. The new content is written to a sibling
    /// file and renamed into place, so readers see either the old or the new one.
    pub fn save(&self, key: &str, snapshot: &[Record]) -> Result<PathBuf, StoreError> {
        let dir = self.ensure_namespace(key)?;
        let target = dir.join(LATEST_SNAPSHOT_FILE);
        let pending = dir.join(PENDING_SNAPSHOT_FILE);

        let json = serde_json::to_string_pretty(snapshot).map_err(|source| StoreError::Encode {
            path: target.clone(),
            source,
        })?;
        write_synced(&pending, json.as_bytes()).map_err(|source| StoreError::Write {
            path: pending.clone(),
            source,
        })?;
        fs::rename(&pending, &target).map_err(|source| StoreError::Write {
            path: target.clone(),
            source,
        })?;
        debug!(source = key, records = snapshot.len(), "saved latest snapshot");
        Ok(target)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
