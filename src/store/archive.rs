use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{Record, Snapshot, SnapshotDiff};
use crate::store::{create_namespace, namespace_dir, StoreError};

const ARCHIVE_PREFIX: &str = "diff-";
const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.6fZ";

/// One archived change event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiffRecord {
    pub date: DateTime<Utc>,
    pub old_snapshot: Snapshot,
    pub new_snapshot: Snapshot,
    pub diff: SnapshotDiff,
}

/// Append-only log of change events, one file per event.
#[derive(Debug, Clone)]
pub struct DiffArchive {
    root: PathBuf,
}

impl DiffArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn entry_path(&self, key: &str, timestamp: DateTime<Utc>) -> PathBuf {
        namespace_dir(&self.root, key).join(format!(
            "{ARCHIVE_PREFIX}{}.json",
            timestamp.format(ARCHIVE_TIMESTAMP_FORMAT)
        ))
    }

    /// Writes a new entry; an existing entry for the same instant is never replaced.
    pub fn archive(
        &self,
        key: &str,
        old: &[Record],
        new: &[Record],
        diff: &SnapshotDiff,
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf, StoreError> {
        create_namespace(&self.root, key)?;
        let path = self.entry_path(key, timestamp);
        let record = DiffRecord {
            date: timestamp,
            old_snapshot: old.to_vec(),
            new_snapshot: new.to_vec(),
            diff: diff.clone(),
        };
        let json = serde_json::to_string_pretty(&record).map_err(|source| StoreError::Encode {
            path: path.clone(),
            source,
        })?;
        write_new(&path, json.as_bytes())?;
        debug!(source = key, path = %path.display(), "archived diff");
        Ok(path)
    }

    pub fn read(&self, path: &Path) -> Result<DiffRecord, StoreError> {
        let data = fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn write_new(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            return Err(StoreError::ArchiveCollision {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(StoreError::Write {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;
    use crate::catalog::detect_changes;

    fn at(micros: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0)
            .single()
            .expect("valid timestamp")
            + chrono::Duration::microseconds(i64::from(micros))
    }

    #[test]
    fn archives_a_readable_record() {
        let tmp = TempDir::new().expect("tempdir");
        let archive = DiffArchive::new(tmp.path());
        let new = vec![Record::titled("A")];
        let diff = detect_changes(None, &new).expect("changes");

        let path = archive
            .archive("politik-wahlen", &[], &new, &diff, at(0))
            .expect("archive");
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("diff-2024-03-01T06-00-00.000000Z.json")
        );

        let stored = archive.read(&path).expect("read");
        assert_eq!(stored.date, at(0));
        assert!(stored.old_snapshot.is_empty());
        assert_eq!(stored.new_snapshot, new);
        assert_eq!(stored.diff, diff);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("raw")).expect("json");
        for field in ["date", "oldSnapshot", "newSnapshot", "diff"] {
            assert!(raw.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn refuses_to_overwrite_an_entry() {
        let tmp = TempDir::new().expect("tempdir");
        let archive = DiffArchive::new(tmp.path());
        let new = vec![Record::titled("A")];
        let diff = detect_changes(None, &new).expect("changes");

        let first = archive
            .archive("k", &[], &new, &diff, at(5))
            .expect("first archive");
        let err = archive
            .archive("k", &[], &[], &diff, at(5))
            .expect_err("collision");
        assert!(matches!(err, StoreError::ArchiveCollision { .. }));
        assert_eq!(archive.read(&first).expect("read").new_snapshot, new);

        archive
            .archive("k", &[], &new, &diff, at(6))
            .expect("distinct microsecond");
    }
}
