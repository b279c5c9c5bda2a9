pub mod differ;
pub mod extractor;
pub mod schema;

pub use differ::{
    detect_changes, diff_records, diff_snapshots, textual_diff, DetailDiff, DetailsDiff,
    DiffSummary, FieldChange, ItemChange, PatchError, RecordDiff, SnapshotDiff,
};
pub use extractor::{ExtractionError, ExtractionSelectors, Extractor};
pub use schema::{snapshot_digest, Detail, Record, Snapshot, Source, SourceConfigError};
