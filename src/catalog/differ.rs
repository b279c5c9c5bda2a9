use std::hash::Hash;

use serde::{Deserialize, Serialize};
use similar::{capture_diff_slices, Algorithm, ChangeTag, DiffOp, TextDiff};
use thiserror::Error;

use crate::catalog::schema::{Detail, Record};

pub type SnapshotDiff = SequenceDiff<Record, RecordDiff>;
pub type DetailsDiff = SequenceDiff<Detail, DetailDiff>;

/// Ordered delta between two sequences. Unchanged items are implied: every old
/// item not removed or modified keeps its relative order in the new sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SequenceDiff<T, D> {
    pub old_len: usize,
    pub new_len: usize,
    pub entries: Vec<ItemChange<T, D>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ItemChange<T, D> {
    Added {
        index: usize,
        value: T,
    },
    Removed {
        index: usize,
        value: T,
    },
    #[serde(rename_all = "camelCase")]
    Modified {
        old_index: usize,
        new_index: usize,
        changes: D,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldChange<T> {
    pub old: T,
    pub new: T,
}

impl<T: PartialEq + Clone> FieldChange<T> {
    pub fn between(old: &T, new: &T) -> Option<Self> {
        (old != new).then(|| Self {
            old: old.clone(),
            new: new.clone(),
        })
    }

    fn apply_to(&self, current: &T, field: &'static str) -> Result<T, PatchError> {
        if *current != self.old {
            return Err(PatchError::FieldConflict { field });
        }
        Ok(self.new.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<FieldChange<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<FieldChange<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<FieldChange<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<DetailsDiff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_link: Option<FieldChange<Option<String>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetailDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<FieldChange<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldChange<String>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("diff expects {expected} items but got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("index {index} is out of range")]
    OutOfRange { index: usize },
    #[error("item at index {index} does not match the diff")]
    ItemConflict { index: usize },
    #[error("field {field} does not match the diff")]
    FieldConflict { field: &'static str },
    #[error("diff does not account for every item")]
    Incomplete,
}

/// Changes to a single item, applied against its old value.
pub trait Patch<T> {
    fn apply_to(&self, old: &T) -> Result<T, PatchError>;
}

impl Patch<Record> for RecordDiff {
    fn apply_to(&self, old: &Record) -> Result<Record, PatchError> {
        let mut record = old.clone();
        if let Some(change) = &self.title {
            record.title = change.apply_to(&old.title, "title")?;
        }
        if let Some(change) = &self.subtitle {
            record.subtitle = change.apply_to(&old.subtitle, "subtitle")?;
        }
        if let Some(change) = &self.description {
            record.description = change.apply_to(&old.description, "description")?;
        }
        if let Some(details) = &self.details {
            record.details = details.apply(&old.details)?;
        }
        if let Some(change) = &self.download_link {
            record.download_link = change.apply_to(&old.download_link, "downloadLink")?;
        }
        Ok(record)
    }
}

impl Patch<Detail> for DetailDiff {
    fn apply_to(&self, old: &Detail) -> Result<Detail, PatchError> {
        let mut detail = old.clone();
        if let Some(change) = &self.label {
            detail.label = change.apply_to(&old.label, "label")?;
        }
        if let Some(change) = &self.value {
            detail.value = change.apply_to(&old.value, "value")?;
        }
        Ok(detail)
    }
}

impl<T, D> SequenceDiff<T, D>
where
    T: Clone + PartialEq,
    D: Patch<T>,
{
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for entry in &self.entries {
            match entry {
                ItemChange::Added { .. } => summary.added += 1,
                ItemChange::Removed { .. } => summary.removed += 1,
                ItemChange::Modified { .. } => summary.modified += 1,
            }
        }
        summary
    }

    /// Rebuilds the new sequence from `old`.
    pub fn apply(&self, old: &[T]) -> Result<Vec<T>, PatchError> {
        if old.len() != self.old_len {
            return Err(PatchError::LengthMismatch {
                expected: self.old_len,
                actual: old.len(),
            });
        }

        let mut consumed = vec![false; old.len()];
        let mut slots: Vec<Option<T>> = vec![None; self.new_len];
        for entry in &self.entries {
            match entry {
                ItemChange::Added { index, value } => {
                    let slot = slots
                        .get_mut(*index)
                        .ok_or(PatchError::OutOfRange { index: *index })?;
                    *slot = Some(value.clone());
                }
                ItemChange::Removed { index, value } => {
                    let current = old
                        .get(*index)
                        .ok_or(PatchError::OutOfRange { index: *index })?;
                    if current != value {
                        return Err(PatchError::ItemConflict { index: *index });
                    }
                    consumed[*index] = true;
                }
                ItemChange::Modified {
                    old_index,
                    new_index,
                    changes,
                } => {
                    let current = old
                        .get(*old_index)
                        .ok_or(PatchError::OutOfRange { index: *old_index })?;
                    let slot = slots
                        .get_mut(*new_index)
                        .ok_or(PatchError::OutOfRange { index: *new_index })?;
                    *slot = Some(changes.apply_to(current)?);
                    consumed[*old_index] = true;
                }
            }
        }

        let mut kept = old
            .iter()
            .zip(consumed)
            .filter(|(_, consumed)| !consumed)
            .map(|(item, _)| item.clone());
        let rebuilt = slots
            .into_iter()
            .map(|slot| slot.or_else(|| kept.next()).ok_or(PatchError::Incomplete))
            .collect::<Result<Vec<_>, _>>()?;
        if kept.next().is_some() {
            return Err(PatchError::Incomplete);
        }
        Ok(rebuilt)
    }
}

/// Structural difference between two snapshots; `None` means no change.
///
/// Record order and detail order are both significant, and details are compared
/// as a sequence of pairs so repeated labels are told apart by position.
pub fn diff_snapshots(old: &[Record], new: &[Record]) -> Option<SnapshotDiff> {
    let diff = diff_sequence(old, new, diff_records);
    (!diff.is_empty()).then_some(diff)
}

/// Like [`diff_snapshots`], treating a missing previous snapshot as empty.
pub fn detect_changes(previous: Option<&[Record]>, current: &[Record]) -> Option<SnapshotDiff> {
    diff_snapshots(previous.unwrap_or_default(), current)
}

pub fn diff_records(old: &Record, new: &Record) -> RecordDiff {
    let details = diff_sequence(&old.details, &new.details, diff_details);
    RecordDiff {
        title: FieldChange::between(&old.title, &new.title),
        subtitle: FieldChange::between(&old.subtitle, &new.subtitle),
        description: FieldChange::between(&old.description, &new.description),
        details: (!details.entries.is_empty()).then_some(details),
        download_link: FieldChange::between(&old.download_link, &new.download_link),
    }
}

fn diff_details(old: &Detail, new: &Detail) -> DetailDiff {
    DetailDiff {
        label: FieldChange::between(&old.label, &new.label),
        value: FieldChange::between(&old.value, &new.value),
    }
}

/// Myers alignment over whole items; inside a replaced run, items are paired
/// by position and the surplus becomes plain additions or removals.
fn diff_sequence<T, D>(old: &[T], new: &[T], diff_item: fn(&T, &T) -> D) -> SequenceDiff<T, D>
where
    T: Clone + Ord + Hash,
{
    let mut entries = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, old, new) {
        match op {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete {
                old_index, old_len, ..
            } => push_removed(&mut entries, old, old_index..old_index + old_len),
            DiffOp::Insert {
                new_index, new_len, ..
            } => push_added(&mut entries, new, new_index..new_index + new_len),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                let paired = old_len.min(new_len);
                for offset in 0..paired {
                    entries.push(ItemChange::Modified {
                        old_index: old_index + offset,
                        new_index: new_index + offset,
                        changes: diff_item(&old[old_index + offset], &new[new_index + offset]),
                    });
                }
                push_removed(&mut entries, old, old_index + paired..old_index + old_len);
                push_added(&mut entries, new, new_index + paired..new_index + new_len);
            }
        }
    }
    SequenceDiff {
        old_len: old.len(),
        new_len: new.len(),
        entries,
    }
}

fn push_removed<T: Clone, D>(
    entries: &mut Vec<ItemChange<T, D>>,
    old: &[T],
    range: std::ops::Range<usize>,
) {
    entries.extend(range.map(|index| ItemChange::Removed {
        index,
        value: old[index].clone(),
    }));
}

fn push_added<T: Clone, D>(
    entries: &mut Vec<ItemChange<T, D>>,
    new: &[T],
    range: std::ops::Range<usize>,
) {
    entries.extend(range.map(|index| ItemChange::Added {
        index,
        value: new[index].clone(),
    }));
}

/// Unified line diff of the pretty JSON of both snapshots.
pub fn textual_diff(old: &[Record], new: &[Record]) -> String {
    let old_str = serde_json::to_string_pretty(old).unwrap_or_default();
    let new_str = serde_json::to_string_pretty(new).unwrap_or_default();
    let diff = TextDiff::from_lines(&old_str, &new_str);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let symbol = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        out.push_str(symbol);
        out.push_str(change.value());
        if change.missing_newline() {
            out.push('\n');
        }
    }
    out
}
