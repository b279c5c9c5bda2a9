use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{DiffSummary, Source};
use crate::pipeline::error::{FailureKind, Stage, StageFailure};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Unchanged,
    Changed {
        summary: DiffSummary,
        /// Archive entry written for this change; `None` on dry runs.
        archive: Option<PathBuf>,
    },
    Failed {
        stage: Stage,
        kind: FailureKind,
        reason: String,
    },
}

impl SourceOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Changed { .. } => "changed",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceReport {
    pub key: String,
    pub title: String,
    pub outcome: SourceOutcome,
    /// Number of extracted records, when extraction ran.
    pub records: Option<usize>,
    pub digest: Option<String>,
    pub elapsed_ms: u64,
}

impl SourceReport {
    pub fn failed(source: &Source, failure: &StageFailure, elapsed_ms: u64) -> Self {
        Self {
            key: source.key.clone(),
            title: source.title.clone(),
            outcome: SourceOutcome::Failed {
                stage: failure.stage,
                kind: failure.error.kind(),
                reason: failure.error.to_string(),
            },
            records: None,
            digest: None,
            elapsed_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, SourceOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
}

impl BatchReport {
    pub fn changed(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::Changed { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::Unchanged))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::Failed { .. }))
    }

    pub fn source(&self, key: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.key == key)
    }

    fn count(&self, predicate: impl Fn(&SourceOutcome) -> bool) -> usize {
        self.sources.iter().filter(|s| predicate(&s.outcome)).count()
    }
}
