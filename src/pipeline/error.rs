use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ExtractionError;
use crate::pipeline::fetcher::FetchError;
use crate::store::StoreError;

/// Position of a source's run in the pipeline state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Extracting,
    Loading,
    Diffing,
    Archiving,
    Persisting,
    /// The run was lost before reporting which stage it had reached.
    Unknown,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Loading => "loading",
            Self::Diffing => "diffing",
            Self::Archiving => "archiving",
            Self::Persisting => "persisting",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("pipeline task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Extraction,
    StorageRead,
    StorageWrite,
    ArchiveCollision,
    Aborted,
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Fetch(_) => FailureKind::Fetch,
            Self::Extraction(_) => FailureKind::Extraction,
            Self::Storage(StoreError::ArchiveCollision { .. }) => FailureKind::ArchiveCollision,
            Self::Storage(err) if err.is_read() => FailureKind::StorageRead,
            Self::Storage(_) => FailureKind::StorageWrite,
            Self::Aborted(_) => FailureKind::Aborted,
        }
    }
}

/// A pipeline error tagged with the stage it interrupted.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

pub(crate) trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageFailure>;
}

impl<T, E: Into<PipelineError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, StageFailure> {
        self.map_err(|err| StageFailure {
            stage,
            error: err.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn classifies_storage_failures() {
        let collision: PipelineError = StoreError::ArchiveCollision {
            path: PathBuf::from("diff.json"),
        }
        .into();
        assert_eq!(collision.kind(), FailureKind::ArchiveCollision);

        let read: PipelineError = StoreError::Read {
            path: PathBuf::from("latest-snapshot.json"),
            source: std::io::Error::other("denied"),
        }
        .into();
        assert_eq!(read.kind(), FailureKind::StorageRead);

        let invalid = ExtractionError::InvalidSelector {
            role: "entry",
            selector: "div[".to_string(),
            reason: "unexpected end".to_string(),
        };
        let failure: Result<(), _> = Err(invalid).at(Stage::Extracting);
        let failure = failure.expect_err("failure");
        assert_eq!(failure.error.kind(), FailureKind::Extraction);
        assert_eq!(
            failure.to_string(),
            "extracting failed: invalid entry selector \"div[\": unexpected end"
        );
    }
}
