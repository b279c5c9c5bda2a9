pub mod batch;
pub mod error;
pub mod fetcher;
pub mod report;
pub mod runner;

pub use batch::Batch;
pub use error::{FailureKind, PipelineError, Stage, StageFailure};
pub use fetcher::{DocumentFetcher, FetchError, HttpFetcher, RawDocument, StaticFetcher};
pub use report::{BatchReport, SourceOutcome, SourceReport};
pub use runner::{Clock, Observation, PipelineRunner};
