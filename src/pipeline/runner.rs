use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::catalog::{
    detect_changes, snapshot_digest, ExtractionError, ExtractionSelectors, Extractor, Snapshot,
    SnapshotDiff, Source,
};
use crate::pipeline::batch::Batch;
use crate::pipeline::error::{AtStage, PipelineError, Stage, StageFailure};
use crate::pipeline::fetcher::DocumentFetcher;
use crate::pipeline::report::{BatchReport, SourceOutcome, SourceReport};
use crate::store::{DiffArchive, SnapshotStore};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Result of fetching, extracting and comparing one source, before anything
/// is written.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub previous: Option<Snapshot>,
    pub current: Snapshot,
    pub diff: Option<SnapshotDiff>,
}

/// Drives fetch → extract → load → diff → archive → persist for each source.
#[derive(Clone)]
pub struct PipelineRunner {
    fetcher: Arc<dyn DocumentFetcher>,
    extractor: Arc<Extractor>,
    snapshots: SnapshotStore,
    archive: DiffArchive,
    clock: Clock,
    max_concurrency: usize,
    dry_run: bool,
}

impl PipelineRunner {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        selectors: &ExtractionSelectors,
        snapshots: SnapshotStore,
        archive: DiffArchive,
    ) -> Result<Self, ExtractionError> {
        Ok(Self {
            fetcher,
            extractor: Arc::new(Extractor::new(selectors)?),
            snapshots,
            archive,
            clock: Arc::new(Utc::now),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            dry_run: false,
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// In dry-run mode nothing is archived or persisted.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Runs every source of the batch; at most `max_concurrency` at a time.
    /// A failing or panicking source never affects the others.
    pub async fn run_batch(&self, batch: &Batch) -> BatchReport {
        let started_at = Utc::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let handles: Vec<_> = batch
            .sources()
            .iter()
            .cloned()
            .map(|source| {
                let runner = self.clone();
                let semaphore = Arc::clone(&semaphore);
                let task_source = source.clone();
                let handle = tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    runner.run_source(&task_source).await
                });
                (source, handle)
            })
            .collect();

        let mut sources = Vec::with_capacity(handles.len());
        for (source, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(join_error) => {
                    warn!(source = %source.key, "pipeline task aborted: {join_error}");
                    let failure = StageFailure {
                        stage: Stage::Unknown,
                        error: PipelineError::Aborted(join_error.to_string()),
                    };
                    SourceReport::failed(&source, &failure, 0)
                }
            };
            sources.push(report);
        }

        let report = BatchReport {
            started_at,
            finished_at: Utc::now(),
            sources,
        };
        info!(
            sources = report.sources.len(),
            changed = report.changed(),
            failed = report.failed(),
            "batch done"
        );
        report
    }

    pub async fn run_source(&self, source: &Source) -> SourceReport {
        let started = Instant::now();
        info!(source = %source.key, "processing {}", source.title);

        let result = async {
            if !self.dry_run {
                self.snapshots
                    .ensure_namespace(&source.key)
                    .at(Stage::Loading)?;
            }
            let observation = self.observe(source).await?;
            self.commit(source, observation)
        }
        .await;
        self.report(source, result, started)
    }

    /// Observes one source without writing anything and hands the
    /// observation back alongside the report.
    pub async fn check_source(&self, source: &Source) -> (SourceReport, Option<Observation>) {
        let started = Instant::now();
        info!(source = %source.key, "checking {}", source.title);

        match self.observe(source).await {
            Ok(observation) => {
                let outcome = preview(&observation);
                let report = self.report(source, Ok((outcome, observation.current.clone())), started);
                (report, Some(observation))
            }
            Err(failure) => (self.report(source, Err(failure), started), None),
        }
    }

    fn report(
        &self,
        source: &Source,
        result: Result<(SourceOutcome, Snapshot), StageFailure>,
        started: Instant,
    ) -> SourceReport {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok((outcome, current)) => {
                match &outcome {
                    SourceOutcome::Changed { summary, .. } => info!(
                        source = %source.key,
                        added = summary.added,
                        removed = summary.removed,
                        modified = summary.modified,
                        "found updates"
                    ),
                    _ => info!(source = %source.key, "no updates"),
                }
                SourceReport {
                    key: source.key.clone(),
                    title: source.title.clone(),
                    outcome,
                    records: Some(current.len()),
                    digest: Some(snapshot_digest(&current)),
                    elapsed_ms,
                }
            }
            Err(failure) => {
                warn!(source = %source.key, stage = %failure.stage, "pipeline failed: {}", failure.error);
                SourceReport::failed(source, &failure, elapsed_ms)
            }
        }
    }

    /// Fetches, extracts and compares against the stored snapshot without writing.
    pub async fn observe(&self, source: &Source) -> Result<Observation, StageFailure> {
        debug!(source = %source.key, stage = %Stage::Fetching, "entering stage");
        let document = self.fetcher.fetch(&source.locator).await.at(Stage::Fetching)?;

        debug!(source = %source.key, stage = %Stage::Extracting, bytes = document.body.len(), "entering stage");
        let current = self
            .extractor
            .extract_bytes(&document.body)
            .at(Stage::Extracting)?;

        debug!(source = %source.key, stage = %Stage::Loading, records = current.len(), "entering stage");
        let previous = self.snapshots.load(&source.key).at(Stage::Loading)?;

        debug!(source = %source.key, stage = %Stage::Diffing, first_run = previous.is_none(), "entering stage");
        let diff = detect_changes(previous.as_deref(), &current);

        Ok(Observation {
            previous,
            current,
            diff,
        })
    }

    fn commit(
        &self,
        source: &Source,
        observation: Observation,
    ) -> Result<(SourceOutcome, Snapshot), StageFailure> {
        let Observation {
            previous,
            current,
            diff,
        } = observation;
        let Some(diff) = diff else {
            return Ok((SourceOutcome::Unchanged, current));
        };
        let summary = diff.summary();
        if self.dry_run {
            return Ok((
                SourceOutcome::Changed {
                    summary,
                    archive: None,
                },
                current,
            ));
        }

        debug!(source = %source.key, stage = %Stage::Archiving, "entering stage");
        let archive = self
            .archive
            .archive(
                &source.key,
                previous.as_deref().unwrap_or_default(),
                &current,
                &diff,
                (self.clock)(),
            )
            .at(Stage::Archiving)?;

        debug!(source = %source.key, stage = %Stage::Persisting, "entering stage");
        self.snapshots
            .save(&source.key, &current)
            .at(Stage::Persisting)?;

        Ok((
            SourceOutcome::Changed {
                summary,
                archive: Some(archive),
            },
            current,
        ))
    }
}

fn preview(observation: &Observation) -> SourceOutcome {
    match &observation.diff {
        Some(diff) => SourceOutcome::Changed {
            summary: diff.summary(),
            archive: None,
        },
        None => SourceOutcome::Unchanged,
    }
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("snapshots", &self.snapshots)
            .field("archive", &self.archive)
            .field("max_concurrency", &self.max_concurrency)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

