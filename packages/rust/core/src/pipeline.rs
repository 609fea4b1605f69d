//! End-to-end run: feed → score → threshold gate → artifact → snapshot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use paperfilter_artifacts::{
    ArtifactFailure, ArtifactFetcher, SavedArtifact, artifact_id_from_link,
};
use paperfilter_feed::{ArxivFeed, FeedOutcome, FeedSource};
use paperfilter_scorer::{RelevanceScorer, build_classifier};
use paperfilter_shared::{
    AcceptedRecord, AppConfig, DocumentRecord, PaperFilterError, Result, Threshold, TopicSet,
};
use paperfilter_storage::SnapshotStore;

/// Per-run parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on documents taken from the feed.
    pub max_count: usize,
    pub topics: TopicSet,
    pub threshold: Threshold,
    /// Directory holding the snapshot file.
    pub output_dir: PathBuf,
    /// Directory PDFs are downloaded into.
    pub artifact_dir: PathBuf,
    /// Items processed at once; 1 means sequential.
    pub concurrency: usize,
}

/// Terminal state of one feed item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Accepted(AcceptedRecord),
    Rejected { title: String, score: f64 },
    ScoringFailed { title: String, reason: String },
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Why the feed could not be read, if it could not.
    pub feed_failure: Option<String>,
    /// Per-item outcomes in feed order.
    pub outcomes: Vec<ItemOutcome>,
    /// PDFs written this run, in feed order.
    pub saved_artifacts: Vec<SavedArtifact>,
    /// Accepted items whose PDF could not be saved.
    pub artifact_failures: Vec<ArtifactFailure>,
    pub snapshot_path: PathBuf,
    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Number of documents the feed yielded.
    pub fn fetched(&self) -> usize {
        self.outcomes.len()
    }

    /// Accepted records in feed order, as written to the snapshot.
    pub fn accepted(&self) -> Vec<&AcceptedRecord> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ItemOutcome::Accepted(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    pub fn accepted_count(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Accepted(_)))
    }

    pub fn rejected_count(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Rejected { .. }))
    }

    pub fn scoring_failed_count(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::ScoringFailed { .. }))
    }

    pub fn artifact_failed_count(&self) -> usize {
        self.artifact_failures.len()
    }

    /// Total size of the PDFs written this run.
    pub fn downloaded_bytes(&self) -> u64 {
        self.saved_artifacts.iter().map(|a| a.bytes).sum()
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when an item clears the threshold.
    fn item_accepted(&self, record: &AcceptedRecord, current: usize, total: usize);
    /// Called when an item scores below the threshold.
    fn item_skipped(&self, title: &str, score: f64, current: usize, total: usize);
    /// Called when an item could not be scored.
    fn scoring_failed(&self, title: &str, reason: &str);
    /// Called when an accepted item's PDF could not be saved.
    fn artifact_failed(&self, failure: &ArtifactFailure);
    /// Called when the pipeline completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_accepted(&self, _record: &AcceptedRecord, _current: usize, _total: usize) {}
    fn item_skipped(&self, _title: &str, _score: f64, _current: usize, _total: usize) {}
    fn scoring_failed(&self, _title: &str, _reason: &str) {}
    fn artifact_failed(&self, _failure: &ArtifactFailure) {}
    fn done(&self, _report: &RunReport) {}
}

/// What a worker task hands back for one item.
struct ProcessedItem {
    outcome: ItemOutcome,
    saved: Option<SavedArtifact>,
    artifact_failure: Option<ArtifactFailure>,
}

/// The filter-and-fetch pipeline and its collaborators.
#[derive(Clone)]
pub struct Pipeline {
    feed: Arc<dyn FeedSource>,
    scorer: RelevanceScorer,
    fetcher: ArtifactFetcher,
}

impl Pipeline {
    pub fn new(feed: Arc<dyn FeedSource>, scorer: RelevanceScorer, fetcher: ArtifactFetcher) -> Self {
        Self {
            feed,
            scorer,
            fetcher,
        }
    }

    /// Wire the arXiv feed, the configured classifier backend, and the HTTP
    /// artifact fetcher.
    pub async fn from_app_config(config: &AppConfig) -> Result<Self> {
        let feed = Arc::new(ArxivFeed::new(&config.feed)?);
        let scorer = RelevanceScorer::new(build_classifier(&config.classifier).await?);
        let fetcher = ArtifactFetcher::http(&config.artifacts)?;
        Ok(Self::new(feed, scorer, fetcher))
    }

    pub fn scorer(&self) -> &RelevanceScorer {
        &self.scorer
    }

    /// Run once and write the snapshot.
    ///
    /// Only a snapshot write failure is an error. Feed, scoring and artifact
    /// failures are carried in the returned [`RunReport`].
    #[instrument(skip_all, fields(
        feed = %self.feed.name(),
        max_count = config.max_count,
        threshold = %config.threshold,
        topics = %config.topics,
    ))]
    pub async fn run(
        &self,
        config: &PipelineConfig,
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let store = SnapshotStore::new(&config.output_dir);

        info!(
            backend = self.scorer.backend(),
            concurrency = config.concurrency,
            "starting run"
        );

        // --- Phase 1: Feed ---
        progress.phase("Fetching feed");
        let outcome = self.feed.fetch(config.max_count).await;
        let feed_failure = outcome.failure_reason().map(str::to_string);
        if let Some(reason) = &feed_failure {
            warn!(%reason, "continuing with an empty batch");
        }
        if matches!(outcome, FeedOutcome::Empty) {
            info!("feed listed no documents");
        }
        let documents = outcome.into_documents();
        let total = documents.len();

        // --- Phase 2: Score, gate, download ---
        progress.phase("Scoring documents");
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(total);

        for document in documents {
            let title = document.title.clone();
            let sem = semaphore.clone();
            let pipeline = self.clone();
            let topics = config.topics.clone();
            let threshold = config.threshold;
            let artifact_dir = config.artifact_dir.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| PaperFilterError::scoring(format!("worker pool closed: {e}")))?;
                Ok::<_, PaperFilterError>(
                    pipeline
                        .process_item(document, &topics, threshold, &artifact_dir)
                        .await,
                )
            });
            handles.push((title, handle));
        }

        let mut outcomes = Vec::with_capacity(total);
        let mut saved_artifacts = Vec::new();
        let mut artifact_failures = Vec::new();

        // Awaited in spawn order so outcomes stay in feed order.
        for (i, (title, handle)) in handles.into_iter().enumerate() {
            let processed = match handle.await {
                Ok(Ok(processed)) => processed,
                Ok(Err(e)) => ProcessedItem::scoring_failed(title, e.to_string()),
                Err(e) => {
                    warn!(%title, error = %e, "item task failed");
                    ProcessedItem::scoring_failed(title, format!("worker task failed: {e}"))
                }
            };

            match &processed.outcome {
                ItemOutcome::Accepted(record) => progress.item_accepted(record, i + 1, total),
                ItemOutcome::Rejected { title, score } => {
                    progress.item_skipped(title, *score, i + 1, total)
                }
                ItemOutcome::ScoringFailed { title, reason } => {
                    progress.scoring_failed(title, reason)
                }
            }
            if let Some(saved) = processed.saved {
                saved_artifacts.push(saved);
            }
            if let Some(failure) = processed.artifact_failure {
                progress.artifact_failed(&failure);
                artifact_failures.push(failure);
            }
            outcomes.push(processed.outcome);
        }

        // --- Phase 3: Persist ---
        progress.phase("Writing snapshot");
        let accepted: Vec<AcceptedRecord> = outcomes
            .iter()
            .filter_map(|o| match o {
                ItemOutcome::Accepted(record) => Some(record.clone()),
                _ => None,
            })
            .collect();
        let snapshot_path = tokio::task::spawn_blocking(move || store.persist(&accepted))
            .await
            .map_err(|e| {
                PaperFilterError::persist(&config.output_dir, format!("writer task failed: {e}"))
            })??;

        let report = RunReport {
            feed_failure,
            outcomes,
            saved_artifacts,
            artifact_failures,
            snapshot_path,
            elapsed: start.elapsed(),
            finished_at: Utc::now(),
        };

        info!(
            fetched = report.fetched(),
            accepted = report.accepted_count(),
            rejected = report.rejected_count(),
            scoring_failed = report.scoring_failed_count(),
            artifact_failed = report.artifact_failed_count(),
            downloaded_bytes = report.downloaded_bytes(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run complete"
        );

        progress.done(&report);
        Ok(report)
    }

    async fn process_item(
        &self,
        document: DocumentRecord,
        topics: &TopicSet,
        threshold: Threshold,
        artifact_dir: &std::path::Path,
    ) -> ProcessedItem {
        let score = match self.scorer.score(document.scoring_text(), topics).await {
            Ok(score) => score,
            Err(e) => {
                warn!(title = %document.title, error = %e, "scoring failed, skipping item");
                return ProcessedItem::scoring_failed(document.title, e.to_string());
            }
        };

        if !threshold.accepts(score) {
            info!(
                title = %document.title,
                score = %format!("{score:.2}"),
                "below threshold, skipping"
            );
            return ProcessedItem {
                outcome: ItemOutcome::Rejected {
                    title: document.title,
                    score,
                },
                saved: None,
                artifact_failure: None,
            };
        }

        let saved = match artifact_id_from_link(&document.link) {
            Some(id) => self.fetcher.fetch(&id, artifact_dir).await,
            None => Err(ArtifactFailure {
                id: document.link.clone(),
                reason: "link has no artifact id".into(),
            }),
        };

        let (pdf_path, saved, artifact_failure) = match saved {
            Ok(saved) => (Some(saved.path.display().to_string()), Some(saved), None),
            Err(failure) => {
                warn!(title = %document.title, error = %failure, "artifact download failed");
                (None, None, Some(failure))
            }
        };

        debug!(title = %document.title, score, "accepted");
        ProcessedItem {
            outcome: ItemOutcome::Accepted(AcceptedRecord::new(document, score, pdf_path)),
            saved,
            artifact_failure,
        }
    }
}

impl ProcessedItem {
    fn scoring_failed(title: String, reason: String) -> Self {
        Self {
            outcome: ItemOutcome::ScoringFailed { title, reason },
            saved: None,
            artifact_failure: None,
        }
    }
}
