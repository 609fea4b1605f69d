//! Relevance scoring against user topics.
//!
//! The classifier is a pluggable capability behind the [`Classifier`] trait:
//! given a text and N candidate labels it returns one score per label.
//! [`RelevanceScorer`] reduces that to a single decision value, the maximum
//! over the labels, and never substitutes a default score when the
//! classifier fails.
//!
//! Backends:
//! - [`HttpClassifier`] — zero-shot classification over HTTP
//! - [`BridgeClassifier`] — local subprocess speaking JSON lines
//! - [`KeywordClassifier`] — offline whole-word matcher

mod bridge;
mod http;
mod keyword;

use std::sync::Arc;

use async_trait::async_trait;
use paperfilter_shared::{
    ClassifierBackend, ClassifierConfig, PaperFilterError, Result, TopicSet,
};
use tracing::{debug, info};

pub use bridge::BridgeClassifier;
pub use http::HttpClassifier;
pub use keyword::KeywordClassifier;

// ---------------------------------------------------------------------------
// ScoreResult
// ---------------------------------------------------------------------------

/// Per-label relevance scores, in the order the classifier reported them.
///
/// Scores are independent; they are not required to sum to 1.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreResult {
    scores: Vec<(String, f64)>,
}

impl ScoreResult {
    pub fn new(scores: Vec<(String, f64)>) -> Self {
        Self { scores }
    }

    /// Zip parallel label/score arrays, as returned by zero-shot pipelines.
    pub fn from_parallel(labels: Vec<String>, scores: Vec<f64>) -> Result<Self> {
        if labels.len() != scores.len() {
            return Err(PaperFilterError::scoring(format!(
                "classifier returned {} labels but {} scores",
                labels.len(),
                scores.len()
            )));
        }
        Ok(Self::new(labels.into_iter().zip(scores).collect()))
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, score)| *score)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores.iter().map(|(l, s)| (l.as_str(), *s))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Highest score across all labels, `None` when empty.
    pub fn max(&self) -> Option<f64> {
        self.scores.iter().map(|(_, s)| *s).reduce(f64::max)
    }

    /// Reject empty results and scores outside `[0, 1]` (including NaN).
    pub fn validate(&self) -> Result<()> {
        if self.scores.is_empty() {
            return Err(PaperFilterError::scoring("classifier returned no scores"));
        }
        for (label, score) in &self.scores {
            if !(0.0..=1.0).contains(score) {
                return Err(PaperFilterError::scoring(format!(
                    "classifier returned score {score} for '{label}' outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// A zero-shot relevance classifier.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Score `text` against each of `labels`.
    async fn classify(&self, text: &str, labels: &[String]) -> Result<ScoreResult>;

    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Verify the capability is reachable before a run starts.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Release external resources (e.g. a child process).
    async fn shutdown(&self) {}
}

// ---------------------------------------------------------------------------
// RelevanceScorer
// ---------------------------------------------------------------------------

/// Reduces per-label classifier output to a single relevance score.
#[derive(Clone)]
pub struct RelevanceScorer {
    classifier: Arc<dyn Classifier>,
}

impl RelevanceScorer {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    pub fn backend(&self) -> &'static str {
        self.classifier.name()
    }

    /// Maximum relevance of `text` over `topics`, in `[0, 1]`.
    ///
    /// Every failure, including a malformed classifier result, is reported as
    /// [`PaperFilterError::ScoringUnavailable`].
    pub async fn score(&self, text: &str, topics: &TopicSet) -> Result<f64> {
        let result = self
            .classifier
            .classify(text, topics.labels())
            .await
            .map_err(into_scoring_error)?;

        result.validate()?;
        let score = result
            .max()
            .ok_or_else(|| PaperFilterError::scoring("classifier returned no scores"))?;

        debug!(backend = self.backend(), score, labels = result.len(), "scored text");
        Ok(score)
    }

    pub async fn health_check(&self) -> Result<()> {
        self.classifier
            .health_check()
            .await
            .map_err(into_scoring_error)
    }

    pub async fn shutdown(&self) {
        self.classifier.shutdown().await;
    }
}

fn into_scoring_error(err: PaperFilterError) -> PaperFilterError {
    match err {
        PaperFilterError::ScoringUnavailable(_) => err,
        other => PaperFilterError::scoring(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build the classifier selected by `[classifier].backend`.
///
/// The bridge backend spawns its subprocess here and waits for its ready
/// handshake, so a broken bridge fails at startup rather than per item.
pub async fn build_classifier(config: &ClassifierConfig) -> Result<Arc<dyn Classifier>> {
    info!(backend = %config.backend, "building relevance classifier");

    let classifier: Arc<dyn Classifier> = match config.backend {
        ClassifierBackend::Http => Arc::new(HttpClassifier::new(config)?),
        ClassifierBackend::Bridge => Arc::new(BridgeClassifier::spawn(config).await?),
        ClassifierBackend::Keyword => Arc::new(KeywordClassifier),
    };

    Ok(classifier)
}
