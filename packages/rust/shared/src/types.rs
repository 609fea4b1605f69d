//! Core domain types: feed documents, accepted records, topics, and threshold.

use serde::{Deserialize, Serialize};

use crate::error::{PaperFilterError, Result};

/// Fixed file name of the run snapshot inside the output directory.
pub const SNAPSHOT_FILE_NAME: &str = "arxiv_ai_papers.json";

/// Author placeholder for feed entries that carry no author information.
pub const UNKNOWN_AUTHORS: &str = "Unknown";

// ---------------------------------------------------------------------------
// DocumentRecord
// ---------------------------------------------------------------------------

/// One candidate item as yielded by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Entry title.
    pub title: String,
    /// Free-form author list, `"Unknown"` if the feed had none.
    pub authors: String,
    /// Abstract / description text.
    pub summary: String,
    /// Timestamp exactly as the feed provided it.
    pub published: String,
    /// Link to the entry's landing page.
    pub link: String,
}

impl DocumentRecord {
    /// Text handed to the relevance classifier: the summary, or the title when
    /// the feed carried no summary.
    pub fn scoring_text(&self) -> &str {
        if self.summary.trim().is_empty() {
            &self.title
        } else {
            &self.summary
        }
    }
}

// ---------------------------------------------------------------------------
// AcceptedRecord
// ---------------------------------------------------------------------------

/// A document that cleared the threshold gate, augmented with its score and
/// the location of its downloaded artifact.
///
/// Built once per accepted document and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedRecord {
    #[serde(flatten)]
    pub document: DocumentRecord,
    /// Maximum relevance over the run's topics, in `[0, 1]`.
    pub relevance_score: f64,
    /// Path of the downloaded PDF, empty when the download failed.
    pub pdf_path: String,
}

impl AcceptedRecord {
    pub fn new(document: DocumentRecord, relevance_score: f64, pdf_path: Option<String>) -> Self {
        Self {
            document,
            relevance_score,
            pdf_path: pdf_path.unwrap_or_default(),
        }
    }

    /// Whether the artifact download succeeded for this record.
    pub fn has_artifact(&self) -> bool {
        !self.pdf_path.is_empty()
    }
}

// ---------------------------------------------------------------------------
// TopicSet
// ---------------------------------------------------------------------------

/// Ordered, normalized, non-empty set of interest labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet(Vec<String>);

impl TopicSet {
    /// Normalize and deduplicate the given labels.
    ///
    /// Each label is trimmed, internal whitespace runs are collapsed, and the
    /// result is lowercased. Empty labels are dropped; later duplicates are
    /// dropped in favor of the first occurrence.
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut topics: Vec<String> = Vec::new();
        for label in labels {
            let normalized = normalize_label(label.as_ref());
            if normalized.is_empty() || topics.contains(&normalized) {
                continue;
            }
            topics.push(normalized);
        }

        if topics.is_empty() {
            return Err(PaperFilterError::validation(
                "topic set is empty after normalization",
            ));
        }

        Ok(Self(topics))
    }

    /// Parse a comma-separated topic list (`"finance, LLM,machine learning"`).
    pub fn parse_csv(csv: &str) -> Result<Self> {
        Self::new(csv.split(','))
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for TopicSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Threshold
// ---------------------------------------------------------------------------

/// Minimum relevance score for acceptance, validated to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&value) {
            return Err(PaperFilterError::validation(format!(
                "threshold {value} outside [0, 1]"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Inclusive comparison: a score equal to the threshold is accepted.
    pub fn accepts(&self, score: f64) -> bool {
        score >= self.0
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> DocumentRecord {
        DocumentRecord {
            title: "Agents for Portfolio Rebalancing".into(),
            authors: "Ada Lovelace, Alan Turing".into(),
            summary: "We study LLM agents in finance.".into(),
            published: "Mon, 06 Jan 2025 00:00:00 -0500".into(),
            link: "https://arxiv.org/abs/2501.01234".into(),
        }
    }

    #[test]
    fn topic_set_normalizes_and_dedups() {
        let topics = TopicSet::parse_csv("  Finance ,LLM,  machine   Learning,, llm ").unwrap();
        assert_eq!(topics.labels(), ["finance", "llm", "machine learning"]);
        assert_eq!(topics.to_string(), "finance, llm, machine learning");
    }

    #[test]
    fn topic_set_rejects_empty() {
        assert!(TopicSet::parse_csv(" , ,").is_err());
        assert!(TopicSet::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn threshold_is_inclusive() {
        let t = Threshold::new(0.6).unwrap();
        assert!(t.accepts(0.6));
        assert!(t.accepts(0.65));
        assert!(!t.accepts(0.599));
    }

    #[test]
    fn threshold_range_checked() {
        assert!(Threshold::new(0.0).is_ok());
        assert!(Threshold::new(1.0).is_ok());
        assert!(Threshold::new(-0.1).is_err());
        assert!(Threshold::new(1.01).is_err());
        assert!(Threshold::new(f64::NAN).is_err());
    }

    #[test]
    fn scoring_text_falls_back_to_title() {
        let mut doc = sample_document();
        assert_eq!(doc.scoring_text(), "We study LLM agents in finance.");
        doc.summary = "   ".into();
        assert_eq!(doc.scoring_text(), "Agents for Portfolio Rebalancing");
    }

    #[test]
    fn accepted_record_serializes_flat_in_snapshot_order() {
        let record = AcceptedRecord::new(sample_document(), 0.8, None);
        assert!(!record.has_artifact());

        let json = serde_json::to_string(&record).expect("serialize");
        let positions: Vec<usize> = [
            "\"title\"",
            "\"authors\"",
            "\"summary\"",
            "\"published\"",
            "\"link\"",
            "\"relevance_score\"",
            "\"pdf_path\"",
        ]
        .iter()
        .map(|key| json.find(key).expect("field present"))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(json.contains("\"pdf_path\":\"\""));

        let parsed: AcceptedRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, record);
    }
}
