//! Offline whole-word matcher.
//!
//! Scores each label by the fraction of its words that occur in the text as
//! whole words (case-insensitive, with an optional plural `s`). A label like
//! "machine learning" scores 0.5 against a text mentioning only "learning".

use async_trait::async_trait;
use paperfilter_shared::{PaperFilterError, Result};
use regex::Regex;

use crate::{Classifier, ScoreResult};

/// Keyword classifier that needs no network or model.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    fn label_score(text: &str, label: &str) -> Result<f64> {
        let words: Vec<&str> = label.split_whitespace().collect();
        if words.is_empty() {
            return Ok(0.0);
        }

        let mut matched = 0usize;
        for word in &words {
            let pattern = format!(r"(?i)\b{}s?\b", regex::escape(word));
            let re = Regex::new(&pattern)
                .map_err(|e| PaperFilterError::scoring(format!("bad keyword '{word}': {e}")))?;
            if re.is_match(text) {
                matched += 1;
            }
        }

        Ok(matched as f64 / words.len() as f64)
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str, labels: &[String]) -> Result<ScoreResult> {
        let scores = labels
            .iter()
            .map(|label| -> Result<(String, f64)> {
                Ok((label.clone(), Self::label_score(text, label)?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ScoreResult::new(scores))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
