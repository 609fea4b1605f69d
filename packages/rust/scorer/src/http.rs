//! Zero-shot classification over HTTP (Hugging Face inference format).

use std::time::Duration;

use async_trait::async_trait;
use paperfilter_shared::{ClassifierConfig, PaperFilterError, Result, classifier_api_key};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Classifier, ScoreResult};

/// User-Agent string for classifier requests.
const USER_AGENT: &str = concat!("paperfilter/", env!("CARGO_PKG_VERSION"));

/// Text classified by the startup health check.
const PROBE_TEXT: &str = "Large language models for financial forecasting.";

#[derive(Debug, Serialize)]
struct ZeroShotRequest<'a> {
    inputs: &'a str,
    parameters: ZeroShotParameters<'a>,
}

#[derive(Debug, Serialize)]
struct ZeroShotParameters<'a> {
    candidate_labels: &'a [String],
    multi_label: bool,
}

/// The two response shapes served by zero-shot endpoints.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ZeroShotResponse {
    /// `{"sequence": "...", "labels": [...], "scores": [...]}`
    Parallel { labels: Vec<String>, scores: Vec<f64> },
    /// `[{"label": "...", "score": 0.9}, ...]`
    Pairs(Vec<LabelScore>),
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

impl ZeroShotResponse {
    fn into_result(self) -> Result<ScoreResult> {
        match self {
            Self::Parallel { labels, scores } => ScoreResult::from_parallel(labels, scores),
            Self::Pairs(pairs) => Ok(ScoreResult::new(
                pairs.into_iter().map(|p| (p.label, p.score)).collect(),
            )),
        }
    }
}

/// Zero-shot classifier reached over HTTP.
pub struct HttpClassifier {
    endpoint: String,
    api_key: Option<String>,
    multi_label: bool,
    client: Client,
}

impl HttpClassifier {
    /// Build from the `[classifier]` section; the token is read from the env
    /// var named by `api_key_env`.
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaperFilterError::Network(format!("failed to build HTTP client: {e}")))?;

        let api_key = classifier_api_key(config);
        if api_key.is_none() {
            debug!(env = %config.api_key_env, "no classifier token set, sending anonymous requests");
        }

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key,
            multi_label: config.multi_label,
            client,
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str, labels: &[String]) -> Result<ScoreResult> {
        let endpoint = &self.endpoint;
        let body = ZeroShotRequest {
            inputs: text,
            parameters: ZeroShotParameters {
                candidate_labels: labels,
                multi_label: self.multi_label,
            },
        };

        let mut request = self.client.post(endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PaperFilterError::scoring(format!("{endpoint}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(PaperFilterError::scoring(format!(
                "{endpoint}: HTTP {status}: {detail}"
            )));
        }

        let parsed: ZeroShotResponse = response.json().await.map_err(|e| {
            PaperFilterError::scoring(format!("{endpoint}: unexpected response body: {e}"))
        })?;

        parsed.into_result()
    }

    fn name(&self) -> &'static str {
        "http"
    }

    async fn health_check(&self) -> Result<()> {
        let labels = ["finance".to_string()];
        let result = self.classify(PROBE_TEXT, &labels).await?;
        result.validate()?;
        info!(endpoint = %self.endpoint, "classifier endpoint reachable");
        Ok(())
    }
}
