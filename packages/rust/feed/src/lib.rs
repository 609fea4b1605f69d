//! Feed retrieval: the [`FeedSource`] seam and the arXiv RSS/Atom client.
//!
//! A feed fetch never fails the run. Transport and parse errors are logged
//! and surfaced as [`FeedOutcome::Failed`], which keeps "nothing new today"
//! ([`FeedOutcome::Empty`]) distinguishable from "the feed is broken".

mod parser;

use std::time::Duration;

use async_trait::async_trait;
use paperfilter_shared::{DocumentRecord, FeedConfig, PaperFilterError, Result};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

pub use parser::parse_feed;

/// Maximum number of redirects to follow when fetching the feed.
const MAX_REDIRECTS: usize = 5;

/// Maximum response size we consider valid (20 MB).
const MAX_RESPONSE_SIZE: u64 = 20 * 1024 * 1024;

/// User-Agent string for feed requests.
const USER_AGENT: &str = concat!("paperfilter/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// FeedOutcome
// ---------------------------------------------------------------------------

/// Result of a single feed fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedOutcome {
    /// At least one document, in the feed's native order.
    Fetched(Vec<DocumentRecord>),
    /// The feed was reachable and well-formed but listed nothing.
    Empty,
    /// The feed could not be fetched or parsed.
    Failed { reason: String },
}

impl FeedOutcome {
    fn from_documents(documents: Vec<DocumentRecord>) -> Self {
        if documents.is_empty() {
            Self::Empty
        } else {
            Self::Fetched(documents)
        }
    }

    /// The fetched documents; empty for `Empty` and `Failed`.
    pub fn into_documents(self) -> Vec<DocumentRecord> {
        match self {
            Self::Fetched(documents) => documents,
            Self::Empty | Self::Failed { .. } => Vec::new(),
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

// ---------------------------------------------------------------------------
// FeedSource
// ---------------------------------------------------------------------------

/// Yields a bounded batch of candidate documents from an external feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch at most `max_count` documents in feed order.
    ///
    /// Must not return an error: failures are reported as [`FeedOutcome::Failed`].
    async fn fetch(&self, max_count: usize) -> FeedOutcome;

    /// Feed name for diagnostics.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// ArxivFeed
// ---------------------------------------------------------------------------

/// HTTP feed client for arXiv listing endpoints (RSS or the Atom query API).
pub struct ArxivFeed {
    url: String,
    client: Client,
}

impl ArxivFeed {
    /// Build a feed client from the `[feed]` config section.
    pub fn new(config: &FeedConfig) -> Result<Self> {
        Self::with_url(&config.url, Duration::from_secs(config.timeout_secs))
    }

    pub fn with_url(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|e| PaperFilterError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    async fn fetch_body(&self) -> Result<String> {
        let url = &self.url;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PaperFilterError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaperFilterError::Network(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(PaperFilterError::validation(format!(
                    "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
                )));
            }
        }

        response
            .text()
            .await
            .map_err(|e| PaperFilterError::Network(format!("{url}: failed to read body: {e}")))
    }
}

#[async_trait]
impl FeedSource for ArxivFeed {
    #[instrument(skip_all, fields(url = %self.url, max_count = max_count))]
    async fn fetch(&self, max_count: usize) -> FeedOutcome {
        if max_count == 0 {
            debug!("max_count is 0, skipping feed request");
            return FeedOutcome::Empty;
        }

        let parsed = match self.fetch_body().await {
            Ok(body) => parse_feed(&body),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(mut documents) => {
                let available = documents.len();
                documents.truncate(max_count);
                info!(available, kept = documents.len(), "feed fetched");
                FeedOutcome::from_documents(documents)
            }
            Err(e) => {
                warn!(error = %e, "feed fetch failed");
                FeedOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/feeds/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn feed_for(server: &MockServer) -> ArxivFeed {
        ArxivFeed::with_url(&format!("{}/rss/cs.AI", server.uri()), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn fetch_truncates_to_max_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss/cs.AI"))
            .respond_with(ResponseTemplate::new(200).set_body_string(load_fixture("arxiv_rss2.xml")))
            .mount(&server)
            .await;

        let outcome = feed_for(&server).fetch(2).await;
        let documents = match outcome {
            FeedOutcome::Fetched(documents) => documents,
            other => panic!("expected Fetched, got {other:?}"),
        };
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].link, "https://arxiv.org/abs/2501.01234");
        assert_eq!(documents[1].link, "https://arxiv.org/abs/2501.01235");
    }

    #[tokio::test]
    async fn empty_feed_is_not_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<rss version="2.0"><channel><title>cs.AI</title></channel></rss>"#,
            ))
            .mount(&server)
            .await;

        assert_eq!(feed_for(&server).fetch(5).await, FeedOutcome::Empty);
    }

    #[tokio::test]
    async fn http_error_becomes_failed_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let outcome = feed_for(&server).fetch(5).await;
        assert!(outcome.is_failed());
        assert!(outcome.failure_reason().unwrap().contains("503"));
        assert!(outcome.into_documents().is_empty());
    }

    #[tokio::test]
    async fn unparseable_body_becomes_failed_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss><channel></rss>"))
            .mount(&server)
            .await;

        let outcome = feed_for(&server).fetch(5).await;
        assert!(outcome.failure_reason().unwrap().contains("parse error"));
    }

    #[tokio::test]
    async fn zero_max_count_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(feed_for(&server).fetch(0).await, FeedOutcome::Empty);
    }

    #[tokio::test]
    async fn unreachable_host_becomes_failed_outcome() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let feed = ArxivFeed::with_url("http://127.0.0.1:9/rss", Duration::from_secs(2)).unwrap();
        let outcome = feed.fetch(5).await;
        assert!(outcome.failure_reason().unwrap().contains("network error"));
    }
}
