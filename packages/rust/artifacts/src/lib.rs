//! PDF artifact download and local storage.
//!
//! The fetcher is the failure boundary for downloads: transport and
//! filesystem errors come back as [`ArtifactFailure`] so a single bad PDF
//! never stops a run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use paperfilter_shared::fs::{ensure_dir, write_atomic};
use paperfilter_shared::{ARTIFACT_ID_PLACEHOLDER, ArtifactsConfig, PaperFilterError, Result};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Leading bytes of every PDF file.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Largest artifact accepted (100 MB).
const MAX_ARTIFACT_SIZE: u64 = 100 * 1024 * 1024;

/// User-Agent string for artifact requests.
const USER_AGENT: &str = concat!("paperfilter/", env!("CARGO_PKG_VERSION"));

/// A download that did not produce a file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("artifact {id}: {reason}")]
pub struct ArtifactFailure {
    pub id: String,
    pub reason: String,
}

impl ArtifactFailure {
    fn new(id: &str, reason: impl std::fmt::Display) -> Self {
        Self {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A PDF written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub path: PathBuf,
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the file contents.
    pub sha256: String,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Fetches the raw bytes of an artifact by id.
#[async_trait]
pub trait ArtifactTransport: Send + Sync {
    async fn get(&self, id: &str) -> Result<Vec<u8>>;
}

/// Downloads artifacts by rendering `url_template` with the artifact id.
pub struct HttpArtifactTransport {
    url_template: String,
    client: Client,
}

impl HttpArtifactTransport {
    pub fn new(config: &ArtifactsConfig) -> Result<Self> {
        if !config.url_template.contains(ARTIFACT_ID_PLACEHOLDER) {
            return Err(PaperFilterError::config(format!(
                "artifacts.url_template must contain {ARTIFACT_ID_PLACEHOLDER}"
            )));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaperFilterError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url_template: config.url_template.clone(),
            client,
        })
    }

    fn url_for(&self, id: &str) -> String {
        self.url_template.replace(ARTIFACT_ID_PLACEHOLDER, id)
    }
}

#[async_trait]
impl ArtifactTransport for HttpArtifactTransport {
    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let url = self.url_for(id);
        debug!(%url, "downloading artifact");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PaperFilterError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaperFilterError::Network(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_ARTIFACT_SIZE {
                return Err(PaperFilterError::validation(format!(
                    "{url}: artifact too large ({len} bytes, max {MAX_ARTIFACT_SIZE})"
                )));
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PaperFilterError::Network(format!("{url}: failed to read body: {e}")))?;
        Ok(body.to_vec())
    }
}

// ---------------------------------------------------------------------------
// ArtifactFetcher
// ---------------------------------------------------------------------------

/// Downloads artifacts and stores them as `{id}.pdf`.
#[derive(Clone)]
pub struct ArtifactFetcher {
    transport: Arc<dyn ArtifactTransport>,
}

impl ArtifactFetcher {
    pub fn new(transport: Arc<dyn ArtifactTransport>) -> Self {
        Self { transport }
    }

    /// Fetcher over HTTP configured from the `[artifacts]` section.
    pub fn http(config: &ArtifactsConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpArtifactTransport::new(config)?)))
    }

    /// Download artifact `id` into `destination_dir`.
    ///
    /// The file appears under its final name only once it is complete.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn fetch(
        &self,
        id: &str,
        destination_dir: &Path,
    ) -> std::result::Result<SavedArtifact, ArtifactFailure> {
        validate_id(id).map_err(|e| ArtifactFailure::new(id, e))?;

        let payload = self
            .transport
            .get(id)
            .await
            .map_err(|e| ArtifactFailure::new(id, e))?;

        if !payload.starts_with(PDF_MAGIC) {
            warn!(bytes = payload.len(), "downloaded payload is not a PDF");
            return Err(ArtifactFailure::new(id, "response is not a PDF document"));
        }

        let dir = destination_dir.to_path_buf();
        let path = dir.join(format!("{id}.pdf"));
        let saved = tokio::task::spawn_blocking(move || store_payload(&dir, path, &payload))
            .await
            .map_err(|e| ArtifactFailure::new(id, format!("writer task failed: {e}")))?
            .map_err(|e| ArtifactFailure::new(id, e))?;

        info!(
            path = %saved.path.display(),
            bytes = saved.bytes,
            sha256 = %saved.sha256,
            "artifact saved"
        );
        Ok(saved)
    }
}

/// Write `payload` to `path` under `dir` and hash it. Blocking.
fn store_payload(dir: &Path, path: PathBuf, payload: &[u8]) -> Result<SavedArtifact> {
    ensure_dir(dir)?;
    write_atomic(&path, payload)?;
    Ok(SavedArtifact {
        path,
        bytes: payload.len() as u64,
        sha256: format!("{:x}", Sha256::digest(payload)),
    })
}

/// Reject ids that would escape the destination directory.
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(PaperFilterError::validation("empty artifact id"));
    }
    if id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(PaperFilterError::validation(format!(
            "artifact id '{id}' is not a plain file name"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The artifact id of an abstract link: its last non-empty path segment.
///
/// `http://arxiv.org/abs/2401.01234v2` yields `2401.01234v2`.
pub fn artifact_id_from_link(link: &str) -> Option<String> {
    let last_segment = |path: &str| {
        path.split('/')
            .rev()
            .find(|s| !s.is_empty())
            .map(str::to_string)
    };

    match Url::parse(link.trim()) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string)),
        Err(_) => last_segment(link.trim()),
    }
}

/// Open a downloaded file with the platform's default viewer.
pub fn open_artifact(path: &Path) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(path).spawn()?;
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        std::process::Command::new("xdg-open").arg(path).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", ""])
            .arg(path)
            .spawn()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PDF_BYTES: &[u8] = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n%%EOF\n";

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("pf-artifacts-test-{}", uuid::Uuid::now_v7()))
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    fn fetcher_for(server: &MockServer) -> ArtifactFetcher {
        let config = ArtifactsConfig {
            url_template: format!("{}/pdf/{{id}}.pdf", server.uri()),
            timeout_secs: 5,
            ..ArtifactsConfig::default()
        };
        ArtifactFetcher::http(&config).unwrap()
    }

    struct StaticTransport(Vec<u8>);

    #[async_trait]
    impl ArtifactTransport for StaticTransport {
        async fn get(&self, _id: &str) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn downloads_and_saves_pdf() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pdf/2501.01234.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
            .expect(1)
            .mount(&server)
            .await;

        let dir = temp_dir().join("nested").join("pdfs");
        let saved = fetcher_for(&server).fetch("2501.01234", &dir).await.unwrap();

        assert_eq!(saved.path, dir.join("2501.01234.pdf"));
        assert_eq!(saved.bytes, PDF_BYTES.len() as u64);
        assert_eq!(saved.sha256.len(), 64);
        assert_eq!(std::fs::read(&saved.path).unwrap(), PDF_BYTES);
        assert_eq!(file_names(&dir), ["2501.01234.pdf"]);

        std::fs::remove_dir_all(dir.parent().unwrap().parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn http_error_is_failure_without_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = temp_dir();
        let failure = fetcher_for(&server).fetch("2501.09999", &dir).await.unwrap_err();

        assert_eq!(failure.id, "2501.09999");
        assert!(failure.reason.contains("404"));
        assert!(file_names(&dir).is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn non_pdf_payload_is_rejected() {
        let fetcher = ArtifactFetcher::new(Arc::new(StaticTransport(
            b"<html>rate limited</html>".to_vec(),
        )));
        let dir = temp_dir();

        let failure = fetcher.fetch("2501.01234", &dir).await.unwrap_err();
        assert!(failure.reason.contains("not a PDF"));
        assert!(file_names(&dir).is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("2501.01234.pdf"), b"stale").unwrap();

        let fetcher = ArtifactFetcher::new(Arc::new(StaticTransport(PDF_BYTES.to_vec())));
        fetcher.fetch("2501.01234", &dir).await.unwrap();

        assert_eq!(std::fs::read(dir.join("2501.01234.pdf")).unwrap(), PDF_BYTES);
        assert_eq!(file_names(&dir), ["2501.01234.pdf"]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_fetches_share_a_directory() {
        let fetcher = ArtifactFetcher::new(Arc::new(StaticTransport(PDF_BYTES.to_vec())));
        let dir = temp_dir();

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let fetcher = fetcher.clone();
                let dir = dir.clone();
                tokio::spawn(async move { fetcher.fetch(&format!("2501.0000{n}"), &dir).await })
            })
            .collect();

        let expected_sha = format!("{:x}", Sha256::digest(PDF_BYTES));
        for handle in handles {
            let saved = handle.await.unwrap().unwrap();
            assert_eq!(saved.sha256, expected_sha);
        }

        let names = file_names(&dir);
        assert_eq!(names.len(), 8);
        assert!(names.iter().all(|n| n.ends_with(".pdf")));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn unwritable_destination_is_failure() {
        let root = temp_dir();
        std::fs::create_dir_all(&root).unwrap();
        let blocker = root.join("pdfs");
        std::fs::write(&blocker, b"x").unwrap();

        let fetcher = ArtifactFetcher::new(Arc::new(StaticTransport(PDF_BYTES.to_vec())));
        let failure = fetcher.fetch("2501.01234", &blocker).await.unwrap_err();
        assert_eq!(failure.id, "2501.01234");

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected() {
        let fetcher = ArtifactFetcher::new(Arc::new(StaticTransport(PDF_BYTES.to_vec())));
        let dir = temp_dir();

        for id in ["", ".", "..", "../escape", "a/b", r"a\b"] {
            let failure = fetcher.fetch(id, &dir).await.unwrap_err();
            assert_eq!(failure.id, id);
        }
        assert!(!dir.exists());
    }

    #[test]
    fn template_without_placeholder_is_config_error() {
        let config = ArtifactsConfig {
            url_template: "https://arxiv.org/pdf/latest.pdf".into(),
            ..ArtifactsConfig::default()
        };
        assert!(matches!(
            HttpArtifactTransport::new(&config),
            Err(PaperFilterError::Config { .. })
        ));
    }

    #[test]
    fn id_from_link() {
        assert_eq!(
            artifact_id_from_link("http://arxiv.org/abs/2401.01234v2").as_deref(),
            Some("2401.01234v2")
        );
        assert_eq!(
            artifact_id_from_link("http://arxiv.org/abs/2312.00002/").as_deref(),
            Some("2312.00002")
        );
        assert_eq!(
            artifact_id_from_link("abs/2501.01234").as_deref(),
            Some("2501.01234")
        );
        assert_eq!(artifact_id_from_link("https://arxiv.org/"), None);
        assert_eq!(artifact_id_from_link(""), None);
    }
}
