//! Application configuration for paperfilter.
//!
//! User config lives at `~/.paperfilter/paperfilter.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PaperFilterError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "paperfilter.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".paperfilter";

/// Placeholder the artifact URL template must contain.
pub const ARTIFACT_ID_PLACEHOLDER: &str = "{id}";

// ---------------------------------------------------------------------------
// Config structs (matching paperfilter.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Feed endpoint settings.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Relevance classifier settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Artifact download settings.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Number of latest entries to pull from the feed.
    #[serde(default = "default_num_papers")]
    pub num_papers: usize,

    /// Comma-separated interest topics.
    #[serde(default = "default_preferences")]
    pub preferences: String,

    /// Minimum relevance score (0-1) to keep a paper.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Directory receiving the snapshot and the PDF subdirectory.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Items scored and downloaded at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            num_papers: default_num_papers(),
            preferences: default_preferences(),
            threshold: default_threshold(),
            output_dir: default_output_dir(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_num_papers() -> usize {
    5
}
fn default_preferences() -> String {
    "finance,llm,machine learning".into()
}
fn default_threshold() -> f64 {
    0.5
}
fn default_output_dir() -> String {
    "papers".into()
}
fn default_concurrency() -> usize {
    1
}

/// `[feed]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// RSS/Atom endpoint listing candidate papers.
    #[serde(default = "default_feed_url")]
    pub url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            timeout_secs: default_feed_timeout(),
        }
    }
}

fn default_feed_url() -> String {
    "http://export.arxiv.org/rss/cs.AI".into()
}
fn default_feed_timeout() -> u64 {
    30
}

/// Which classifier implementation scores documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    /// Zero-shot classification over HTTP (Hugging Face inference format).
    Http,
    /// Local subprocess speaking JSON lines.
    Bridge,
    /// Offline keyword matcher.
    Keyword,
}

impl ClassifierBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Bridge => "bridge",
            Self::Keyword => "keyword",
        }
    }
}

impl std::str::FromStr for ClassifierBackend {
    type Err = PaperFilterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "bridge" => Ok(Self::Bridge),
            "keyword" => Ok(Self::Keyword),
            other => Err(PaperFilterError::config(format!(
                "unknown classifier backend '{other}': expected 'http', 'bridge', or 'keyword'"
            ))),
        }
    }
}

impl std::fmt::Display for ClassifierBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[classifier]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Backend selection.
    #[serde(default = "default_backend")]
    pub backend: ClassifierBackend,

    /// Zero-shot classification endpoint (http backend).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Score labels independently instead of as a softmax over labels.
    #[serde(default)]
    pub multi_label: bool,

    /// Request timeout in seconds (http backend).
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,

    /// Command launching the bridge process (bridge backend).
    #[serde(default = "default_bridge_cmd")]
    pub bridge_cmd: String,

    /// Arguments passed to the bridge command.
    #[serde(default)]
    pub bridge_args: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            multi_label: false,
            timeout_secs: default_classifier_timeout(),
            bridge_cmd: default_bridge_cmd(),
            bridge_args: Vec::new(),
        }
    }
}

fn default_backend() -> ClassifierBackend {
    ClassifierBackend::Http
}
fn default_endpoint() -> String {
    "https://api-inference.huggingface.co/models/facebook/bart-large-mnli".into()
}
fn default_api_key_env() -> String {
    "HF_API_TOKEN".into()
}
fn default_classifier_timeout() -> u64 {
    60
}
fn default_bridge_cmd() -> String {
    "python3".into()
}

/// `[artifacts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Download URL with an `{id}` placeholder.
    #[serde(default = "default_url_template")]
    pub url_template: String,

    /// PDF directory, relative to the output directory.
    #[serde(default = "default_subdir")]
    pub subdir: String,

    /// Request timeout in seconds.
    #[serde(default = "default_artifact_timeout")]
    pub timeout_secs: u64,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            subdir: default_subdir(),
            timeout_secs: default_artifact_timeout(),
        }
    }
}

fn default_url_template() -> String {
    "https://arxiv.org/pdf/{id}.pdf".into()
}
fn default_subdir() -> String {
    "pdfs".into()
}
fn default_artifact_timeout() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Check values that serde cannot: ranges, URLs, and placeholders.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.defaults.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PaperFilterError::config(format!(
                "defaults.threshold {threshold} outside [0, 1]"
            )));
        }
        if self.defaults.concurrency == 0 {
            return Err(PaperFilterError::config("defaults.concurrency must be at least 1"));
        }

        url::Url::parse(&self.feed.url)
            .map_err(|e| PaperFilterError::config(format!("invalid feed.url '{}': {e}", self.feed.url)))?;

        if self.classifier.backend == ClassifierBackend::Http {
            url::Url::parse(&self.classifier.endpoint).map_err(|e| {
                PaperFilterError::config(format!(
                    "invalid classifier.endpoint '{}': {e}",
                    self.classifier.endpoint
                ))
            })?;
        }

        if !self.artifacts.url_template.contains(ARTIFACT_ID_PLACEHOLDER) {
            return Err(PaperFilterError::config(format!(
                "artifacts.url_template must contain {ARTIFACT_ID_PLACEHOLDER}"
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.paperfilter/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PaperFilterError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.paperfilter/paperfilter.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PaperFilterError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        PaperFilterError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PaperFilterError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PaperFilterError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PaperFilterError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the classifier API token from the env var named in the config.
///
/// Returns `None` when the variable is unset or empty; public endpoints work
/// without a token.
pub fn classifier_api_key(config: &ClassifierConfig) -> Option<String> {
    std::env::var(&config.api_key_env)
        .ok()
        .filter(|v| !v.trim().is_empty())
}
