//! Shared types, error model, and configuration for paperfilter.
//!
//! This crate is the foundation depended on by all other paperfilter crates.
//! It provides:
//! - [`PaperFilterError`] — the unified error type
//! - Domain types ([`DocumentRecord`], [`AcceptedRecord`], [`TopicSet`], [`Threshold`])
//! - Configuration ([`AppConfig`] and its sections, config loading)
//! - Atomic file writes used by the artifact fetcher and snapshot store

pub mod config;
pub mod error;
pub mod fs;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ARTIFACT_ID_PLACEHOLDER, AppConfig, ArtifactsConfig, ClassifierBackend, ClassifierConfig,
    DefaultsConfig, FeedConfig, classifier_api_key, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{PaperFilterError, Result};
pub use types::{
    AcceptedRecord, DocumentRecord, SNAPSHOT_FILE_NAME, Threshold, TopicSet, UNKNOWN_AUTHORS,
};
