//! Run snapshot persistence.
//!
//! The [`SnapshotStore`] owns one file, `arxiv_ai_papers.json`, inside an
//! output directory. Each run replaces it wholesale with the accepted
//! records, serialized as a pretty-printed JSON array.
//!
//! **Write rules:**
//! - The snapshot is written through a temp file and an atomic rename, so a
//!   reader sees either the previous snapshot or the new one.
//! - Any failure is a [`PaperFilterError::Persist`] and fails the run.

use std::path::{Path, PathBuf};

use paperfilter_shared::fs::{ensure_dir, write_atomic};
use paperfilter_shared::{AcceptedRecord, PaperFilterError, Result, SNAPSHOT_FILE_NAME};
use tracing::{info, instrument};

/// Snapshot file handle rooted at an output directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the snapshot file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE_NAME)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Replace the snapshot with `records`, in the given order.
    ///
    /// An empty slice writes `[]`.
    #[instrument(skip_all, fields(dir = %self.dir.display(), records = records.len()))]
    pub fn persist(&self, records: &[AcceptedRecord]) -> Result<PathBuf> {
        let path = self.path();

        let mut json = serde_json::to_string_pretty(records)
            .map_err(|e| PaperFilterError::persist(&path, format!("serialization failed: {e}")))?;
        json.push('\n');

        ensure_dir(&self.dir).map_err(|e| PaperFilterError::persist(&path, e.to_string()))?;
        write_atomic(&path, json.as_bytes())
            .map_err(|e| PaperFilterError::persist(&path, e.to_string()))?;

        info!(path = %path.display(), "snapshot written");
        Ok(path)
    }

    /// Read the snapshot back.
    pub fn load(&self) -> Result<Vec<AcceptedRecord>> {
        let path = self.path();
        let content = std::fs::read_to_string(&path).map_err(|e| PaperFilterError::io(&path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| PaperFilterError::parse(format!("{}: {e}", path.display())))
    }
}
