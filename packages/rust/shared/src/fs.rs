//! Filesystem helpers shared by the artifact fetcher and the snapshot store.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PaperFilterError, Result};

/// Create `dir` and all missing parents. Succeeds if it already exists.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| PaperFilterError::io(dir, e))
}

/// Write `contents` to `target` through a hidden temp file in the same
/// directory followed by a rename, so readers never see a partial file.
///
/// The temp file is removed if any step fails.
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = target
        .file_name()
        .ok_or_else(|| PaperFilterError::validation(format!("not a file path: {target:?}")))?
        .to_string_lossy();

    let guard = TempFile::new(dir.join(format!(
        ".{file_name}.{}.tmp",
        uuid::Uuid::now_v7().simple()
    )));

    std::fs::write(guard.path(), contents).map_err(|e| PaperFilterError::io(guard.path(), e))?;
    std::fs::rename(guard.path(), target).map_err(|e| PaperFilterError::io(target, e))?;
    guard.disarm();

    debug!(path = %target.display(), bytes = contents.len(), "wrote file");
    Ok(())
}

/// Temp file path that is deleted on drop unless disarmed.
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("pf-fs-test-{}", uuid::Uuid::now_v7()))
    }

    fn leftover_temps(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = temp_dir().join("a").join("b");
        ensure_dir(&dir).unwrap();
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
        let _ = std::fs::remove_dir_all(dir.parent().unwrap().parent().unwrap());
    }

    #[test]
    fn write_atomic_overwrites_and_cleans_up() {
        let dir = temp_dir();
        ensure_dir(&dir).unwrap();
        let target = dir.join("out.json");

        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        assert_eq!(leftover_temps(&dir), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn write_atomic_fails_without_directory() {
        let dir = temp_dir();
        let target = dir.join("missing").join("out.json");
        let err = write_atomic(&target, b"data").unwrap_err();
        assert!(matches!(err, PaperFilterError::Io { .. }));
    }
}
