//! File fixtures.
//!
//! Helpers for tests that read through `FileStorage` or load a config file
//! from disk.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A file with known contents inside an owned temp directory.
///
/// The directory is deleted when this value is dropped, guaranteeing cleanup
/// even on panic.
pub struct TestFile {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TestFile {
    /// Create `name` containing `contents`.
    pub async fn with_contents(name: &str, contents: impl AsRef<[u8]>) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join(name);
        tokio::fs::write(&path, contents)
            .await
            .expect("failed to write test file");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// A `webshim.toml` containing the given TOML string.
    pub async fn config(toml_content: &str) -> Self {
        Self::with_contents("webshim.toml", toml_content).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A sibling path inside the same temp directory that does not exist.
    pub fn missing_sibling(&self) -> PathBuf {
        self._temp_dir.path().join("missing.bin")
    }

    /// Overwrite the file (for change-after-open tests).
    pub async fn write(&self, contents: impl AsRef<[u8]>) {
        tokio::fs::write(&self.path, contents)
            .await
            .expect("failed to rewrite test file");
    }
}
