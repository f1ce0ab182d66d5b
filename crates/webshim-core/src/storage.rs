//! Byte-range storage backends for Blobs.
//!
//! A Blob never owns its bytes directly; it holds a window `[start, end)` over
//! a shared [`ByteRangeStorage`]. Slicing creates a new window over the same
//! storage without copying.

use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::BoxFuture;
use crate::error::ScriptError;

/// Random-access byte source.
///
/// `read_range` clamps `end` to the storage size and treats an inverted range
/// as empty.
pub trait ByteRangeStorage: Send + Sync + fmt::Debug {
    /// Size in bytes. For streaming storages this is the declared length.
    fn size(&self) -> u64;

    /// Whether the bytes are still arriving and `size` is only advisory.
    fn is_streaming(&self) -> bool {
        false
    }

    /// Read bytes `[start, end)`.
    fn read_range(&self, start: u64, end: u64) -> BoxFuture<'_, Result<Bytes, ScriptError>>;
}

/// Clamp `[start, end)` into `[0, len]`, collapsing inverted ranges.
pub(crate) fn clamp_range(start: u64, end: u64, len: u64) -> (u64, u64) {
    let end = end.min(len);
    (start.min(end), end)
}

// ── In-memory ───────────────────────────────────────────────────────────

/// Storage over an in-memory buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    bytes: Bytes,
}

impl MemoryStorage {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// UTF-8 encode `text`.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(text.into().into_bytes())
    }
}

impl ByteRangeStorage for MemoryStorage {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_range(&self, start: u64, end: u64) -> BoxFuture<'_, Result<Bytes, ScriptError>> {
        let (start, end) = clamp_range(start, end, self.size());
        let window = self.bytes.slice(start as usize..end as usize);
        Box::pin(async move { Ok(window) })
    }
}

// ── File-backed ─────────────────────────────────────────────────────────

/// Storage over a local file. Only the requested range is read.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

impl FileStorage {
    /// Stat `path` and capture its size and modification time.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        if !metadata.is_file() {
            return Err(ScriptError::Io(format!(
                "{}: not a regular file",
                path.display()
            )));
        }
        let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
        debug!(path = %path.display(), size = metadata.len(), "opened file storage");
        Ok(Self {
            path,
            size: metadata.len(),
            modified,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Modification time in epoch milliseconds.
    pub fn modified_millis(&self) -> f64 {
        self.modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as f64)
            .unwrap_or(0.0)
    }
}

fn io_error(path: &Path, err: std::io::Error) -> ScriptError {
    ScriptError::Io(format!("{}: {err}", path.display()))
}

impl ByteRangeStorage for FileStorage {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&self, start: u64, end: u64) -> BoxFuture<'_, Result<Bytes, ScriptError>> {
        Box::pin(async move {
            let (start, end) = clamp_range(start, end, self.size);
            if start == end {
                return Ok(Bytes::new());
            }
            let mut file = tokio::fs::File::open(&self.path)
                .await
                .map_err(|e| io_error(&self.path, e))?;
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| io_error(&self.path, e))?;
            let mut buf = Vec::with_capacity((end - start) as usize);
            file.take(end - start)
                .read_to_end(&mut buf)
                .await
                .map_err(|e| io_error(&self.path, e))?;
            debug!(path = %self.path.display(), start, end, read = buf.len(), "read file range");
            Ok(Bytes::from(buf))
        })
    }
}
