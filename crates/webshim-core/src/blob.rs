//! Blob: an immutable, typed window over byte-range storage.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{SEQUENCE_ERROR, ScriptError};
use crate::install::{ClassDef, HostClass, Installable, Namespace, no_such_method};
use crate::promise::JsPromise;
use crate::storage::{ByteRangeStorage, MemoryStorage};
use crate::value::{JsValue, arg};

/// An immutable byte window `[start, end)` over shared storage, plus a MIME
/// type. Cloning shares the same Blob.
#[derive(Clone)]
pub struct Blob {
    inner: Arc<BlobInner>,
}

struct BlobInner {
    storage: Arc<dyn ByteRangeStorage>,
    start: u64,
    /// `None` for an unbounded window over a still-streaming storage.
    end: Option<u64>,
    mime_type: String,
}

impl Blob {
    /// A Blob covering all of `storage`.
    pub fn new(storage: Arc<dyn ByteRangeStorage>, mime_type: impl Into<String>) -> Self {
        let end = (!storage.is_streaming()).then(|| storage.size());
        Self::window(storage, 0, end, mime_type.into())
    }

    fn window(
        storage: Arc<dyn ByteRangeStorage>,
        start: u64,
        end: Option<u64>,
        mime_type: String,
    ) -> Self {
        Self {
            inner: Arc::new(BlobInner {
                storage,
                start,
                end,
                mime_type,
            }),
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryStorage::new(bytes)), mime_type)
    }

    /// A Blob holding the UTF-8 encoding of `text`.
    pub fn from_text(text: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryStorage::from_text(text)), mime_type)
    }

    pub fn empty() -> Self {
        Self::from_text("", "")
    }

    /// Concatenate the string conversion of each part.
    pub fn from_parts(parts: &[JsValue], mime_type: impl Into<String>) -> Self {
        let text: String = parts.iter().map(JsValue::to_js_string).collect();
        Self::from_text(text, mime_type)
    }

    /// `new Blob(parts?, options?)`.
    pub fn construct(args: &[JsValue]) -> Result<Self, ScriptError> {
        let parts = arg(args, 0);
        let mime_type = type_option(arg(args, 1));
        if parts.is_undefined() {
            return Ok(Self::from_text("", mime_type));
        }
        match parts.iterate() {
            Some(items) if !parts.is_string() => Ok(Self::from_parts(&items, mime_type)),
            _ => Err(ScriptError::construct("Blob", SEQUENCE_ERROR)),
        }
    }

    /// Window length. For an unbounded window over a streaming storage this
    /// is the declared length (0 when unknown).
    pub fn size(&self) -> u64 {
        let end = self.inner.end.unwrap_or_else(|| self.inner.storage.size());
        end.saturating_sub(self.inner.start)
    }

    pub fn mime_type(&self) -> &str {
        &self.inner.mime_type
    }

    pub fn storage(&self) -> &Arc<dyn ByteRangeStorage> {
        &self.inner.storage
    }

    /// The same window with a different MIME type.
    pub fn with_type(&self, mime_type: impl Into<String>) -> Self {
        Self::window(
            Arc::clone(&self.inner.storage),
            self.inner.start,
            self.inner.end,
            mime_type.into(),
        )
    }

    /// `blob.slice(start?, end?, type?)`.
    ///
    /// Without a start the same Blob is returned. Offsets are clamped into
    /// `[0, size]` and `end` is raised to `start` when smaller. `mime_type`
    /// of `None` keeps this Blob's type.
    pub fn slice(&self, start: Option<i64>, end: Option<i64>, mime_type: Option<&str>) -> Self {
        let Some(start) = start else {
            return self.clone();
        };
        let size = i64::try_from(self.size()).unwrap_or(i64::MAX);
        let start = start.clamp(0, size);
        let end = end.unwrap_or(size).clamp(start, size);
        let base = self.inner.start;
        Self::window(
            Arc::clone(&self.inner.storage),
            base + start as u64,
            Some(base + end as u64),
            mime_type.map_or_else(|| self.inner.mime_type.clone(), str::to_string),
        )
    }

    fn slice_from_args(&self, args: &[JsValue]) -> Self {
        let offset = |value: &JsValue| (!value.is_undefined()).then(|| value.to_integer());
        let mime_type = match args.get(2) {
            None => None,
            Some(JsValue::Undefined) => Some(String::new()),
            Some(value) => Some(value.to_js_string()),
        };
        self.slice(
            offset(arg(args, 0)),
            offset(arg(args, 1)),
            mime_type.as_deref(),
        )
    }

    /// Read the whole window.
    pub async fn read(&self) -> Result<Bytes, ScriptError> {
        let end = self.inner.end.unwrap_or(u64::MAX);
        self.inner.storage.read_range(self.inner.start, end).await
    }

    /// Read the whole window and decode it as UTF-8 (lossy).
    pub async fn read_text(&self) -> Result<String, ScriptError> {
        let bytes = self.read().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// `blob.text()`.
    pub fn text(&self) -> JsPromise {
        let blob = self.clone();
        JsPromise::spawn(async move { blob.read_text().await.map(JsValue::from) })
    }

    /// `blob.bytes()`: resolves with a `Uint8Array`.
    pub fn bytes(&self) -> JsPromise {
        let blob = self.clone();
        JsPromise::spawn(async move { blob.read().await.map(JsValue::Bytes) })
    }

    /// `blob.arrayBuffer()`.
    pub fn array_buffer(&self) -> JsPromise {
        let blob = self.clone();
        JsPromise::spawn(async move { blob.read().await.map(JsValue::ArrayBuffer) })
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// `options.type`, or the empty string when absent.
pub(crate) fn type_option(options: &JsValue) -> String {
    match options.get("type") {
        JsValue::Undefined => String::new(),
        value => value.to_js_string(),
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("start", &self.inner.start)
            .field("end", &self.inner.end)
            .field("type", &self.inner.mime_type)
            .field("storage", &self.inner.storage)
            .finish()
    }
}

impl HostClass for Blob {
    fn class_name(&self) -> &'static str {
        "Blob"
    }

    fn get_property(&self, name: &str) -> Option<JsValue> {
        match name {
            "size" => Some(self.size().into()),
            "type" => Some(self.mime_type().into()),
            _ => None,
        }
    }

    fn call_method(&self, name: &str, args: &[JsValue]) -> Result<JsValue, ScriptError> {
        match name {
            "text" => Ok(self.text().into()),
            "bytes" => Ok(self.bytes().into()),
            "arrayBuffer" => Ok(self.array_buffer().into()),
            "slice" => Ok(self.slice_from_args(args).into()),
            _ => Err(no_such_method(self.class_name(), name)),
        }
    }
}

/// Installs the `Blob` class.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlobInstaller;

impl Installable for BlobInstaller {
    fn install(&self, namespace: &mut Namespace) {
        namespace.define_class(ClassDef::new("Blob", |args| {
            Blob::construct(args).map(JsValue::from)
        }));
    }
}
