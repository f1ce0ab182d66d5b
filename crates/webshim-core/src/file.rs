//! File: a Blob with a name and a modification time.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::blob::{Blob, BlobInstaller};
use crate::error::{SEQUENCE_ERROR, ScriptError, require_construct_args};
use crate::install::{ClassDef, HostClass, Installable, Namespace};
use crate::storage::FileStorage;
use crate::value::{JsValue, arg, now_millis};

/// Name and modification time attached to a File's Blob.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    pub name: String,
    /// Epoch milliseconds.
    pub last_modified: f64,
}

/// A named Blob. Composes a [`Blob`] with [`FileMetadata`].
#[derive(Clone)]
pub struct File {
    blob: Blob,
    metadata: Arc<FileMetadata>,
}

impl File {
    pub fn new(blob: Blob, name: impl Into<String>, last_modified: f64) -> Self {
        Self {
            blob,
            metadata: Arc::new(FileMetadata {
                name: name.into(),
                last_modified,
            }),
        }
    }

    /// Open a local file. Size and modification time are read now; content is
    /// read lazily, range by range.
    pub async fn from_path(path: impl AsRef<Path>, mime_type: &str) -> Result<Self, ScriptError> {
        let storage = FileStorage::open(path).await?;
        let name = storage
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let last_modified = storage.modified_millis();
        Ok(Self::new(
            Blob::new(Arc::new(storage), mime_type),
            name,
            last_modified,
        ))
    }

    /// `new File(bits, name, options?)`.
    ///
    /// `lastModified` falls back from the explicit option (Date or epoch
    /// milliseconds) to the source File's own date, then to the current time.
    pub fn construct(args: &[JsValue]) -> Result<Self, ScriptError> {
        require_construct_args(args, 2, "File")?;
        let bits = &args[0];
        let name = args[1].to_js_string();
        let options = arg(args, 2);
        if !options.is_undefined() && !options.is_object() {
            return Err(ScriptError::construct(
                "File",
                "The provided value is not of type 'FilePropertyBag'.",
            ));
        }

        let last_modified = match options.get("lastModified") {
            JsValue::Date(ms) | JsValue::Number(ms) => {
                if ms.is_finite() {
                    ms.trunc()
                } else {
                    0.0
                }
            }
            _ => bits
                .as_file()
                .map(|file| file.metadata.last_modified)
                .unwrap_or_else(now_millis),
        };

        let explicit_type = match options.get("type") {
            JsValue::Undefined => None,
            value => Some(value.to_js_string()),
        };

        let blob = if let Some(source) = bits.as_blob() {
            match explicit_type {
                Some(mime_type) => source.with_type(mime_type),
                None => source,
            }
        } else {
            match bits.iterate() {
                Some(items) if !bits.is_string() => {
                    Blob::from_parts(&items, explicit_type.unwrap_or_default())
                }
                _ => return Err(ScriptError::construct("File", SEQUENCE_ERROR)),
            }
        };
        Ok(Self::new(blob, name, last_modified))
    }

    pub fn blob(&self) -> &Blob {
        &self.blob
    }

    pub fn into_blob(self) -> Blob {
        self.blob
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Modification time in whole epoch milliseconds.
    pub fn last_modified(&self) -> i64 {
        self.metadata.last_modified.round() as i64
    }

    /// Modification time as a script `Date`.
    pub fn last_modified_date(&self) -> JsValue {
        JsValue::Date(self.metadata.last_modified)
    }

    pub fn webkit_relative_path(&self) -> &'static str {
        ""
    }

    /// A File sharing this one's bytes and date under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self::new(self.blob.clone(), name, self.metadata.last_modified)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.blob.ptr_eq(&other.blob) && Arc::ptr_eq(&self.metadata, &other.metadata)
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("name", &self.metadata.name)
            .field("last_modified", &self.metadata.last_modified)
            .field("blob", &self.blob)
            .finish()
    }
}

impl HostClass for File {
    fn class_name(&self) -> &'static str {
        "File"
    }

    fn get_property(&self, name: &str) -> Option<JsValue> {
        match name {
            "name" => Some(self.name().into()),
            "lastModified" => Some(self.last_modified().into()),
            "lastModifiedDate" => Some(self.last_modified_date()),
            "webkitRelativePath" => Some(self.webkit_relative_path().into()),
            _ => self.blob.get_property(name),
        }
    }

    fn call_method(&self, name: &str, args: &[JsValue]) -> Result<JsValue, ScriptError> {
        // A slice without a start is the File itself, not its Blob.
        if name == "slice" && args.first().is_none_or(JsValue::is_undefined) {
            return Ok(self.clone().into());
        }
        self.blob.call_method(name, args)
    }
}

/// Installs the `File` class (and `Blob`, which File builds on).
#[derive(Debug, Default, Clone, Copy)]
pub struct FileInstaller;

impl Installable for FileInstaller {
    fn install(&self, namespace: &mut Namespace) {
        namespace.install(&BlobInstaller);
        namespace.define_class(ClassDef::new("File", |args| {
            File::construct(args).map(JsValue::from)
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::JsObject;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn parts(text: &str) -> JsValue {
        JsValue::from(vec![JsValue::from(text)])
    }

    #[test]
    fn test_requires_two_arguments() {
        let err = File::construct(&[parts("x")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to construct 'File': 2 arguments required, but only 1 present."
        );
    }

    #[test]
    fn test_rejects_non_object_options() {
        let err = File::construct(&[parts("x"), "a.txt".into(), 5.into()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to construct 'File': The provided value is not of type 'FilePropertyBag'."
        );
    }

    #[test]
    fn test_rejects_non_sequence_bits() {
        let err = File::construct(&[5.into(), "a.txt".into()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to construct 'File': The provided value cannot be converted to a sequence."
        );
    }

    #[tokio::test]
    async fn test_from_parts_with_options() {
        let options = JsObject::new()
            .with("type", "text/plain")
            .with("lastModified", 1_000.4);
        let file = File::construct(&[parts("abc"), "a.txt".into(), options.into()]).unwrap();
        assert_eq!(file.name(), "a.txt");
        assert_eq!(file.last_modified(), 1_000);
        assert_eq!(file.blob().mime_type(), "text/plain");
        assert_eq!(file.blob().read_text().await.unwrap(), "abc");
        assert_eq!(file.get_property("size"), Some(JsValue::from(3)));
        assert_eq!(file.get_property("webkitRelativePath"), Some(JsValue::from("")));
    }

    #[tokio::test]
    async fn test_slice_without_start_keeps_the_file() {
        let file = File::new(Blob::from_text("abc", ""), "a.txt", 0.0);
        let same = file.call_method("slice", &[JsValue::Undefined]).unwrap();
        assert_eq!(same, JsValue::from(file.clone()));
        assert_eq!(file.call_method("slice", &[]).unwrap(), JsValue::from(file.clone()));

        let part = file.call_method("slice", &[JsValue::from(1)]).unwrap();
        assert!(part.as_file().is_none());
        assert_eq!(part.as_blob().unwrap().read_text().await.unwrap(), "bc");
    }

    #[test]
    fn test_last_modified_fallback_chain() {
        let source = File::new(Blob::from_text("x", ""), "src.txt", 5_000.0);

        let inherited = File::construct(&[source.clone().into(), "copy.txt".into()]).unwrap();
        assert_eq!(inherited.last_modified(), 5_000);
        assert_eq!(inherited.name(), "copy.txt");

        let explicit_date = JsObject::new().with("lastModified", JsValue::Date(9_000.0));
        let dated =
            File::construct(&[source.clone().into(), "d.txt".into(), explicit_date.into()])
                .unwrap();
        assert_eq!(dated.last_modified(), 9_000);

        let explicit_ms = JsObject::new().with("lastModified", 7_000);
        let numbered =
            File::construct(&[source.into(), "n.txt".into(), explicit_ms.into()]).unwrap();
        assert_eq!(numbered.last_modified(), 7_000);

        let before = now_millis() as i64;
        let fresh = File::construct(&[parts("x"), "new.txt".into()]).unwrap();
        assert!(fresh.last_modified() >= before);
    }

    #[tokio::test]
    async fn test_from_blob_keeps_window_and_type() {
        let blob = Blob::from_text("hello world", "text/plain").slice(Some(6), None, None);
        let file = File::construct(&[blob.clone().into(), "w.txt".into()]).unwrap();
        assert!(file.blob().ptr_eq(&blob));
        assert_eq!(file.blob().read_text().await.unwrap(), "world");

        let retyped = JsObject::new().with("type", "text/csv");
        let file = File::construct(&[blob.into(), "w.csv".into(), retyped.into()]).unwrap();
        assert_eq!(file.blob().mime_type(), "text/csv");
        assert_eq!(file.blob().size(), 5);
    }

    #[tokio::test]
    async fn test_from_path_reads_lazily() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        tokio::fs::write(&path, b"line one\nline two\n").await.unwrap();

        let file = File::from_path(&path, "text/plain").await.unwrap();
        assert_eq!(file.name(), "notes.txt");
        assert_eq!(file.blob().size(), 18);
        assert!(file.last_modified() > 0);

        let second_line = file.blob().slice(Some(9), Some(17), None);
        assert_eq!(second_line.read_text().await.unwrap(), "line two");
    }

    #[test]
    fn test_slice_of_file_is_a_blob() {
        let file = File::new(Blob::from_text("abc", ""), "a", 0.0);
        let sliced = file.call_method("slice", &[1.into()]).unwrap();
        assert!(sliced.as_blob().is_some());
        assert!(sliced.as_file().is_none());
    }
}
