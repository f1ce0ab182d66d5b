//! FormData: ordered form entries with multipart encoding.

use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};

use crate::blob::Blob;
use crate::error::{ScriptError, require_args};
use crate::file::File;
use crate::install::{ClassDef, HostClass, Installable, Namespace, no_such_method};
use crate::lock;
use crate::value::{JsValue, NativeFunction, arg, now_millis};

/// A form entry value: text or a File.
#[derive(Debug, Clone)]
pub enum FormDataValue {
    Text(String),
    File(File),
}

impl From<FormDataValue> for JsValue {
    fn from(value: FormDataValue) -> Self {
        match value {
            FormDataValue::Text(text) => text.into(),
            FormDataValue::File(file) => file.into(),
        }
    }
}

impl From<&str> for FormDataValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<File> for FormDataValue {
    fn from(file: File) -> Self {
        Self::File(file)
    }
}

/// Form entries grouped by name; names keep first-insertion order.
#[derive(Clone, Default)]
pub struct FormData {
    entries: Arc<Mutex<Vec<(String, Vec<FormDataValue>)>>>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh multipart boundary.
    pub fn new_boundary() -> String {
        format!("----WebshimFormBoundary{}", uuid::Uuid::new_v4().simple())
    }

    /// Normalize a script value for `append`/`set`.
    ///
    /// Blobs become Files named `"blob"` (or `filename`); Files are renamed
    /// when `filename` is given; everything else is stringified. A filename
    /// with a non-Blob value is an error.
    pub fn convert_value(
        value: &JsValue,
        filename: Option<&JsValue>,
        method: &str,
    ) -> Result<FormDataValue, ScriptError> {
        let filename = filename
            .filter(|name| !name.is_undefined())
            .map(JsValue::to_js_string);
        if let Some(file) = value.as_file() {
            return Ok(FormDataValue::File(match filename {
                Some(name) => file.renamed(name),
                None => file,
            }));
        }
        if let Some(blob) = value.as_blob() {
            let name = filename.unwrap_or_else(|| "blob".to_string());
            return Ok(FormDataValue::File(File::new(blob, name, now_millis())));
        }
        if filename.is_some() {
            return Err(ScriptError::execute(
                "FormData",
                method,
                "parameter 2 is not of type 'Blob'.",
            ));
        }
        Ok(FormDataValue::Text(value.to_js_string()))
    }

    pub fn append(&self, name: &str, value: impl Into<FormDataValue>) {
        let value = value.into();
        let mut entries = lock(&self.entries);
        match entries.iter_mut().find(|(key, _)| key == name) {
            Some((_, values)) => values.push(value),
            None => entries.push((name.to_string(), vec![value])),
        }
    }

    pub fn set(&self, name: &str, value: impl Into<FormDataValue>) {
        let value = value.into();
        let mut entries = lock(&self.entries);
        match entries.iter_mut().find(|(key, _)| key == name) {
            Some((_, values)) => *values = vec![value],
            None => entries.push((name.to_string(), vec![value])),
        }
    }

    pub fn delete(&self, name: &str) {
        lock(&self.entries).retain(|(key, _)| key != name);
    }

    pub fn has(&self, name: &str) -> bool {
        lock(&self.entries).iter().any(|(key, _)| key == name)
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<FormDataValue> {
        lock(&self.entries)
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, values)| values.first().cloned())
    }

    pub fn get_all(&self, name: &str) -> Vec<FormDataValue> {
        lock(&self.entries)
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, values)| values.clone())
            .unwrap_or_default()
    }

    /// Flattened `(name, value)` pairs.
    pub fn entries(&self) -> Vec<(String, FormDataValue)> {
        lock(&self.entries)
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |v| (key.clone(), v.clone())))
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries().into_iter().map(|(key, _)| key).collect()
    }

    pub fn values(&self) -> Vec<FormDataValue> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).iter().map(|(_, values)| values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An independent copy. File values still share their bytes.
    pub fn copy(&self) -> Self {
        Self {
            entries: Arc::new(Mutex::new(lock(&self.entries).clone())),
        }
    }

    /// Call `callback(value, name, form)` for each entry.
    pub fn for_each(&self, callback: &NativeFunction) -> Result<(), ScriptError> {
        let this = JsValue::from(self.clone());
        for (name, value) in self.entries() {
            callback.call(&[value.into(), name.into(), this.clone()])?;
        }
        Ok(())
    }

    /// Encode as `multipart/form-data` with the given boundary.
    pub async fn encode(&self, boundary: &str) -> Result<Bytes, ScriptError> {
        let mut out = BytesMut::new();
        for (name, value) in self.entries() {
            out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match value {
                FormDataValue::Text(text) => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{text}\r\n",
                            escape_quoted(&name)
                        )
                        .as_bytes(),
                    );
                }
                FormDataValue::File(file) => {
                    let content_type = match file.blob().mime_type() {
                        "" => "application/octet-stream",
                        other => other,
                    };
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {content_type}\r\n\r\n",
                            escape_quoted(&name),
                            escape_quoted(file.name())
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(&file.blob().read().await?);
                    out.extend_from_slice(b"\r\n");
                }
            }
        }
        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        Ok(out.freeze())
    }

    /// Encode into a Blob typed `multipart/form-data; boundary=...`.
    pub async fn to_blob(&self, boundary: &str) -> Result<Blob, ScriptError> {
        let encoded = self.encode(boundary).await?;
        Ok(Blob::from_bytes(
            encoded,
            format!("multipart/form-data; boundary={boundary}"),
        ))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

impl fmt::Debug for FormData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries()).finish()
    }
}

fn values_value(values: Vec<FormDataValue>) -> JsValue {
    JsValue::Array(values.into_iter().map(JsValue::from).collect())
}

impl HostClass for FormData {
    fn class_name(&self) -> &'static str {
        "FormData"
    }

    fn get_property(&self, _name: &str) -> Option<JsValue> {
        None
    }

    fn call_method(&self, name: &str, args: &[JsValue]) -> Result<JsValue, ScriptError> {
        let class = self.class_name();
        match name {
            "append" | "set" => {
                require_args(args, 2, class, name)?;
                let key = args[0].to_js_string();
                let value = Self::convert_value(&args[1], args.get(2), name)?;
                if name == "append" {
                    self.append(&key, value);
                } else {
                    self.set(&key, value);
                }
                Ok(JsValue::Undefined)
            }
            "delete" => {
                require_args(args, 1, class, name)?;
                self.delete(&args[0].to_js_string());
                Ok(JsValue::Undefined)
            }
            "has" => {
                require_args(args, 1, class, name)?;
                Ok(self.has(&args[0].to_js_string()).into())
            }
            "get" => {
                require_args(args, 1, class, name)?;
                Ok(self
                    .get(&args[0].to_js_string())
                    .map_or(JsValue::Null, JsValue::from))
            }
            "getAll" => {
                require_args(args, 1, class, name)?;
                Ok(values_value(self.get_all(&args[0].to_js_string())))
            }
            "entries" => Ok(JsValue::Array(
                self.entries()
                    .into_iter()
                    .map(|(key, value)| JsValue::Array(vec![key.into(), value.into()]))
                    .collect(),
            )),
            "keys" => Ok(JsValue::Array(
                self.keys().into_iter().map(JsValue::from).collect(),
            )),
            "values" => Ok(values_value(self.values())),
            "forEach" => {
                require_args(args, 1, class, name)?;
                let Some(callback) = arg(args, 0).as_function() else {
                    return Err(ScriptError::execute(
                        class,
                        name,
                        "parameter 1 is not of type 'Function'.",
                    ));
                };
                self.for_each(callback)?;
                Ok(JsValue::Undefined)
            }
            _ => Err(no_such_method(class, name)),
        }
    }
}

/// Installs the `FormData` class.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormDataInstaller;

impl Installable for FormDataInstaller {
    fn install(&self, namespace: &mut Namespace) {
        namespace.define_class(ClassDef::new("FormData", |_args| {
            Ok(FormData::new().into())
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(value: Option<FormDataValue>) -> Option<String> {
        match value {
            Some(FormDataValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    #[test]
    fn test_append_set_delete() {
        let form = FormData::new();
        form.append("a", "1");
        form.append("b", "2");
        form.append("a", "3");
        assert_eq!(form.len(), 3);
        assert_eq!(form.keys(), vec!["a", "a", "b"]);
        assert_eq!(text(form.get("a")).as_deref(), Some("1"));
        assert_eq!(form.get_all("a").len(), 2);

        form.set("a", "only");
        assert_eq!(form.get_all("a").len(), 1);
        form.delete("b");
        assert!(!form.has("b"));
        assert!(form.get("b").is_none());
    }

    #[test]
    fn test_blob_values_become_files() {
        let form = FormData::new();
        form.call_method("append", &["upload".into(), Blob::from_text("x", "").into()])
            .unwrap();
        let Some(FormDataValue::File(file)) = form.get("upload") else {
            panic!("expected a file entry");
        };
        assert_eq!(file.name(), "blob");

        form.call_method(
            "set",
            &["upload".into(), Blob::from_text("x", "").into(), "a.txt".into()],
        )
        .unwrap();
        let Some(FormDataValue::File(file)) = form.get("upload") else {
            panic!("expected a file entry");
        };
        assert_eq!(file.name(), "a.txt");
    }

    #[test]
    fn test_filename_requires_blob() {
        let form = FormData::new();
        let err = form
            .call_method("append", &["k".into(), "v".into(), "name.txt".into()])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to execute 'append' on 'FormData': parameter 2 is not of type 'Blob'."
        );
    }

    #[test]
    fn test_non_string_values_are_stringified() {
        let form = FormData::new();
        form.call_method("append", &["n".into(), 42.into()]).unwrap();
        assert_eq!(text(form.get("n")).as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_multipart_encoding() {
        let form = FormData::new();
        form.append("field", "value");
        form.append(
            "file",
            File::new(Blob::from_text("contents", "text/plain"), "a.txt", 0.0),
        );
        let encoded = form.encode("XYZ").await.unwrap();
        let expected = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"field\"\r\n\r\nvalue\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\ncontents\r\n\
            --XYZ--\r\n";
        assert_eq!(String::from_utf8(encoded.to_vec()).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_multipart_is_binary_safe() {
        let form = FormData::new();
        form.append(
            "bin",
            File::new(Blob::from_bytes(Bytes::from_static(&[0, 159, 255]), ""), "b", 0.0),
        );
        let encoded = form.encode("B").await.unwrap();
        assert!(encoded.windows(3).any(|w| *w == [0, 159, 255]));
        assert!(
            String::from_utf8_lossy(&encoded).contains("Content-Type: application/octet-stream")
        );
    }

    #[test]
    fn test_boundary_is_unique() {
        let a = FormData::new_boundary();
        let b = FormData::new_boundary();
        assert!(a.starts_with("----WebshimFormBoundary"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_copy_is_independent() {
        let form = FormData::new();
        form.append("a", "1");
        let copy = form.copy();
        copy.append("b", "2");
        assert_eq!(form.len(), 1);
        assert_eq!(copy.len(), 2);
    }
}
