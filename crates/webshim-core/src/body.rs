//! Body extraction and consumption shared by Request and Response.

use std::sync::Mutex;

use bytes::Bytes;

use crate::blob::Blob;
use crate::error::ScriptError;
use crate::form_data::FormData;
use crate::headers::Headers;
use crate::lock;
use crate::promise::JsPromise;
use crate::value::JsValue;

/// Which object owns a body; used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Request,
    Response,
}

impl BodyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "Request",
            Self::Response => "Response",
        }
    }
}

/// A body-reading method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMethod {
    Text,
    Bytes,
    ArrayBuffer,
    Json,
    Blob,
    FormData,
}

impl BodyMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::ArrayBuffer => "arrayBuffer",
            Self::Json => "json",
            Self::Blob => "blob",
            Self::FormData => "formData",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(Self::Text),
            "bytes" => Some(Self::Bytes),
            "arrayBuffer" => Some(Self::ArrayBuffer),
            "json" => Some(Self::Json),
            "blob" => Some(Self::Blob),
            "formData" => Some(Self::FormData),
            _ => None,
        }
    }
}

/// An extracted body.
#[derive(Debug, Clone, Default)]
pub enum HttpBody {
    #[default]
    Empty,
    Text(String),
    Blob(Blob),
    Buffer(Bytes),
    FormData { data: FormData, boundary: String },
}

impl HttpBody {
    /// Extract a body from a script value. Nullish values give no body and
    /// anything unrecognized is stringified.
    pub fn from_value(raw: &JsValue) -> Self {
        if let Some(blob) = raw.as_blob() {
            return Self::Blob(blob);
        }
        match raw {
            JsValue::Undefined | JsValue::Null => Self::Empty,
            JsValue::Bytes(bytes) | JsValue::ArrayBuffer(bytes) => Self::Buffer(bytes.clone()),
            JsValue::Native(crate::value::NativeObject::FormData(data)) => Self::FormData {
                data: data.copy(),
                boundary: FormData::new_boundary(),
            },
            other => Self::Text(other.to_js_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The `Content-Type` implied by the body, if any.
    pub fn content_type(&self) -> Option<String> {
        match self {
            Self::Empty | Self::Buffer(_) => None,
            Self::Text(_) => Some("text/plain; charset=UTF-8".to_string()),
            Self::Blob(blob) => match blob.mime_type() {
                "" => None,
                mime_type => Some(mime_type.to_string()),
            },
            Self::FormData { boundary, .. } => {
                Some(format!("multipart/form-data; boundary={boundary}"))
            }
        }
    }

    pub async fn bytes(&self) -> Result<Bytes, ScriptError> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Text(text) => Ok(Bytes::from(text.clone().into_bytes())),
            Self::Blob(blob) => blob.read().await,
            Self::Buffer(bytes) => Ok(bytes.clone()),
            Self::FormData { data, boundary } => data.encode(boundary).await,
        }
    }

    pub async fn text(&self) -> Result<String, ScriptError> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            other => {
                let bytes = other.bytes().await?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }

    pub async fn blob(&self) -> Result<Blob, ScriptError> {
        match self {
            Self::Blob(blob) => Ok(blob.clone()),
            other => {
                let mime_type = other.content_type().unwrap_or_default();
                Ok(Blob::from_bytes(other.bytes().await?, mime_type))
            }
        }
    }

    pub async fn json(&self) -> Result<JsValue, ScriptError> {
        let text = self.text().await?;
        let parsed: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ScriptError::Syntax(format!("JSON Parse error: {e}")))?;
        Ok(JsValue::from_json(parsed))
    }

    /// Only FormData bodies can be read back as FormData.
    pub fn form_data(&self, kind: BodyKind) -> Result<FormData, ScriptError> {
        match self {
            Self::FormData { data, .. } => Ok(data.copy()),
            _ => Err(ScriptError::execute(
                kind.as_str(),
                BodyMethod::FormData.name(),
                "Failed to fetch",
            )),
        }
    }

    /// Read the body with `method` into a script value.
    pub async fn consume(&self, method: BodyMethod, kind: BodyKind) -> Result<JsValue, ScriptError> {
        match method {
            BodyMethod::Text => self.text().await.map(JsValue::from),
            BodyMethod::Bytes => self.bytes().await.map(JsValue::Bytes),
            BodyMethod::ArrayBuffer => self.bytes().await.map(JsValue::ArrayBuffer),
            BodyMethod::Json => self.json().await,
            BodyMethod::Blob => self.blob().await.map(JsValue::from),
            BodyMethod::FormData => self.form_data(kind).map(JsValue::from),
        }
    }
}

/// A body that can be read once.
#[derive(Debug)]
pub(crate) struct BodySlot {
    body: HttpBody,
    used: Mutex<bool>,
}

impl BodySlot {
    pub(crate) fn new(body: HttpBody) -> Self {
        Self {
            body,
            used: Mutex::new(false),
        }
    }

    /// A slot that already reports `bodyUsed`.
    pub(crate) fn used(body: HttpBody) -> Self {
        Self {
            body,
            used: Mutex::new(true),
        }
    }

    pub(crate) fn body(&self) -> &HttpBody {
        &self.body
    }

    pub(crate) fn is_used(&self) -> bool {
        *lock(&self.used)
    }

    /// Mark the body read and hand it out. Fails on the second call.
    pub(crate) fn take(&self, kind: BodyKind, method: BodyMethod) -> Result<HttpBody, ScriptError> {
        let mut used = lock(&self.used);
        if *used {
            return Err(already_read(kind, method));
        }
        *used = true;
        Ok(self.body.clone())
    }

    /// Read the body with `method`, as the script-facing accessors do.
    pub(crate) fn consume(&self, kind: BodyKind, method: BodyMethod) -> Result<JsPromise, ScriptError> {
        let body = self.take(kind, method)?;
        Ok(consume_to_promise(body, method, kind))
    }
}

/// Consume `body` asynchronously into a promise.
pub(crate) fn consume_to_promise(body: HttpBody, method: BodyMethod, kind: BodyKind) -> JsPromise {
    JsPromise::spawn(async move { body.consume(method, kind).await })
}

pub(crate) fn already_read(kind: BodyKind, method: BodyMethod) -> ScriptError {
    ScriptError::execute(kind.as_str(), method.name(), "body stream already read")
}

/// Build the headers for a Request or Response: copy `init` and add the
/// body's implied `Content-Type` when none was given.
pub(crate) fn build_headers(
    init: &JsValue,
    body: &HttpBody,
    kind: BodyKind,
) -> Result<Headers, ScriptError> {
    let headers = Headers::construct(init).map_err(|err| match err {
        ScriptError::Construct { class, message } if class == "Headers" => ScriptError::construct(
            kind.as_str(),
            format!(
                "Failed to read the 'headers' property from '{}Init': {message}",
                kind.as_str()
            ),
        ),
        other => other,
    })?;
    if !headers.has("content-type") {
        if let Some(content_type) = body.content_type() {
            headers.set("content-type", content_type);
        }
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::File;
    use crate::value::JsObject;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extraction_and_content_type() {
        assert!(HttpBody::from_value(&JsValue::Undefined).is_empty());
        assert!(HttpBody::from_value(&JsValue::Null).is_empty());
        assert_eq!(
            HttpBody::from_value(&"hi".into()).content_type().as_deref(),
            Some("text/plain; charset=UTF-8")
        );
        assert_eq!(
            HttpBody::from_value(&Blob::from_text("x", "image/png").into())
                .content_type()
                .as_deref(),
            Some("image/png")
        );
        assert_eq!(
            HttpBody::from_value(&JsValue::Bytes(Bytes::from_static(b"x"))).content_type(),
            None
        );
        let form = HttpBody::from_value(&FormData::new().into());
        assert!(
            form.content_type()
                .unwrap()
                .starts_with("multipart/form-data; boundary=----WebshimFormBoundary")
        );
    }

    #[test]
    fn test_files_extract_as_blobs() {
        let file = File::new(Blob::from_text("abc", "text/csv"), "a.csv", 0.0);
        assert!(matches!(HttpBody::from_value(&file.into()), HttpBody::Blob(_)));
    }

    #[tokio::test]
    async fn test_consume_methods() {
        let body = HttpBody::from_value(&r#"{"ok":true,"n":[1,2]}"#.into());
        let json = body.consume(BodyMethod::Json, BodyKind::Response).await.unwrap();
        assert_eq!(json.get("ok"), JsValue::from(true));
        assert_eq!(json.get("n").get("length"), JsValue::from(2));

        let bytes = body.consume(BodyMethod::Bytes, BodyKind::Response).await.unwrap();
        assert_eq!(bytes.get("length"), JsValue::from(21));

        let blob = body.blob().await.unwrap();
        assert_eq!(blob.mime_type(), "text/plain; charset=UTF-8");
    }

    #[tokio::test]
    async fn test_invalid_json_is_a_syntax_error() {
        let err = HttpBody::from_value(&"{nope".into()).json().await.unwrap_err();
        assert_eq!(err.name(), "SyntaxError");
    }

    #[tokio::test]
    async fn test_form_data_only_from_form_bodies() {
        let err = HttpBody::from_value(&"a=b".into())
            .consume(BodyMethod::FormData, BodyKind::Request)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to execute 'formData' on 'Request': Failed to fetch"
        );

        let form = FormData::new();
        form.append("k", "v");
        let read = HttpBody::from_value(&form.clone().into())
            .form_data(BodyKind::Request)
            .unwrap();
        assert!(read.has("k"));
        assert!(!read.ptr_eq(&form));
    }

    #[test]
    fn test_build_headers_rewords_errors() {
        let err = build_headers(&"bad".into(), &HttpBody::Empty, BodyKind::Request).unwrap_err();
        assert!(err.to_string().starts_with(
            "Failed to construct 'Request': Failed to read the 'headers' property from 'RequestInit': "
        ));
    }

    #[test]
    fn test_build_headers_keeps_explicit_content_type() {
        let init = JsObject::new().with("Content-Type", "application/json");
        let headers =
            build_headers(&init.into(), &HttpBody::Text("{}".into()), BodyKind::Response).unwrap();
        assert_eq!(headers.get("content-type").as_deref(), Some("application/json"));

        let headers =
            build_headers(&JsValue::Undefined, &HttpBody::Text("x".into()), BodyKind::Response)
                .unwrap();
        assert_eq!(
            headers.get("content-type").as_deref(),
            Some("text/plain; charset=UTF-8")
        );
    }

    #[tokio::test]
    async fn test_slot_reads_once() {
        let slot = BodySlot::new(HttpBody::Text("once".into()));
        assert!(!slot.is_used());
        let text = slot
            .consume(BodyKind::Response, BodyMethod::Text)
            .unwrap()
            .value()
            .await
            .unwrap();
        assert_eq!(text, JsValue::from("once"));
        assert!(slot.is_used());

        let err = slot.take(BodyKind::Response, BodyMethod::Json).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to execute 'json' on 'Response': body stream already read"
        );
    }

    #[test]
    fn test_method_names_round_trip() {
        for method in [
            BodyMethod::Text,
            BodyMethod::Bytes,
            BodyMethod::ArrayBuffer,
            BodyMethod::Json,
            BodyMethod::Blob,
            BodyMethod::FormData,
        ] {
            assert_eq!(BodyMethod::from_name(method.name()), Some(method));
        }
        assert_eq!(BodyMethod::from_name("stream"), None);
    }
}
