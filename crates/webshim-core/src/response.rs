//! The script `Response` class.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::blob::Blob;
use crate::body::{BodyKind, BodyMethod, BodySlot, HttpBody, build_headers};
use crate::error::{ScriptError, require_args};
use crate::form_data::{FormData, FormDataInstaller};
use crate::headers::{Headers, HeadersInstaller};
use crate::http::{ResponseHead, status_text};
use crate::install::{ClassDef, HostClass, Installable, Namespace, no_such_method};
use crate::promise::JsPromise;
use crate::stream::ResponseBodyStream;
use crate::value::{JsValue, arg};

const REDIRECT_STATUSES: &[u16] = &[301, 302, 303, 307, 308];

/// Options accepted by `new Response(body, init)`.
#[derive(Debug, Clone)]
pub struct ResponseInit {
    pub status: u16,
    pub status_text: String,
    /// Any value `new Headers(...)` accepts.
    pub headers: JsValue,
    pub response_type: String,
    pub redirected: bool,
    pub url: String,
}

impl Default for ResponseInit {
    fn default() -> Self {
        Self {
            status: 200,
            status_text: String::new(),
            headers: JsValue::Undefined,
            response_type: "default".to_string(),
            redirected: false,
            url: String::new(),
        }
    }
}

impl ResponseInit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `{ status, statusText, headers }` from a script value.
    pub fn from_value(init: &JsValue) -> Result<Self, ScriptError> {
        if init.is_nullish() {
            return Ok(Self::default());
        }
        if init.type_of() != "object" {
            return Err(ScriptError::construct(
                "Response",
                "The provided value is not of type 'ResponseInit'.",
            ));
        }
        let mut parsed = Self::default();
        let status = init.get("status");
        if !status.is_undefined() {
            parsed.status = status.to_integer().clamp(0, 999) as u16;
        }
        let status_text = init.get("statusText");
        if !status_text.is_undefined() {
            parsed.status_text = status_text.to_js_string();
        }
        parsed.headers = init.get("headers");
        Ok(parsed)
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    pub fn headers(mut self, headers: impl Into<JsValue>) -> Self {
        self.headers = headers.into();
        self
    }
}

/// An HTTP response. Clones share the response.
#[derive(Clone)]
pub struct Response {
    inner: Arc<ResponseInner>,
}

struct ResponseInner {
    status: u16,
    status_text: String,
    headers: Headers,
    response_type: String,
    redirected: bool,
    url: String,
    body: BodySlot,
    /// The body value as given, re-extracted by `clone()`.
    raw_body: JsValue,
}

impl Response {
    pub fn new(body: impl Into<JsValue>, init: ResponseInit) -> Result<Self, ScriptError> {
        let raw_body = body.into();
        let body = HttpBody::from_value(&raw_body);
        let headers = build_headers(&init.headers, &body, BodyKind::Response)?;
        Ok(Self::assemble(raw_body, body, headers, init))
    }

    fn assemble(raw_body: JsValue, body: HttpBody, headers: Headers, init: ResponseInit) -> Self {
        Self {
            inner: Arc::new(ResponseInner {
                status: init.status,
                status_text: init.status_text,
                headers,
                response_type: init.response_type,
                redirected: init.redirected,
                url: init.url,
                body: BodySlot::new(body),
                raw_body,
            }),
        }
    }

    /// `new Response(body?, init?)` from script arguments.
    pub fn construct(args: &[JsValue]) -> Result<Self, ScriptError> {
        let init = ResponseInit::from_value(arg(args, 1))?;
        Self::new(arg(args, 0).clone(), init)
    }

    /// `Response.error()`: a network error response.
    pub fn error() -> Self {
        let init = ResponseInit {
            status: 0,
            response_type: "error".to_string(),
            ..ResponseInit::default()
        };
        Self::assemble(JsValue::Undefined, HttpBody::Empty, Headers::new(), init)
    }

    /// `Response.redirect(url, status = 302)`.
    pub fn redirect(url: &str, status: Option<u16>) -> Result<Self, ScriptError> {
        let status = status.unwrap_or(302);
        if !REDIRECT_STATUSES.contains(&status) {
            return Err(ScriptError::execute(
                "Response",
                "redirect",
                "Invalid status code",
            ));
        }
        let headers = Headers::new();
        headers.set("location", url);
        let init = ResponseInit {
            status,
            redirected: true,
            url: url.to_string(),
            ..ResponseInit::default()
        };
        Ok(Self::assemble(JsValue::Undefined, HttpBody::Empty, headers, init))
    }

    /// `Response.json(data, init?)`: a JSON body with
    /// `content-type: application/json` unless the init sets one.
    pub fn json(data: &JsValue, init: ResponseInit) -> Result<Self, ScriptError> {
        let headers = build_headers(&init.headers, &HttpBody::Empty, BodyKind::Response)?;
        if !headers.has("content-type") {
            headers.set("content-type", "application/json");
        }
        let body = data
            .to_json()
            .map_or(JsValue::Undefined, |json| JsValue::from(json.to_string()));
        Self::new(body, init.headers(headers))
    }

    /// Build the response for a network response head. The body Blob reads
    /// from `stream` as chunks arrive.
    pub fn from_native(head: &ResponseHead, stream: ResponseBodyStream, redirected: bool) -> Self {
        let blob = Blob::new(Arc::new(stream), head.mime_type.clone().unwrap_or_default());
        let headers = Headers::from_pairs(head.headers.iter().map(|(k, v)| (k, v.clone())));
        let init = ResponseInit {
            status: head.status,
            status_text: status_text(head.status),
            redirected,
            url: head.url.as_ref().map(|u| u.to_string()).unwrap_or_default(),
            ..ResponseInit::default()
        };
        Self::assemble(blob.clone().into(), HttpBody::Blob(blob), headers, init)
    }

    pub fn status(&self) -> u16 {
        self.inner.status
    }

    pub fn status_text(&self) -> &str {
        &self.inner.status_text
    }

    /// `status` in the 200 to 299 range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.inner.status)
    }

    pub fn headers(&self) -> Headers {
        self.inner.headers.clone()
    }

    pub fn response_type(&self) -> &str {
        &self.inner.response_type
    }

    pub fn redirected(&self) -> bool {
        self.inner.redirected
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn body_used(&self) -> bool {
        self.inner.body.is_used()
    }

    /// The body as a Blob, when it can be viewed as one without reading.
    /// `None` for empty and FormData bodies.
    pub fn body(&self) -> Option<Blob> {
        match self.inner.body.body() {
            HttpBody::Empty | HttpBody::FormData { .. } => None,
            HttpBody::Blob(blob) => Some(blob.clone()),
            HttpBody::Text(text) => Some(Blob::from_text(text.clone(), "")),
            HttpBody::Buffer(bytes) => Some(Blob::from_bytes(bytes.clone(), "")),
        }
    }

    /// Script-facing body read: marks the body used and returns a promise.
    pub fn consume(&self, method: BodyMethod) -> Result<JsPromise, ScriptError> {
        self.inner.body.consume(BodyKind::Response, method)
    }

    fn take_body(&self, method: BodyMethod) -> Result<HttpBody, ScriptError> {
        self.inner.body.take(BodyKind::Response, method)
    }

    pub async fn bytes(&self) -> Result<Bytes, ScriptError> {
        self.take_body(BodyMethod::Bytes)?.bytes().await
    }

    pub async fn text(&self) -> Result<String, ScriptError> {
        self.take_body(BodyMethod::Text)?.text().await
    }

    pub async fn json_value(&self) -> Result<JsValue, ScriptError> {
        self.take_body(BodyMethod::Json)?.json().await
    }

    pub async fn blob(&self) -> Result<Blob, ScriptError> {
        self.take_body(BodyMethod::Blob)?.blob().await
    }

    pub fn form_data(&self) -> Result<FormData, ScriptError> {
        self.take_body(BodyMethod::FormData)?
            .form_data(BodyKind::Response)
    }

    /// `response.clone()`: same metadata, a copy of the headers and a body
    /// extracted afresh from the original body value.
    pub fn clone_response(&self) -> Response {
        let inner = &self.inner;
        Self {
            inner: Arc::new(ResponseInner {
                status: inner.status,
                status_text: inner.status_text.clone(),
                headers: inner.headers.copy(),
                response_type: inner.response_type.clone(),
                redirected: inner.redirected,
                url: inner.url.clone(),
                body: BodySlot::new(HttpBody::from_value(&inner.raw_body)),
                raw_body: inner.raw_body.clone(),
            }),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.inner.status)
            .field("url", &self.inner.url)
            .field("redirected", &self.inner.redirected)
            .field("headers", &self.inner.headers)
            .field("body_used", &self.body_used())
            .finish()
    }
}

impl HostClass for Response {
    fn class_name(&self) -> &'static str {
        "Response"
    }

    fn get_property(&self, name: &str) -> Option<JsValue> {
        let value = match name {
            "status" => self.status().into(),
            "statusText" => self.status_text().into(),
            "ok" => self.ok().into(),
            "headers" => self.headers().into(),
            "type" => self.response_type().into(),
            "redirected" => self.redirected().into(),
            "url" => self.url().into(),
            "bodyUsed" => self.body_used().into(),
            "body" => self.body().map_or(JsValue::Null, JsValue::from),
            _ => return None,
        };
        Some(value)
    }

    fn call_method(&self, name: &str, _args: &[JsValue]) -> Result<JsValue, ScriptError> {
        if name == "clone" {
            return Ok(self.clone_response().into());
        }
        match BodyMethod::from_name(name) {
            Some(method) => self.consume(method).map(JsValue::from),
            None => Err(no_such_method(self.class_name(), name)),
        }
    }
}

fn redirect_static(args: &[JsValue]) -> Result<JsValue, ScriptError> {
    require_args(args, 1, "Response", "redirect")?;
    let status = match arg(args, 1) {
        JsValue::Undefined => None,
        value => {
            let n = value.to_number();
            // Anything outside u16 can never be a redirect status.
            Some(if n.fract() == 0.0 && (0.0..=65535.0).contains(&n) {
                n as u16
            } else {
                0
            })
        }
    };
    Response::redirect(&args[0].to_js_string(), status).map(JsValue::from)
}

fn json_static(args: &[JsValue]) -> Result<JsValue, ScriptError> {
    require_args(args, 1, "Response", "json")?;
    let init = ResponseInit::from_value(arg(args, 1))?;
    Response::json(&args[0], init).map(JsValue::from)
}

/// Installs `Response` (with its statics) together with Headers and FormData.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseInstaller;

impl Installable for ResponseInstaller {
    fn install(&self, namespace: &mut Namespace) {
        namespace
            .install(&FormDataInstaller)
            .install(&HeadersInstaller)
            .define_class(
                ClassDef::new("Response", |args| Response::construct(args).map(JsValue::from))
                    .with_static("error", |_args| Ok(Response::error().into()))
                    .with_static("redirect", redirect_static)
                    .with_static("json", json_static),
            );
    }
}
