//! The script `Request` class.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::abort::{AbortInstaller, AbortSignal};
use crate::blob::Blob;
use crate::body::{BodyKind, BodyMethod, BodySlot, HttpBody, build_headers};
use crate::error::{ScriptError, require_construct_args};
use crate::form_data::{FormData, FormDataInstaller};
use crate::headers::{Headers, HeadersInstaller};
use crate::install::{ClassDef, HostClass, Installable, Namespace, no_such_method};
use crate::promise::JsPromise;
use crate::value::{JsValue, arg};

const METHODS_TO_NORMALIZE: &[&str] = &["DELETE", "GET", "HEAD", "OPTIONS", "POST", "PUT"];

/// Options accepted by `new Request(input, init)`. Unset fields fall back to
/// the source request's options, then to the defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestInit {
    pub method: Option<String>,
    /// Any value `new Headers(...)` accepts; `undefined` when unset.
    pub headers: JsValue,
    /// Any body value; `undefined` when unset.
    pub body: JsValue,
    pub signal: Option<AbortSignal>,
    pub credentials: Option<String>,
    pub cache: Option<String>,
    pub integrity: Option<String>,
    pub keepalive: Option<bool>,
    pub mode: Option<String>,
    pub redirect: Option<String>,
    pub referrer: Option<String>,
    pub referrer_policy: Option<String>,
}

fn string_option(value: JsValue) -> Option<String> {
    if value.is_undefined() {
        None
    } else {
        Some(value.to_js_string())
    }
}

impl RequestInit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read options from a script value. `undefined` and `null` give the
    /// defaults; other non-objects are rejected.
    pub fn from_value(init: &JsValue) -> Result<Self, ScriptError> {
        if init.is_nullish() {
            return Ok(Self::default());
        }
        if init.type_of() != "object" {
            return Err(ScriptError::construct(
                "Request",
                "The provided value is not of type 'RequestInit'.",
            ));
        }
        let keepalive = init.get("keepalive");
        Ok(Self {
            method: string_option(init.get("method")),
            headers: init.get("headers"),
            body: init.get("body"),
            signal: init.get("signal").as_signal(),
            credentials: string_option(init.get("credentials")),
            cache: string_option(init.get("cache")),
            integrity: string_option(init.get("integrity")),
            keepalive: (!keepalive.is_undefined()).then(|| keepalive.truthy()),
            mode: string_option(init.get("mode")),
            redirect: string_option(init.get("redirect")),
            referrer: string_option(init.get("referrer")),
            referrer_policy: string_option(init.get("referrerPolicy")),
        })
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn headers(mut self, headers: impl Into<JsValue>) -> Self {
        self.headers = headers.into();
        self
    }

    pub fn body(mut self, body: impl Into<JsValue>) -> Self {
        self.body = body.into();
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Overlay `other` on `self`: fields set in `other` win.
    fn overlay(self, other: RequestInit) -> RequestInit {
        fn pick(over: JsValue, base: JsValue) -> JsValue {
            if over.is_undefined() { base } else { over }
        }
        RequestInit {
            method: other.method.or(self.method),
            headers: pick(other.headers, self.headers),
            body: pick(other.body, self.body),
            signal: other.signal.or(self.signal),
            credentials: other.credentials.or(self.credentials),
            cache: other.cache.or(self.cache),
            integrity: other.integrity.or(self.integrity),
            keepalive: other.keepalive.or(self.keepalive),
            mode: other.mode.or(self.mode),
            redirect: other.redirect.or(self.redirect),
            referrer: other.referrer.or(self.referrer),
            referrer_policy: other.referrer_policy.or(self.referrer_policy),
        }
    }
}

fn normalize_method(method: &str) -> String {
    METHODS_TO_NORMALIZE
        .iter()
        .find(|known| known.eq_ignore_ascii_case(method))
        .map_or_else(|| method.to_string(), |known| (*known).to_string())
}

/// An HTTP request description. Clones share the request.
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

struct RequestInner {
    url: String,
    method: String,
    headers: Headers,
    body: BodySlot,
    /// The options as given, with `headers` and `body` left raw for copies.
    init: RequestInit,
}

impl Request {
    pub fn new(url: impl Into<String>, init: RequestInit) -> Result<Self, ScriptError> {
        Self::build(url.into(), init, false)
    }

    /// `new Request(source, init)`: copy `source`, overriding with `init`.
    pub fn from_request(source: &Request, init: RequestInit) -> Result<Self, ScriptError> {
        let mut base = source.inner.init.clone();
        base.headers = source.headers().into();
        let merged = base.overlay(init);
        Self::build(source.url().to_string(), merged, source.body_used())
    }

    fn build(url: String, init: RequestInit, body_used: bool) -> Result<Self, ScriptError> {
        let method = normalize_method(init.method.as_deref().unwrap_or("GET"));
        if !init.body.is_nullish() && (method == "GET" || method == "HEAD") {
            return Err(ScriptError::construct(
                BodyKind::Request.as_str(),
                "Request with GET/HEAD method cannot have body.",
            ));
        }
        let body = HttpBody::from_value(&init.body);
        let headers = build_headers(&init.headers, &body, BodyKind::Request)?;
        let body = if body_used {
            BodySlot::used(body)
        } else {
            BodySlot::new(body)
        };
        Ok(Self {
            inner: Arc::new(RequestInner {
                url,
                method,
                headers,
                body,
                init,
            }),
        })
    }

    /// `new Request(input, init?)` from script arguments.
    pub fn construct(args: &[JsValue]) -> Result<Self, ScriptError> {
        require_construct_args(args, 1, "Request")?;
        let init = RequestInit::from_value(arg(args, 1))?;
        match args[0].as_request() {
            Some(source) => Self::from_request(&source, init),
            None => Self::new(args[0].to_js_string(), init),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn method(&self) -> &str {
        &self.inner.method
    }

    /// The request's header collection (shared, not a copy).
    pub fn headers(&self) -> Headers {
        self.inner.headers.clone()
    }

    pub fn signal(&self) -> Option<AbortSignal> {
        self.inner.init.signal.clone()
    }

    pub fn credentials(&self) -> &str {
        self.inner.init.credentials.as_deref().unwrap_or("same-origin")
    }

    pub fn cache(&self) -> &str {
        self.inner.init.cache.as_deref().unwrap_or("default")
    }

    pub fn integrity(&self) -> &str {
        self.inner.init.integrity.as_deref().unwrap_or("")
    }

    pub fn keepalive(&self) -> bool {
        self.inner.init.keepalive.unwrap_or(false)
    }

    pub fn mode(&self) -> &str {
        self.inner.init.mode.as_deref().unwrap_or("cors")
    }

    pub fn redirect(&self) -> &str {
        self.inner.init.redirect.as_deref().unwrap_or("follow")
    }

    pub fn referrer(&self) -> &str {
        self.inner.init.referrer.as_deref().unwrap_or("about:client")
    }

    pub fn referrer_policy(&self) -> Option<&str> {
        self.inner.init.referrer_policy.as_deref()
    }

    pub fn body_used(&self) -> bool {
        self.inner.body.is_used()
    }

    /// Script-facing body read: marks the body used and returns a promise.
    pub fn consume(&self, method: BodyMethod) -> Result<JsPromise, ScriptError> {
        self.inner.body.consume(BodyKind::Request, method)
    }

    fn take_body(&self, method: BodyMethod) -> Result<HttpBody, ScriptError> {
        self.inner.body.take(BodyKind::Request, method)
    }

    pub async fn bytes(&self) -> Result<Bytes, ScriptError> {
        self.take_body(BodyMethod::Bytes)?.bytes().await
    }

    pub async fn text(&self) -> Result<String, ScriptError> {
        self.take_body(BodyMethod::Text)?.text().await
    }

    pub async fn json(&self) -> Result<JsValue, ScriptError> {
        self.take_body(BodyMethod::Json)?.json().await
    }

    pub async fn blob(&self) -> Result<Blob, ScriptError> {
        self.take_body(BodyMethod::Blob)?.blob().await
    }

    pub fn form_data(&self) -> Result<FormData, ScriptError> {
        self.take_body(BodyMethod::FormData)?
            .form_data(BodyKind::Request)
    }

    /// `request.clone()`.
    pub fn clone_request(&self) -> Result<Request, ScriptError> {
        Self::from_request(self, RequestInit::default())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.inner.method)
            .field("url", &self.inner.url)
            .field("headers", &self.inner.headers)
            .field("body_used", &self.body_used())
            .finish()
    }
}

impl HostClass for Request {
    fn class_name(&self) -> &'static str {
        "Request"
    }

    fn get_property(&self, name: &str) -> Option<JsValue> {
        let value = match name {
            "url" => self.url().into(),
            "method" => self.method().into(),
            "headers" => self.headers().into(),
            "bodyUsed" => self.body_used().into(),
            "signal" => self.signal().map_or(JsValue::Undefined, JsValue::from),
            "credentials" => self.credentials().into(),
            "cache" => self.cache().into(),
            "integrity" => self.integrity().into(),
            "keepalive" => self.keepalive().into(),
            "mode" => self.mode().into(),
            "redirect" => self.redirect().into(),
            "referrer" => self.referrer().into(),
            "referrerPolicy" => self.referrer_policy().map_or(JsValue::Undefined, JsValue::from),
            _ => return None,
        };
        Some(value)
    }

    fn call_method(&self, name: &str, _args: &[JsValue]) -> Result<JsValue, ScriptError> {
        if name == "clone" {
            return self.clone_request().map(JsValue::from);
        }
        match BodyMethod::from_name(name) {
            Some(method) => self.consume(method).map(JsValue::from),
            None => Err(no_such_method(self.class_name(), name)),
        }
    }
}

/// Installs `Request` together with Headers, FormData and the abort family.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestInstaller;

impl Installable for RequestInstaller {
    fn install(&self, namespace: &mut Namespace) {
        namespace
            .install(&FormDataInstaller)
            .install(&HeadersInstaller)
            .install(&AbortInstaller)
            .define_class(ClassDef::new("Request", |args| {
                Request::construct(args).map(JsValue::from)
            }));
    }
}
