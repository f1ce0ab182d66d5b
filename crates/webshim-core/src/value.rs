//! Script value model.
//!
//! [`JsValue`] is the currency exchanged between the embedding engine and the
//! shim: arguments arrive as `&[JsValue]` and results leave as `JsValue`.
//! Host objects (Blob, Headers, Request, ...) travel as [`NativeObject`]
//! handles that share state by reference, matching script object identity.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::abort::{AbortController, AbortSignal};
use crate::blob::Blob;
use crate::error::ScriptError;
use crate::fetch::FetchTask;
use crate::file::File;
use crate::form_data::FormData;
use crate::headers::Headers;
use crate::install::HostClass;
use crate::promise::JsPromise;
use crate::request::Request;
use crate::response::Response;

/// A script value.
#[derive(Debug, Clone, Default)]
pub enum JsValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// A `Date`, as milliseconds since the Unix epoch.
    Date(f64),
    Array(Vec<JsValue>),
    Object(JsObject),
    /// A `Uint8Array` view.
    Bytes(Bytes),
    ArrayBuffer(Bytes),
    Error(ErrorValue),
    Function(NativeFunction),
    Native(NativeObject),
}

static UNDEFINED: JsValue = JsValue::Undefined;

/// The argument at `index`, or `undefined` when the caller passed fewer.
pub fn arg(args: &[JsValue], index: usize) -> &JsValue {
    args.get(index).unwrap_or(&UNDEFINED)
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

/// Format a number the way script string conversion does.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

/// Format epoch milliseconds as an ISO-8601 UTC timestamp.
pub fn format_date(ms: f64) -> String {
    if !ms.is_finite() {
        return "Invalid Date".to_string();
    }
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .map(|at| at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| "Invalid Date".to_string())
}

impl JsValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    /// Whether the value is a non-null object (functions included).
    pub fn is_object(&self) -> bool {
        !matches!(
            self,
            Self::Undefined | Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_)
        )
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) => "function",
            _ => "object",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[JsValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&JsObject> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Raw bytes of a `Uint8Array` or `ArrayBuffer`.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) | Self::ArrayBuffer(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&NativeFunction> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_native(&self) -> Option<&NativeObject> {
        match self {
            Self::Native(obj) => Some(obj),
            _ => None,
        }
    }

    /// The value as a Blob. Files count as Blobs.
    pub fn as_blob(&self) -> Option<Blob> {
        match self {
            Self::Native(NativeObject::Blob(blob)) => Some(blob.clone()),
            Self::Native(NativeObject::File(file)) => Some(file.blob().clone()),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<File> {
        match self {
            Self::Native(NativeObject::File(file)) => Some(file.clone()),
            _ => None,
        }
    }

    pub fn as_headers(&self) -> Option<Headers> {
        match self {
            Self::Native(NativeObject::Headers(headers)) => Some(headers.clone()),
            _ => None,
        }
    }

    pub fn as_form_data(&self) -> Option<FormData> {
        match self {
            Self::Native(NativeObject::FormData(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<Request> {
        match self {
            Self::Native(NativeObject::Request(request)) => Some(request.clone()),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<Response> {
        match self {
            Self::Native(NativeObject::Response(response)) => Some(response.clone()),
            _ => None,
        }
    }

    pub fn as_signal(&self) -> Option<AbortSignal> {
        match self {
            Self::Native(NativeObject::AbortSignal(signal)) => Some(signal.clone()),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<JsPromise> {
        match self {
            Self::Native(NativeObject::Promise(promise)) => Some(promise.clone()),
            _ => None,
        }
    }

    pub fn as_fetch_task(&self) -> Option<Arc<FetchTask>> {
        match self {
            Self::Native(NativeObject::FetchTask(task)) => Some(Arc::clone(task)),
            _ => None,
        }
    }

    /// Script `String(value)` conversion.
    pub fn to_js_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::Date(ms) => format_date(*ms),
            Self::Array(items) => items
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_js_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => "[object Object]".to_string(),
            Self::Bytes(bytes) => bytes
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(","),
            Self::ArrayBuffer(_) => "[object ArrayBuffer]".to_string(),
            Self::Error(err) => err.to_string(),
            Self::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
            Self::Native(obj) => format!("[object {}]", obj.class_name()),
        }
    }

    /// Script `Number(value)` conversion.
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::Date(ms) => *ms,
            Self::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Self::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
            _ => f64::NAN,
        }
    }

    /// Integer conversion used for offsets: truncates, `NaN` becomes 0 and
    /// infinities saturate.
    pub fn to_integer(&self) -> i64 {
        self.to_number().trunc() as i64
    }

    /// Script `ToInt32`.
    pub fn to_int32(&self) -> i32 {
        let n = self.to_number();
        if !n.is_finite() {
            return 0;
        }
        (n.trunc().rem_euclid(4_294_967_296.0) as u32) as i32
    }

    /// Whether `for ... of` would accept the value.
    pub fn is_iterable(&self) -> bool {
        matches!(
            self,
            Self::Array(_)
                | Self::String(_)
                | Self::Bytes(_)
                | Self::Native(NativeObject::Headers(_))
                | Self::Native(NativeObject::FormData(_))
        )
    }

    /// The items `for ... of` would produce, or `None` if not iterable.
    pub fn iterate(&self) -> Option<Vec<JsValue>> {
        match self {
            Self::Array(items) => Some(items.clone()),
            Self::String(s) => Some(s.chars().map(|c| Self::String(c.to_string())).collect()),
            Self::Bytes(bytes) => Some(bytes.iter().map(|b| Self::Number(f64::from(*b))).collect()),
            Self::Native(NativeObject::Headers(headers)) => Some(
                headers
                    .entries()
                    .into_iter()
                    .map(|(name, value)| Self::Array(vec![name.into(), value.into()]))
                    .collect(),
            ),
            Self::Native(NativeObject::FormData(data)) => Some(
                data.entries()
                    .into_iter()
                    .map(|(name, value)| Self::Array(vec![name.into(), value.into()]))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Property read: `value[key]`. Missing properties read as `undefined`.
    pub fn get(&self, key: &str) -> JsValue {
        match self {
            Self::Object(obj) => obj.get(key).cloned().unwrap_or_default(),
            Self::Array(items) => match key {
                "length" => Self::from(items.len()),
                index => index
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default(),
            },
            Self::String(s) if key == "length" => Self::from(s.encode_utf16().count()),
            Self::Bytes(b) if key == "length" || key == "byteLength" => Self::from(b.len()),
            Self::ArrayBuffer(b) if key == "byteLength" => Self::from(b.len()),
            Self::Error(err) => match key {
                "name" => Self::from(err.name.as_str()),
                "message" => Self::from(err.message.as_str()),
                _ => Self::Undefined,
            },
            Self::Function(f) if key == "name" => Self::from(f.name()),
            Self::Native(obj) => obj.get_property(key).unwrap_or_default(),
            _ => Self::Undefined,
        }
    }

    /// `JSON.stringify`-compatible conversion. `None` for values that
    /// serialize as `undefined`.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value;

        match self {
            Self::Undefined | Self::Function(_) => None,
            Self::Null => Some(Value::Null),
            Self::Bool(b) => Some(Value::Bool(*b)),
            Self::Number(n) => Some(
                serde_json::Number::from_f64(*n)
                    .map(|num| {
                        if n.fract() == 0.0 && n.abs() < 9.0e15 {
                            Value::from(*n as i64)
                        } else {
                            Value::Number(num)
                        }
                    })
                    .unwrap_or(Value::Null),
            ),
            Self::String(s) => Some(Value::String(s.clone())),
            Self::Date(ms) => Some(if ms.is_finite() {
                Value::String(format_date(*ms))
            } else {
                Value::Null
            }),
            Self::Array(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|item| item.to_json().unwrap_or(Value::Null))
                    .collect(),
            )),
            Self::Object(obj) => Some(Value::Object(
                obj.iter()
                    .filter_map(|(key, value)| value.to_json().map(|v| (key.to_string(), v)))
                    .collect(),
            )),
            Self::Bytes(bytes) => Some(Value::Object(
                bytes
                    .iter()
                    .enumerate()
                    .map(|(i, b)| (i.to_string(), Value::from(*b)))
                    .collect(),
            )),
            Self::ArrayBuffer(_) | Self::Error(_) | Self::Native(_) => {
                Some(Value::Object(serde_json::Map::new()))
            }
        }
    }

    /// Build a script value from parsed JSON.
    pub fn from_json(json: serde_json::Value) -> JsValue {
        use serde_json::Value;

        match json {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from_json(value)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for JsValue {
    /// Strict equality: primitives by value, objects by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::ArrayBuffer(a), Self::ArrayBuffer(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Native(a), Self::Native(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

// ── Plain objects ───────────────────────────────────────────────────────

/// An ordered property bag (`{ key: value }`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsObject {
    entries: Vec<(String, JsValue)>,
}

impl JsObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a property. Replacing keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&JsValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, JsValue)> for JsObject {
    fn from_iter<I: IntoIterator<Item = (String, JsValue)>>(iter: I) -> Self {
        let mut obj = Self::new();
        for (key, value) in iter {
            obj.insert(key, value);
        }
        obj
    }
}

// ── Errors ──────────────────────────────────────────────────────────────

/// An `Error` instance (`TypeError`, `DOMException`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
}

impl ErrorValue {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

// ── Functions ───────────────────────────────────────────────────────────

type Callback = dyn Fn(&[JsValue]) -> Result<JsValue, ScriptError> + Send + Sync;

/// A host function callable from script.
#[derive(Clone)]
pub struct NativeFunction {
    name: Arc<str>,
    callback: Arc<Callback>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&[JsValue]) -> Result<JsValue, ScriptError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            callback: Arc::new(callback),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[JsValue]) -> Result<JsValue, ScriptError> {
        (self.callback)(args)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ── Host objects ────────────────────────────────────────────────────────

/// A host object handle. Cloning shares the underlying object.
#[derive(Debug, Clone)]
pub enum NativeObject {
    Blob(Blob),
    File(File),
    Headers(Headers),
    FormData(FormData),
    Request(Request),
    Response(Response),
    AbortController(AbortController),
    AbortSignal(AbortSignal),
    FetchTask(Arc<FetchTask>),
    Promise(JsPromise),
}

impl NativeObject {
    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Blob(a), Self::Blob(b)) => a.ptr_eq(b),
            (Self::File(a), Self::File(b)) => a.ptr_eq(b),
            (Self::Headers(a), Self::Headers(b)) => a.ptr_eq(b),
            (Self::FormData(a), Self::FormData(b)) => a.ptr_eq(b),
            (Self::Request(a), Self::Request(b)) => a.ptr_eq(b),
            (Self::Response(a), Self::Response(b)) => a.ptr_eq(b),
            (Self::AbortController(a), Self::AbortController(b)) => a.ptr_eq(b),
            (Self::AbortSignal(a), Self::AbortSignal(b)) => a.ptr_eq(b),
            (Self::FetchTask(a), Self::FetchTask(b)) => Arc::ptr_eq(a, b),
            (Self::Promise(a), Self::Promise(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

// ── Conversions ─────────────────────────────────────────────────────────

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for JsValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for JsValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

macro_rules! number_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for JsValue {
            fn from(n: $ty) -> Self {
                Self::Number(n as f64)
            }
        })*
    };
}

number_from!(i32, i64, u16, u32, u64, usize);

impl From<Bytes> for JsValue {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<JsValue>> for JsValue {
    fn from(items: Vec<JsValue>) -> Self {
        Self::Array(items)
    }
}

impl From<JsObject> for JsValue {
    fn from(obj: JsObject) -> Self {
        Self::Object(obj)
    }
}

impl From<ErrorValue> for JsValue {
    fn from(err: ErrorValue) -> Self {
        Self::Error(err)
    }
}

impl From<NativeFunction> for JsValue {
    fn from(f: NativeFunction) -> Self {
        Self::Function(f)
    }
}

impl From<NativeObject> for JsValue {
    fn from(obj: NativeObject) -> Self {
        Self::Native(obj)
    }
}

macro_rules! native_from {
    ($($ty:ty => $variant:ident),*) => {
        $(impl From<$ty> for JsValue {
            fn from(value: $ty) -> Self {
                Self::Native(NativeObject::$variant(value))
            }
        })*
    };
}

native_from!(
    Blob => Blob,
    File => File,
    Headers => Headers,
    FormData => FormData,
    Request => Request,
    Response => Response,
    AbortController => AbortController,
    AbortSignal => AbortSignal,
    Arc<FetchTask> => FetchTask,
    JsPromise => Promise
);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_string_conversion() {
        assert_eq!(JsValue::Undefined.to_js_string(), "undefined");
        assert_eq!(JsValue::Null.to_js_string(), "null");
        assert_eq!(JsValue::from(3.0).to_js_string(), "3");
        assert_eq!(JsValue::from(1.5).to_js_string(), "1.5");
        assert_eq!(JsValue::from(f64::NAN).to_js_string(), "NaN");
        assert_eq!(JsValue::Object(JsObject::new()).to_js_string(), "[object Object]");
        assert_eq!(
            JsValue::from(vec![JsValue::from(1), JsValue::Null, JsValue::from("x")])
                .to_js_string(),
            "1,,x"
        );
        assert_eq!(JsValue::from(Blob::empty()).to_js_string(), "[object Blob]");
    }

    #[test]
    fn test_number_conversion() {
        assert_eq!(JsValue::from(" 42 ").to_number(), 42.0);
        assert_eq!(JsValue::from("").to_number(), 0.0);
        assert!(JsValue::from("abc").to_number().is_nan());
        assert_eq!(JsValue::Null.to_number(), 0.0);
        assert_eq!(JsValue::from(true).to_number(), 1.0);
        assert_eq!(JsValue::from(-2.7).to_integer(), -2);
        assert_eq!(JsValue::Undefined.to_integer(), 0);
        assert_eq!(JsValue::from(f64::INFINITY).to_integer(), i64::MAX);
    }

    #[test]
    fn test_int32_wraps() {
        assert_eq!(JsValue::from(4_294_967_297.0).to_int32(), 1);
        assert_eq!(JsValue::from(2_147_483_648.0).to_int32(), -2_147_483_648);
        assert_eq!(JsValue::from(-1.9).to_int32(), -1);
        assert_eq!(JsValue::from(f64::NAN).to_int32(), 0);
    }

    #[test]
    fn test_object_preserves_insertion_order() {
        let obj = JsObject::new().with("b", 1).with("a", 2).with("b", 3);
        let keys: Vec<&str> = obj.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(obj.get("b"), Some(&JsValue::from(3)));
    }

    #[test]
    fn test_property_access() {
        let obj = JsValue::from(JsObject::new().with("type", "text/plain"));
        assert_eq!(obj.get("type"), JsValue::from("text/plain"));
        assert_eq!(obj.get("missing"), JsValue::Undefined);
        assert_eq!(JsValue::Undefined.get("type"), JsValue::Undefined);
        assert_eq!(JsValue::from("héllo").get("length"), JsValue::from(5));
    }

    #[test]
    fn test_iterables() {
        assert!(JsValue::from("ab").is_iterable());
        assert!(!JsValue::from(1).is_iterable());
        assert!(!JsValue::Object(JsObject::new()).is_iterable());
        assert_eq!(
            JsValue::Bytes(Bytes::from_static(&[1, 2])).iterate(),
            Some(vec![JsValue::from(1), JsValue::from(2)])
        );
    }

    #[test]
    fn test_identity_equality() {
        let blob = Blob::from_text("x", "");
        let a = JsValue::from(blob.clone());
        let b = JsValue::from(blob);
        let c = JsValue::from(Blob::from_text("x", ""));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_json_conversion() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"a":[1,2.5,null],"b":{"c":"d"}}"#).unwrap();
        let value = JsValue::from_json(json.clone());
        assert_eq!(value.get("b").get("c"), JsValue::from("d"));
        assert_eq!(value.to_json(), Some(json));
        assert_eq!(JsValue::Undefined.to_json(), None);
        let obj = JsValue::from(JsObject::new().with("skip", JsValue::Undefined).with("n", 1));
        assert_eq!(
            obj.to_json().map(|v| v.to_string()),
            Some(r#"{"n":1}"#.to_string())
        );
    }

    #[test]
    fn test_date_formatting() {
        assert_eq!(format_date(0.0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_date(1_700_000_000_123.0), "2023-11-14T22:13:20.123Z");
        assert_eq!(format_date(f64::NAN), "Invalid Date");
    }

    #[test]
    fn test_arg_defaults_to_undefined() {
        let args = [JsValue::from(1)];
        assert_eq!(arg(&args, 0), &JsValue::from(1));
        assert!(arg(&args, 3).is_undefined());
    }
}
