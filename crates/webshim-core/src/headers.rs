//! Headers: an ordered, case-insensitive multimap.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::{SEQUENCE_ERROR, ScriptError, require_args};
use crate::install::{ClassDef, HostClass, Installable, Namespace, no_such_method};
use crate::lock;
use crate::value::{JsValue, NativeFunction, arg};

const RECORD_ERROR: &str =
    "The provided value is not of type '(record<ByteString, ByteString> or sequence<sequence<ByteString>>)'.";

/// Header names are stored lowercase. Values for one name keep insertion
/// order and read back joined with `", "`.
#[derive(Clone, Default)]
pub struct Headers {
    entries: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

/// Script conversion of a header value. Arrays join with `","`.
pub(crate) fn header_value(value: &JsValue) -> String {
    match value {
        JsValue::Array(items) => items
            .iter()
            .map(JsValue::to_js_string)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_js_string(),
    }
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from name/value pairs, appending in order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = Self::new();
        for (name, value) in pairs {
            headers.append(name.as_ref(), value);
        }
        headers
    }

    /// `new Headers(init?)`: accepts `undefined`, a record, another Headers,
    /// or a sequence of `[name, value]` pairs. Later pairs replace earlier ones.
    pub fn construct(init: &JsValue) -> Result<Self, ScriptError> {
        let headers = Self::new();
        match init {
            JsValue::Undefined => {}
            JsValue::Object(record) => {
                for (name, value) in record.iter() {
                    headers.set(name, header_value(value));
                }
            }
            value if value.is_object() && value.is_iterable() => {
                for item in value.iterate().unwrap_or_default() {
                    let Some(pair) = item.as_array() else {
                        return Err(ScriptError::construct("Headers", SEQUENCE_ERROR));
                    };
                    let [name, value] = pair else {
                        return Err(ScriptError::construct("Headers", "Invalid value"));
                    };
                    headers.set(&name.to_js_string(), header_value(value));
                }
            }
            value if value.is_object() => {}
            _ => return Err(ScriptError::construct("Headers", RECORD_ERROR)),
        }
        Ok(headers)
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        lock(&self.entries)
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, values)| values.join(", "))
    }

    pub fn has(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        lock(&self.entries).iter().any(|(key, _)| *key == name)
    }

    /// Replace every value for `name`.
    pub fn set(&self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        let mut entries = lock(&self.entries);
        match entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, values)) => *values = vec![value],
            None => entries.push((name, vec![value])),
        }
    }

    /// Add a value for `name`, keeping existing ones.
    pub fn append(&self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        let mut entries = lock(&self.entries);
        match entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, values)) => values.push(value),
            None => entries.push((name, vec![value])),
        }
    }

    pub fn delete(&self, name: &str) {
        let name = name.to_ascii_lowercase();
        lock(&self.entries).retain(|(key, _)| *key != name);
    }

    /// `(name, joined value)` pairs in insertion order.
    pub fn entries(&self) -> Vec<(String, String)> {
        lock(&self.entries)
            .iter()
            .map(|(key, values)| (key.clone(), values.join(", ")))
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.entries).iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn values(&self) -> Vec<String> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Every `set-cookie` value, unjoined.
    pub fn get_set_cookie(&self) -> Vec<String> {
        lock(&self.entries)
            .iter()
            .find(|(key, _)| key == "set-cookie")
            .map(|(_, values)| values.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An independent copy.
    pub fn copy(&self) -> Self {
        Self {
            entries: Arc::new(Mutex::new(lock(&self.entries).clone())),
        }
    }

    /// Call `callback(value, name, headers)` for each entry.
    pub fn for_each(&self, callback: &NativeFunction) -> Result<(), ScriptError> {
        let this = JsValue::from(self.clone());
        for (name, value) in self.entries() {
            callback.call(&[value.into(), name.into(), this.clone()])?;
        }
        Ok(())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

fn pairs_value(pairs: Vec<(String, String)>) -> JsValue {
    JsValue::Array(
        pairs
            .into_iter()
            .map(|(name, value)| JsValue::Array(vec![name.into(), value.into()]))
            .collect(),
    )
}

fn strings_value(items: Vec<String>) -> JsValue {
    JsValue::Array(items.into_iter().map(JsValue::from).collect())
}

impl HostClass for Headers {
    fn class_name(&self) -> &'static str {
        "Headers"
    }

    fn get_property(&self, _name: &str) -> Option<JsValue> {
        None
    }

    fn call_method(&self, name: &str, args: &[JsValue]) -> Result<JsValue, ScriptError> {
        let class = self.class_name();
        match name {
            "get" => {
                require_args(args, 1, class, name)?;
                Ok(self
                    .get(&args[0].to_js_string())
                    .map_or(JsValue::Null, JsValue::from))
            }
            "has" => {
                require_args(args, 1, class, name)?;
                Ok(self.has(&args[0].to_js_string()).into())
            }
            "set" => {
                require_args(args, 2, class, name)?;
                self.set(&args[0].to_js_string(), header_value(&args[1]));
                Ok(JsValue::Undefined)
            }
            "append" => {
                require_args(args, 2, class, name)?;
                self.append(&args[0].to_js_string(), header_value(&args[1]));
                Ok(JsValue::Undefined)
            }
            "delete" => {
                require_args(args, 1, class, name)?;
                self.delete(&args[0].to_js_string());
                Ok(JsValue::Undefined)
            }
            "entries" => Ok(pairs_value(self.entries())),
            "keys" => Ok(strings_value(self.keys())),
            "values" => Ok(strings_value(self.values())),
            "getSetCookie" => Ok(strings_value(self.get_set_cookie())),
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

/// Installs the `Headers` class.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadersInstaller;

impl Installable for HeadersInstaller {
    fn install(&self, namespace: &mut Namespace) {
        namespace.define_class(ClassDef::new("Headers", |args| {
            Headers::construct(arg(args, 0)).map(JsValue::from)
        }));
    }
}
