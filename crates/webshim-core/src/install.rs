//! Namespace registration.
//!
//! Host functionality is exposed through an explicit table built once at
//! install time: dotted export paths (`"fetch"`, `"console.log"`, `"Blob"`)
//! map to native functions, classes or constant values. The embedding
//! engine walks [`Namespace::paths`] and binds each export; host objects
//! created later dispatch property reads and method calls through
//! [`HostClass`].

use std::collections::BTreeMap;
use std::fmt;

use crate::abort::AbortInstaller;
use crate::console::ConsoleInstaller;
use crate::crypto::CryptoInstaller;
use crate::error::ScriptError;
use crate::fetch::{FetchClient, FetchInstaller};
use crate::file::FileInstaller;
use crate::form_data::FormDataInstaller;
use crate::headers::HeadersInstaller;
use crate::value::{JsValue, NativeFunction, NativeObject};

/// Something that registers exports into a [`Namespace`].
pub trait Installable {
    fn install(&self, namespace: &mut Namespace);
}

/// Property and method dispatch for a host object.
pub trait HostClass {
    /// Script class name, as in `[object Blob]`.
    fn class_name(&self) -> &'static str;

    /// Read a property. `None` when the object has no such property.
    fn get_property(&self, name: &str) -> Option<JsValue>;

    /// Assign a property. Host properties are read-only unless overridden.
    fn set_property(&self, name: &str, _value: JsValue) -> Result<(), ScriptError> {
        Err(ScriptError::Type(format!(
            "Cannot assign to read only property '{name}' of object '[object {}]'",
            self.class_name()
        )))
    }

    /// Invoke a method.
    fn call_method(&self, name: &str, args: &[JsValue]) -> Result<JsValue, ScriptError>;
}

pub(crate) fn no_such_method(class: &str, name: &str) -> ScriptError {
    ScriptError::Type(format!("{class}.{name} is not a function"))
}

impl NativeObject {
    fn host(&self) -> &dyn HostClass {
        match self {
            Self::Blob(blob) => blob,
            Self::File(file) => file,
            Self::Headers(headers) => headers,
            Self::FormData(data) => data,
            Self::Request(request) => request,
            Self::Response(response) => response,
            Self::AbortController(controller) => controller,
            Self::AbortSignal(signal) => signal,
            Self::FetchTask(task) => task,
            Self::Promise(promise) => promise,
        }
    }
}

impl HostClass for NativeObject {
    fn class_name(&self) -> &'static str {
        self.host().class_name()
    }

    fn get_property(&self, name: &str) -> Option<JsValue> {
        self.host().get_property(name)
    }

    fn set_property(&self, name: &str, value: JsValue) -> Result<(), ScriptError> {
        self.host().set_property(name, value)
    }

    fn call_method(&self, name: &str, args: &[JsValue]) -> Result<JsValue, ScriptError> {
        self.host().call_method(name, args)
    }
}

// ── Exports ─────────────────────────────────────────────────────────────

/// A constructible class with optional static methods.
#[derive(Clone)]
pub struct ClassDef {
    name: String,
    constructor: NativeFunction,
    statics: BTreeMap<String, NativeFunction>,
}

impl ClassDef {
    pub fn new<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&[JsValue]) -> Result<JsValue, ScriptError> + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            constructor: NativeFunction::new(name.clone(), constructor),
            name,
            statics: BTreeMap::new(),
        }
    }

    pub fn with_static<F>(mut self, name: &str, method: F) -> Self
    where
        F: Fn(&[JsValue]) -> Result<JsValue, ScriptError> + Send + Sync + 'static,
    {
        self.statics
            .insert(name.to_string(), NativeFunction::new(name, method));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn construct(&self, args: &[JsValue]) -> Result<JsValue, ScriptError> {
        self.constructor.call(args)
    }

    pub fn static_method(&self, name: &str) -> Option<&NativeFunction> {
        self.statics.get(name)
    }

    pub fn static_names(&self) -> impl Iterator<Item = &str> {
        self.statics.keys().map(String::as_str)
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("statics", &self.statics.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One registered export.
#[derive(Debug, Clone)]
pub enum Export {
    Function(NativeFunction),
    Class(ClassDef),
    Value(JsValue),
}

/// Registration table of exported names.
#[derive(Default, Clone)]
pub struct Namespace {
    exports: BTreeMap<String, Export>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install<I: Installable + ?Sized>(&mut self, installable: &I) -> &mut Self {
        installable.install(self);
        self
    }

    /// Register a function at a dotted path. Re-registering replaces it.
    pub fn define_function<F>(&mut self, path: &str, function: F) -> &mut Self
    where
        F: Fn(&[JsValue]) -> Result<JsValue, ScriptError> + Send + Sync + 'static,
    {
        let name = path.rsplit('.').next().unwrap_or(path);
        self.exports.insert(
            path.to_string(),
            Export::Function(NativeFunction::new(name, function)),
        );
        self
    }

    pub fn define_class(&mut self, class: ClassDef) -> &mut Self {
        self.exports
            .insert(class.name().to_string(), Export::Class(class));
        self
    }

    pub fn define_value(&mut self, path: &str, value: impl Into<JsValue>) -> &mut Self {
        self.exports
            .insert(path.to_string(), Export::Value(value.into()));
        self
    }

    pub fn get(&self, path: &str) -> Option<&Export> {
        self.exports.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.exports.contains_key(path)
    }

    /// Export paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }

    /// Call a function export, or a class static as `"Class.method"`.
    pub fn call(&self, path: &str, args: &[JsValue]) -> Result<JsValue, ScriptError> {
        if let Some(Export::Function(function)) = self.exports.get(path) {
            return function.call(args);
        }
        if let Some((class, method)) = path.rsplit_once('.') {
            if let Some(Export::Class(def)) = self.exports.get(class) {
                if let Some(function) = def.static_method(method) {
                    return function.call(args);
                }
            }
        }
        Err(ScriptError::Type(format!("{path} is not a function")))
    }

    /// `new Class(...args)`.
    pub fn construct(&self, class: &str, args: &[JsValue]) -> Result<JsValue, ScriptError> {
        match self.exports.get(class) {
            Some(Export::Class(def)) => def.construct(args),
            _ => Err(ScriptError::Type(format!("{class} is not a constructor"))),
        }
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.paths()).finish()
    }
}

// ── Standard surface ────────────────────────────────────────────────────

/// Installs every host surface: Blob/File, Headers, FormData, the abort
/// family, Request/Response/fetch, console and crypto.
#[derive(Clone)]
pub struct StandardInstaller {
    fetch: FetchInstaller,
    console: ConsoleInstaller,
}

impl StandardInstaller {
    pub fn new(client: FetchClient, console: ConsoleInstaller) -> Self {
        Self {
            fetch: FetchInstaller::new(client),
            console,
        }
    }
}

impl Installable for StandardInstaller {
    fn install(&self, namespace: &mut Namespace) {
        namespace
            .install(&FileInstaller)
            .install(&HeadersInstaller)
            .install(&FormDataInstaller)
            .install(&AbortInstaller)
            .install(&self.fetch)
            .install(&self.console)
            .install(&CryptoInstaller);
    }
}

impl fmt::Debug for StandardInstaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardInstaller").finish_non_exhaustive()
    }
}

/// Build a namespace with the standard surface installed.
pub fn standard_namespace(client: FetchClient, console: ConsoleInstaller) -> Namespace {
    let mut namespace = Namespace::new();
    namespace.install(&StandardInstaller::new(client, console));
    namespace
}
