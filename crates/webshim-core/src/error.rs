//! Script-visible error taxonomy.
//!
//! Every failure inside the shim ends as a [`ScriptError`], which converts into
//! the error value a script observes: a thrown constructor failure, a rejected
//! promise, or a pass-through cancellation reason.

use crate::value::{ErrorValue, JsValue};

/// Message used when a value is not an iterable of parts or pairs.
pub const SEQUENCE_ERROR: &str = "The provided value cannot be converted to a sequence.";

/// Errors surfaced to script code.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScriptError {
    /// A constructor rejected its arguments.
    #[error("Failed to construct '{class}': {message}")]
    Construct { class: String, message: String },

    /// A method rejected its arguments or receiver state.
    #[error("Failed to execute '{method}' on '{class}': {message}")]
    Execute {
        class: String,
        method: String,
        message: String,
    },

    /// A generic type error (bad URL, unsupported scheme, illegal constructor).
    #[error("{0}")]
    Type(String),

    /// Malformed JSON in a body.
    #[error("{0}")]
    Syntax(String),

    /// A file-system read failed.
    #[error("{0}")]
    Io(String),

    /// The network transport failed.
    #[error("{0}")]
    Network(String),

    /// The peer violated the protocol (for example a non-HTTP response).
    #[error("{0}")]
    Protocol(String),

    /// A `DOMException` with its own name (`AbortError`, `TimeoutError`, ...).
    #[error("{message}")]
    DomException { name: String, message: String },

    /// A script value thrown as-is, such as a caller-supplied cancellation reason.
    #[error("{}", .0.to_js_string())]
    Thrown(JsValue),
}

impl ScriptError {
    pub fn construct(class: &str, message: impl Into<String>) -> Self {
        Self::Construct {
            class: class.to_string(),
            message: message.into(),
        }
    }

    pub fn execute(class: &str, method: &str, message: impl Into<String>) -> Self {
        Self::Execute {
            class: class.to_string(),
            method: method.to_string(),
            message: message.into(),
        }
    }

    pub fn dom_exception(message: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DomException {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The reason used when a signal is aborted without one.
    pub fn abort_error() -> Self {
        Self::dom_exception("signal is aborted without reason", "AbortError")
    }

    /// The reason used when `AbortSignal.timeout` fires.
    pub fn timeout_error() -> Self {
        Self::dom_exception("signal timed out", "TimeoutError")
    }

    /// The script-side error class name.
    pub fn name(&self) -> String {
        match self {
            Self::Construct { .. } | Self::Execute { .. } | Self::Type(_) => "TypeError".into(),
            Self::Syntax(_) => "SyntaxError".into(),
            Self::Io(_) | Self::Network(_) | Self::Protocol(_) => "Error".into(),
            Self::DomException { name, .. } => name.clone(),
            Self::Thrown(value) => match value {
                JsValue::Error(err) => err.name.clone(),
                _ => "Error".into(),
            },
        }
    }

    pub fn is_type_error(&self) -> bool {
        self.name() == "TypeError"
    }

    /// Convert into the value a script observes.
    pub fn to_value(&self) -> JsValue {
        match self {
            Self::Thrown(value) => value.clone(),
            Self::DomException { name, message } => {
                JsValue::Error(ErrorValue::new(name.clone(), message.clone()))
            }
            other => JsValue::Error(ErrorValue::new(other.name(), other.to_string())),
        }
    }
}

impl From<ScriptError> for JsValue {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Thrown(value) => value,
            other => other.to_value(),
        }
    }
}

impl From<std::io::Error> for ScriptError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

fn arguments_required(expected: usize, present: usize) -> String {
    let noun = if expected == 1 { "argument" } else { "arguments" };
    format!("{expected} {noun} required, but only {present} present.")
}

/// Fail a constructor call that received fewer than `expected` arguments.
pub fn require_construct_args(
    args: &[JsValue],
    expected: usize,
    class: &str,
) -> Result<(), ScriptError> {
    if args.len() < expected {
        return Err(ScriptError::construct(
            class,
            arguments_required(expected, args.len()),
        ));
    }
    Ok(())
}

/// Fail a method call that received fewer than `expected` arguments.
pub fn require_args(
    args: &[JsValue],
    expected: usize,
    class: &str,
    method: &str,
) -> Result<(), ScriptError> {
    if args.len() < expected {
        return Err(ScriptError::execute(
            class,
            method,
            arguments_required(expected, args.len()),
        ));
    }
    Ok(())
}
