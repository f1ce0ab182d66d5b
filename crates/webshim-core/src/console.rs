//! Script `console` forwarding.
//!
//! `console.log` and friends format their arguments (honouring `%s %d %i %f
//! %o %O %c` substitutions) and hand the resulting line to a
//! [`ConsoleLogger`]. The default logger emits `tracing` events under
//! [`CONSOLE_TARGET`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use webshim_config::ConsoleConfig;

use crate::install::{HostClass, Installable, Namespace};
use crate::promise::PromiseState;
use crate::value::{JsValue, NativeObject, format_date, format_number};

/// `tracing` target for script console output.
pub const CONSOLE_TARGET: &str = "webshim::console";

/// Console severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConsoleLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl ConsoleLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for ConsoleLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" | "log" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown console level {other:?}")),
        }
    }
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for formatted console lines. `level` is `None` for `console.log`.
pub trait ConsoleLogger: Send + Sync {
    fn log(&self, level: Option<ConsoleLevel>, message: &str);
}

/// Forwards console lines to `tracing`, dropping those below `min_level`.
/// `console.log` counts as `info`.
#[derive(Debug, Clone, Copy)]
pub struct TracingConsoleLogger {
    min_level: ConsoleLevel,
}

impl TracingConsoleLogger {
    pub fn new(min_level: ConsoleLevel) -> Self {
        Self { min_level }
    }
}

impl Default for TracingConsoleLogger {
    fn default() -> Self {
        Self::new(ConsoleLevel::Trace)
    }
}

impl ConsoleLogger for TracingConsoleLogger {
    fn log(&self, level: Option<ConsoleLevel>, message: &str) {
        let level = level.unwrap_or(ConsoleLevel::Info);
        if level < self.min_level {
            return;
        }
        match level {
            ConsoleLevel::Trace => tracing::trace!(target: CONSOLE_TARGET, "{message}"),
            ConsoleLevel::Debug => tracing::debug!(target: CONSOLE_TARGET, "{message}"),
            ConsoleLevel::Info => tracing::info!(target: CONSOLE_TARGET, "{message}"),
            ConsoleLevel::Warn => tracing::warn!(target: CONSOLE_TARGET, "{message}"),
            ConsoleLevel::Error => tracing::error!(target: CONSOLE_TARGET, "{message}"),
        }
    }
}

/// Installs `console.log`, `console.trace`, `console.debug`, `console.info`,
/// `console.warn` and `console.error`.
#[derive(Clone)]
pub struct ConsoleInstaller {
    logger: Arc<dyn ConsoleLogger>,
}

impl ConsoleInstaller {
    pub fn new(logger: Arc<dyn ConsoleLogger>) -> Self {
        Self { logger }
    }

    /// A tracing-backed console honouring `console.level`.
    pub fn from_config(config: &ConsoleConfig) -> Self {
        let min_level = config.level.parse().unwrap_or(ConsoleLevel::Info);
        Self::new(Arc::new(TracingConsoleLogger::new(min_level)))
    }
}

impl Default for ConsoleInstaller {
    fn default() -> Self {
        Self::new(Arc::new(TracingConsoleLogger::default()))
    }
}

impl Installable for ConsoleInstaller {
    fn install(&self, namespace: &mut Namespace) {
        let methods = [
            ("log", None),
            ("trace", Some(ConsoleLevel::Trace)),
            ("debug", Some(ConsoleLevel::Debug)),
            ("info", Some(ConsoleLevel::Info)),
            ("warn", Some(ConsoleLevel::Warn)),
            ("error", Some(ConsoleLevel::Error)),
        ];
        for (method, level) in methods {
            let logger = Arc::clone(&self.logger);
            namespace.define_function(&format!("console.{method}"), move |args| {
                logger.log(level, &format_console_args(args));
                Ok(JsValue::Undefined)
            });
        }
    }
}

// ── Formatting ──────────────────────────────────────────────────────────

/// Format console arguments into one line.
///
/// When the first argument is a string, `%` specifiers in it consume the
/// following arguments; leftovers are appended space-separated. A `%` that
/// directly follows another `%` is never a specifier.
pub fn format_console_args(args: &[JsValue]) -> String {
    let Some((JsValue::String(format), rest)) = args.split_first() else {
        return args
            .iter()
            .map(|value| loggable_string(value, false))
            .collect::<Vec<_>>()
            .join(" ");
    };

    let mut remaining = rest.iter();
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut previous = None;
    while let Some(c) = chars.next() {
        if c == '%' && previous != Some('%') {
            if let Some(&spec) = chars.peek() {
                if matches!(spec, 's' | 'd' | 'i' | 'f' | 'o' | 'O' | 'c') {
                    if let Some(value) = remaining.next() {
                        chars.next();
                        out.push_str(&substitute(spec, value));
                        previous = Some(spec);
                        continue;
                    }
                }
            }
        }
        out.push(c);
        previous = Some(c);
    }

    std::iter::once(out)
        .chain(remaining.map(|value| loggable_string(value, false)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn substitute(spec: char, value: &JsValue) -> String {
    match spec {
        'd' | 'i' => match value {
            JsValue::Number(n) if n.is_finite() => value.to_int32().to_string(),
            JsValue::Number(n) => format_number(*n),
            _ => "NaN".to_string(),
        },
        'f' => match value {
            JsValue::Number(n) => format_number(*n),
            _ => "NaN".to_string(),
        },
        'o' | 'O' => loggable_string(value, true),
        'c' => String::new(),
        _ => loggable_string(value, false),
    }
}

/// Render a value for console output. Nested strings are quoted.
pub fn loggable_string(value: &JsValue, nested: bool) -> String {
    match value {
        JsValue::Undefined => "undefined".to_string(),
        JsValue::Null => "null".to_string(),
        JsValue::Bool(b) => b.to_string(),
        JsValue::Number(n) => format_number(*n),
        JsValue::String(s) if nested => format!("'{s}'"),
        JsValue::String(s) => s.clone(),
        JsValue::Date(ms) => format_date(*ms),
        JsValue::Array(items) if items.is_empty() => "[]".to_string(),
        JsValue::Array(items) => format!(
            "[ {} ]",
            items
                .iter()
                .map(|item| loggable_string(item, true))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        JsValue::Object(obj) if obj.is_empty() => "{}".to_string(),
        JsValue::Object(obj) => format!(
            "{{ {} }}",
            obj.iter()
                .map(|(key, value)| format!("{}: {}", object_key(key), loggable_string(value, true)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        JsValue::Bytes(bytes) if bytes.is_empty() => "Uint8Array(0) []".to_string(),
        JsValue::Bytes(bytes) => format!(
            "Uint8Array({}) [ {} ]",
            bytes.len(),
            bytes
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        JsValue::ArrayBuffer(bytes) => format!("ArrayBuffer {{ byteLength: {} }}", bytes.len()),
        JsValue::Error(err) => err.to_string(),
        JsValue::Function(function) if function.name().is_empty() => {
            "[Function (anonymous)]".to_string()
        }
        JsValue::Function(function) => format!("[Function: {}]", function.name()),
        JsValue::Native(native) => native_loggable(native),
    }
}

fn object_key(key: &str) -> String {
    let plain = key
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if plain {
        key.to_string()
    } else {
        format!("'{key}'")
    }
}

fn native_loggable(native: &NativeObject) -> String {
    match native {
        NativeObject::Blob(blob) => {
            format!("Blob {{ size: {}, type: '{}' }}", blob.size(), blob.mime_type())
        }
        NativeObject::File(file) => format!(
            "File {{ name: '{}', size: {}, type: '{}' }}",
            file.name(),
            file.blob().size(),
            file.blob().mime_type()
        ),
        NativeObject::Promise(promise) => match promise.state() {
            PromiseState::Pending => "Promise { <pending> }".to_string(),
            PromiseState::Fulfilled(value) => {
                format!("Promise {{ {} }}", loggable_string(&value, true))
            }
            PromiseState::Rejected(reason) => {
                format!("Promise {{ <rejected> {} }}", loggable_string(&reason, true))
            }
        },
        other => format!("{} {{}}", other.class_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::Blob;
    use crate::value::{JsObject, NativeFunction};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLogger {
        lines: Mutex<Vec<(Option<ConsoleLevel>, String)>>,
    }

    impl ConsoleLogger for RecordingLogger {
        fn log(&self, level: Option<ConsoleLevel>, message: &str) {
            self.lines.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn test_specifier_substitution() {
        let args = [
            JsValue::from("%s has %d items costing %f"),
            JsValue::from("cart"),
            JsValue::from(3.7),
            JsValue::from(9.5),
        ];
        assert_eq!(format_console_args(&args), "cart has 3 items costing 9.5");
    }

    #[test]
    fn test_escaped_and_unmatched_specifiers() {
        let args = [JsValue::from("100%%s done %s"), JsValue::from("now")];
        assert_eq!(format_console_args(&args), "100%%s done now");

        let args = [JsValue::from("%s and %s"), JsValue::from("one")];
        assert_eq!(format_console_args(&args), "one and %s");
    }

    #[test]
    fn test_leftover_arguments_are_appended() {
        let args = [
            JsValue::from("total:"),
            JsValue::from(5),
            JsValue::from(vec![JsValue::from("a"), JsValue::from(1)]),
        ];
        assert_eq!(format_console_args(&args), "total: 5 [ 'a', 1 ]");
    }

    #[test]
    fn test_non_string_first_argument() {
        let args = [JsValue::from(1), JsValue::Null, JsValue::Undefined];
        assert_eq!(format_console_args(&args), "1 null undefined");
    }

    #[test]
    fn test_object_rendering() {
        let obj = JsObject::new()
            .with("name", "x")
            .with("content-type", "y")
            .with("nested", JsObject::new());
        assert_eq!(
            loggable_string(&obj.into(), false),
            "{ name: 'x', 'content-type': 'y', nested: {} }"
        );
        assert_eq!(
            loggable_string(&Blob::from_text("ab", "text/plain").into(), false),
            "Blob { size: 2, type: 'text/plain' }"
        );
        let function = NativeFunction::new("handler", |_| Ok(JsValue::Undefined));
        assert_eq!(loggable_string(&function.into(), false), "[Function: handler]");
    }

    #[test]
    fn test_directive_c_is_dropped() {
        let args = [JsValue::from("%cstyled"), JsValue::from("color: red")];
        assert_eq!(format_console_args(&args), "styled");
    }

    #[test]
    fn test_installer_routes_levels() {
        let logger = Arc::new(RecordingLogger::default());
        let mut namespace = Namespace::new();
        namespace.install(&ConsoleInstaller::new(logger.clone()));

        namespace.call("console.log", &["plain".into()]).unwrap();
        namespace
            .call("console.warn", &["careful %s".into(), "now".into()])
            .unwrap();

        let lines = logger.lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                (None, "plain".to_string()),
                (Some(ConsoleLevel::Warn), "careful now".to_string()),
            ]
        );
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("WARN".parse::<ConsoleLevel>(), Ok(ConsoleLevel::Warn));
        assert_eq!("log".parse::<ConsoleLevel>(), Ok(ConsoleLevel::Info));
        assert!("loud".parse::<ConsoleLevel>().is_err());
        assert!(ConsoleLevel::Error > ConsoleLevel::Info);
    }
}
