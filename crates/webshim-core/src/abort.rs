//! AbortController, AbortSignal and DOMException.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ScriptError, require_args};
use crate::install::{ClassDef, HostClass, Installable, Namespace, no_such_method};
use crate::lock;
use crate::value::{ErrorValue, JsObject, JsValue, NativeFunction, arg};

/// Owns an [`AbortSignal`] and fires it.
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Abort the signal. `None` or `undefined` records an `AbortError`.
    pub fn abort(&self, reason: Option<JsValue>) {
        self.signal.signal_abort(resolve_reason(reason));
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.signal.ptr_eq(&other.signal)
    }
}

fn resolve_reason(reason: Option<JsValue>) -> JsValue {
    match reason {
        Some(value) if !value.is_undefined() => value,
        _ => ScriptError::abort_error().to_value(),
    }
}

/// A one-shot abort notification. Clones share the signal.
#[derive(Clone, Default)]
pub struct AbortSignal {
    state: Arc<Mutex<SignalState>>,
}

#[derive(Default)]
struct SignalState {
    aborted: bool,
    reason: JsValue,
    onabort: Option<NativeFunction>,
    listeners: Vec<NativeFunction>,
    dependents: Vec<AbortSignal>,
}

impl AbortSignal {
    /// `AbortSignal.abort(reason?)`: an already-aborted signal.
    pub fn aborted_with(reason: Option<JsValue>) -> Self {
        let signal = Self::default();
        signal.signal_abort(resolve_reason(reason));
        signal
    }

    /// `AbortSignal.timeout(ms)`: aborts with a `TimeoutError` after `delay`.
    pub fn timeout(delay: Duration) -> Result<Self, ScriptError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| ScriptError::Protocol(format!("no async runtime available: {e}")))?;
        let signal = Self::default();
        let target = signal.clone();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            target.signal_abort(ScriptError::timeout_error().to_value());
        });
        Ok(signal)
    }

    /// `AbortSignal.any(signals)`: aborts when any input aborts, with its reason.
    pub fn any(signals: &[AbortSignal]) -> Self {
        let combined = Self::default();
        if let Some(already) = signals.iter().find(|s| s.aborted()) {
            combined.signal_abort(already.reason());
            return combined;
        }
        for signal in signals {
            lock(&signal.state).dependents.push(combined.clone());
        }
        combined
    }

    pub fn aborted(&self) -> bool {
        lock(&self.state).aborted
    }

    /// The abort reason; `undefined` while not aborted.
    pub fn reason(&self) -> JsValue {
        lock(&self.state).reason.clone()
    }

    pub fn throw_if_aborted(&self) -> Result<(), ScriptError> {
        let state = lock(&self.state);
        if state.aborted {
            return Err(ScriptError::Thrown(state.reason.clone()));
        }
        Ok(())
    }

    /// Register an `abort` listener. Listeners added after the signal fired
    /// are never called.
    pub fn add_listener(&self, listener: NativeFunction) {
        let mut state = lock(&self.state);
        if !state.listeners.iter().any(|l| l.ptr_eq(&listener)) {
            state.listeners.push(listener);
        }
    }

    pub fn remove_listener(&self, listener: &NativeFunction) {
        lock(&self.state).listeners.retain(|l| !l.ptr_eq(listener));
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    pub fn on_abort(&self) -> JsValue {
        lock(&self.state)
            .onabort
            .clone()
            .map_or(JsValue::Null, JsValue::from)
    }

    pub fn set_on_abort(&self, handler: &JsValue) {
        lock(&self.state).onabort = handler.as_function().cloned();
    }

    fn signal_abort(&self, reason: JsValue) {
        let (handlers, dependents) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            if state.aborted {
                return;
            }
            state.aborted = true;
            state.reason = reason.clone();
            let handlers: Vec<NativeFunction> = state
                .onabort
                .iter()
                .cloned()
                .chain(state.listeners.drain(..))
                .collect();
            (handlers, std::mem::take(&mut state.dependents))
        };
        debug!(listeners = handlers.len(), "abort signal fired");

        let event = JsValue::from(
            JsObject::new()
                .with("type", "abort")
                .with("target", self.clone()),
        );
        for handler in handlers {
            if let Err(err) = handler.call(std::slice::from_ref(&event)) {
                warn!(listener = handler.name(), error = %err, "abort listener failed");
            }
        }
        for dependent in dependents {
            dependent.signal_abort(reason.clone());
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("AbortSignal")
            .field("aborted", &state.aborted)
            .field("reason", &state.reason)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

// ── Script surface ──────────────────────────────────────────────────────

impl HostClass for AbortController {
    fn class_name(&self) -> &'static str {
        "AbortController"
    }

    fn get_property(&self, name: &str) -> Option<JsValue> {
        match name {
            "signal" => Some(self.signal().into()),
            _ => None,
        }
    }

    fn call_method(&self, name: &str, args: &[JsValue]) -> Result<JsValue, ScriptError> {
        match name {
            "abort" => {
                self.abort(args.first().cloned());
                Ok(JsValue::Undefined)
            }
            _ => Err(no_such_method(self.class_name(), name)),
        }
    }
}

impl HostClass for AbortSignal {
    fn class_name(&self) -> &'static str {
        "AbortSignal"
    }

    fn get_property(&self, name: &str) -> Option<JsValue> {
        match name {
            "aborted" => Some(self.aborted().into()),
            "reason" => Some(self.reason()),
            "onabort" => Some(self.on_abort()),
            _ => None,
        }
    }

    fn set_property(&self, name: &str, value: JsValue) -> Result<(), ScriptError> {
        match name {
            "onabort" => {
                self.set_on_abort(&value);
                Ok(())
            }
            _ => Err(ScriptError::Type(format!(
                "Cannot assign to read only property '{name}' of object '[object AbortSignal]'"
            ))),
        }
    }

    fn call_method(&self, name: &str, args: &[JsValue]) -> Result<JsValue, ScriptError> {
        let class = self.class_name();
        match name {
            "throwIfAborted" => {
                self.throw_if_aborted()?;
                Ok(JsValue::Undefined)
            }
            "addEventListener" | "removeEventListener" => {
                require_args(args, 2, class, name)?;
                let listener = &args[1];
                if listener.is_nullish() {
                    return Ok(JsValue::Undefined);
                }
                if !listener.is_object() {
                    return Err(ScriptError::execute(
                        class,
                        name,
                        "parameter 2 is not of type 'Object'.",
                    ));
                }
                if args[0].to_js_string() != "abort" {
                    return Ok(JsValue::Undefined);
                }
                if let Some(function) = listener.as_function() {
                    if name == "addEventListener" {
                        self.add_listener(function.clone());
                    } else {
                        self.remove_listener(function);
                    }
                }
                Ok(JsValue::Undefined)
            }
            _ => Err(no_such_method(class, name)),
        }
    }
}

fn signal_static_timeout(args: &[JsValue]) -> Result<JsValue, ScriptError> {
    require_args(args, 1, "AbortSignal", "timeout")?;
    let Some(ms) = args[0].as_number().filter(|ms| ms.is_finite() && *ms >= 0.0) else {
        return Err(ScriptError::execute(
            "AbortSignal",
            "timeout",
            "Value is not of type 'unsigned long long'.",
        ));
    };
    AbortSignal::timeout(Duration::from_millis(ms as u64)).map(JsValue::from)
}

fn signal_static_any(args: &[JsValue]) -> Result<JsValue, ScriptError> {
    require_args(args, 1, "AbortSignal", "any")?;
    let Some(items) = args[0].iterate().filter(|_| !args[0].is_string()) else {
        return Err(ScriptError::execute(
            "AbortSignal",
            "any",
            "The provided value cannot be converted to a sequence.",
        ));
    };
    let signals = items
        .iter()
        .map(|item| {
            item.as_signal().ok_or_else(|| {
                ScriptError::execute(
                    "AbortSignal",
                    "any",
                    "Failed to convert value to 'AbortSignal'.",
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AbortSignal::any(&signals).into())
}

/// Installs `AbortController`, `AbortSignal` and `DOMException`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortInstaller;

impl Installable for AbortInstaller {
    fn install(&self, namespace: &mut Namespace) {
        namespace.define_class(ClassDef::new("AbortController", |_args| {
            Ok(AbortController::new().into())
        }));
        namespace.define_class(
            ClassDef::new("AbortSignal", |_args| {
                Err(ScriptError::Type("Illegal constructor".into()))
            })
            .with_static("abort", |args| {
                Ok(AbortSignal::aborted_with(args.first().cloned()).into())
            })
            .with_static("timeout", signal_static_timeout)
            .with_static("any", signal_static_any),
        );
        namespace.define_class(ClassDef::new("DOMException", |args| {
            let message = match arg(args, 0) {
                JsValue::Undefined => String::new(),
                value => value.to_js_string(),
            };
            let name = match arg(args, 1) {
                JsValue::Undefined => "Error".to_string(),
                value => value.to_js_string(),
            };
            Ok(JsValue::Error(ErrorValue::new(name, message)))
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener(counter: &Arc<AtomicUsize>) -> NativeFunction {
        let counter = Arc::clone(counter);
        NativeFunction::new("count", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(JsValue::Undefined)
        })
    }

    #[test]
    fn test_abort_without_reason() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(!signal.aborted());
        assert!(signal.reason().is_undefined());

        controller.abort(None);
        assert!(signal.aborted());
        assert_eq!(signal.reason().get("name"), JsValue::from("AbortError"));
        let err = signal.throw_if_aborted().unwrap_err();
        assert_eq!(err.to_string(), "AbortError: signal is aborted without reason");
    }

    #[test]
    fn test_abort_keeps_first_reason() {
        let controller = AbortController::new();
        controller.abort(Some("first".into()));
        controller.abort(Some("second".into()));
        assert_eq!(controller.signal().reason(), JsValue::from("first"));
    }

    #[test]
    fn test_listeners_fire_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let controller = AbortController::new();
        let signal = controller.signal();
        let listener = counting_listener(&count);
        signal.add_listener(listener.clone());
        signal.add_listener(listener);
        signal.set_on_abort(&counting_listener(&count).into());

        controller.abort(None);
        controller.abort(None);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(signal.listener_count(), 0);
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let count = Arc::new(AtomicUsize::new(0));
        let controller = AbortController::new();
        let listener = counting_listener(&count);
        controller.signal().add_listener(listener.clone());
        controller.signal().remove_listener(&listener);
        controller.abort(None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_any_follows_inputs() {
        let a = AbortController::new();
        let b = AbortController::new();
        let combined = AbortSignal::any(&[a.signal(), b.signal()]);
        assert!(!combined.aborted());
        b.abort(Some("from b".into()));
        assert!(combined.aborted());
        assert_eq!(combined.reason(), JsValue::from("from b"));

        let pre = AbortSignal::any(&[AbortSignal::aborted_with(Some("early".into()))]);
        assert_eq!(pre.reason(), JsValue::from("early"));
    }

    #[tokio::test]
    async fn test_timeout_fires() {
        let signal = AbortSignal::timeout(Duration::from_millis(5)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(signal.aborted());
        assert_eq!(signal.reason().get("name"), JsValue::from("TimeoutError"));
    }

    #[test]
    fn test_script_errors() {
        let signal = AbortSignal::default();
        let err = signal
            .call_method("addEventListener", &["abort".into(), 5.into()])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to execute 'addEventListener' on 'AbortSignal': parameter 2 is not of type 'Object'."
        );
        let err = signal_static_timeout(&["soon".into()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to execute 'timeout' on 'AbortSignal': Value is not of type 'unsigned long long'."
        );
        let err = signal_static_any(&[vec![JsValue::from(1)].into()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to execute 'any' on 'AbortSignal': Failed to convert value to 'AbortSignal'."
        );
    }

    #[test]
    fn test_constructors() {
        let mut namespace = Namespace::new();
        namespace.install(&AbortInstaller);
        let err = namespace.construct("AbortSignal", &[]).unwrap_err();
        assert_eq!(err.to_string(), "Illegal constructor");

        let exception = namespace
            .construct("DOMException", &["stop".into(), "AbortError".into()])
            .unwrap();
        assert_eq!(exception.get("name"), JsValue::from("AbortError"));
        assert_eq!(exception.get("message"), JsValue::from("stop"));
    }
}
