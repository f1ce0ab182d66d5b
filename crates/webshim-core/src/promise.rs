//! Promise/continuation bridge.
//!
//! A [`JsPromise`] is the script-facing side of an asynchronous native
//! operation; the paired [`Continuation`] is the native side that settles it.
//! A continuation settles its promise at most once. Later attempts are ignored
//! and logged, and a continuation dropped while still pending rejects its
//! promise instead of leaving it hanging.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

use crate::error::ScriptError;
use crate::install::{HostClass, no_such_method};
use crate::value::{ErrorValue, JsValue, NativeFunction, arg};

/// Outcome of a settled promise: fulfilled value or rejection reason.
pub type Settlement = Result<JsValue, JsValue>;

/// Observable promise state.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    Pending,
    Fulfilled(JsValue),
    Rejected(JsValue),
}

/// A script promise backed by a native continuation.
#[derive(Clone)]
pub struct JsPromise {
    slot: watch::Receiver<Option<Settlement>>,
}

/// The native handle that settles a [`JsPromise`].
///
/// Clones share the same single-use slot.
#[derive(Clone)]
pub struct Continuation {
    slot: Arc<Slot>,
}

struct Slot {
    tx: watch::Sender<Option<Settlement>>,
}

impl Slot {
    fn settle(&self, outcome: Settlement) -> bool {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        })
    }

    fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if !self.is_settled() {
            warn!("continuation dropped before it was resumed");
            self.settle(Err(JsValue::Error(ErrorValue::new(
                "Error",
                "continuation dropped before it was resumed",
            ))));
        }
    }
}

impl Continuation {
    /// Settle the promise. Returns `false` if it was already settled.
    pub fn resume(&self, outcome: Settlement) -> bool {
        let accepted = self.slot.settle(outcome);
        if !accepted {
            warn!("continuation resumed more than once; later outcome ignored");
        }
        accepted
    }

    pub fn resolve(&self, value: impl Into<JsValue>) -> bool {
        self.resume(Ok(value.into()))
    }

    pub fn reject(&self, reason: impl Into<JsValue>) -> bool {
        self.resume(Err(reason.into()))
    }

    pub fn is_settled(&self) -> bool {
        self.slot.is_settled()
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("settled", &self.is_settled())
            .finish()
    }
}

fn abandoned() -> JsValue {
    JsValue::Error(ErrorValue::new(
        "Error",
        "promise abandoned before it settled",
    ))
}

impl JsPromise {
    /// Create a pending promise and hand its continuation to `start`.
    pub fn new(start: impl FnOnce(Continuation)) -> Self {
        let (tx, rx) = watch::channel(None);
        start(Continuation {
            slot: Arc::new(Slot { tx }),
        });
        Self { slot: rx }
    }

    pub fn resolved(value: impl Into<JsValue>) -> Self {
        let (_tx, rx) = watch::channel(Some(Ok(value.into())));
        Self { slot: rx }
    }

    pub fn rejected(reason: impl Into<JsValue>) -> Self {
        let (_tx, rx) = watch::channel(Some(Err(reason.into())));
        Self { slot: rx }
    }

    /// Run `future` on the current tokio runtime and settle with its result.
    ///
    /// Rejects immediately when no runtime is available.
    pub fn spawn<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<JsValue, E>> + Send + 'static,
        E: Into<JsValue> + Send + 'static,
    {
        Self::new(
            |continuation| match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        continuation.resume(future.await.map_err(Into::into));
                    });
                }
                Err(err) => {
                    continuation.reject(ScriptError::Protocol(format!(
                        "no async runtime available: {err}"
                    )));
                }
            },
        )
    }

    pub fn state(&self) -> PromiseState {
        match &*self.slot.borrow() {
            None => PromiseState::Pending,
            Some(Ok(value)) => PromiseState::Fulfilled(value.clone()),
            Some(Err(reason)) => PromiseState::Rejected(reason.clone()),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Wait for the promise to settle.
    pub async fn settled(&self) -> Settlement {
        let mut rx = self.slot.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(slot) => match &*slot {
                Some(outcome) => outcome.clone(),
                None => Err(abandoned()),
            },
            Err(_) => Err(abandoned()),
        }
    }

    /// Wait for the promise and surface a rejection as a [`ScriptError`].
    pub async fn value(&self) -> Result<JsValue, ScriptError> {
        self.settled().await.map_err(ScriptError::Thrown)
    }

    /// Chain a fulfillment handler. Rejections pass through unchanged.
    pub fn then<F>(&self, on_fulfilled: F) -> JsPromise
    where
        F: FnOnce(JsValue) -> Result<JsValue, ScriptError> + Send + 'static,
    {
        let source = self.clone();
        JsPromise::spawn(async move {
            let value = source.settled().await?;
            on_fulfilled(value).map_err(JsValue::from)
        })
    }

    /// Chain a rejection handler. Fulfillments pass through unchanged.
    pub fn catch<F>(&self, on_rejected: F) -> JsPromise
    where
        F: FnOnce(JsValue) -> Result<JsValue, ScriptError> + Send + 'static,
    {
        let source = self.clone();
        JsPromise::spawn(async move {
            match source.settled().await {
                Ok(value) => Ok(value),
                Err(reason) => on_rejected(reason).map_err(JsValue::from),
            }
        })
    }

    /// Run `on_settled` after either outcome and pass the outcome through.
    pub fn finally<F>(&self, on_settled: F) -> JsPromise
    where
        F: FnOnce() + Send + 'static,
    {
        let source = self.clone();
        JsPromise::spawn(async move {
            let outcome = source.settled().await;
            on_settled();
            outcome
        })
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.slot.same_channel(&other.slot)
    }
}

impl fmt::Debug for JsPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsPromise")
            .field("state", &self.state())
            .finish()
    }
}

// ── Script surface ──────────────────────────────────────────────────────

/// Call a script handler and adopt a returned promise.
async fn run_handler(handler: NativeFunction, input: JsValue) -> Settlement {
    let output = handler.call(&[input]).map_err(JsValue::from)?;
    match output.as_promise() {
        Some(next) => next.settled().await,
        None => Ok(output),
    }
}

impl HostClass for JsPromise {
    fn class_name(&self) -> &'static str {
        "Promise"
    }

    fn get_property(&self, _name: &str) -> Option<JsValue> {
        None
    }

    fn call_method(&self, name: &str, args: &[JsValue]) -> Result<JsValue, ScriptError> {
        let source = self.clone();
        let first = arg(args, 0).as_function().cloned();
        let promise = match name {
            "then" => {
                let on_rejected = arg(args, 1).as_function().cloned();
                JsPromise::spawn(async move {
                    match (source.settled().await, first, on_rejected) {
                        (Ok(value), Some(handler), _) => run_handler(handler, value).await,
                        (Err(reason), _, Some(handler)) => run_handler(handler, reason).await,
                        (outcome, _, _) => outcome,
                    }
                })
            }
            "catch" => JsPromise::spawn(async move {
                match (source.settled().await, first) {
                    (Err(reason), Some(handler)) => run_handler(handler, reason).await,
                    (outcome, _) => outcome,
                }
            }),
            "finally" => JsPromise::spawn(async move {
                let outcome = source.settled().await;
                if let Some(handler) = first {
                    run_handler(handler, JsValue::Undefined).await?;
                }
                outcome
            }),
            _ => return Err(no_such_method(self.class_name(), name)),
        };
        Ok(promise.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_resolve_settles_once() {
        let mut handle = None;
        let promise = JsPromise::new(|c| handle = Some(c));
        let continuation = handle.unwrap();

        assert_eq!(promise.state(), PromiseState::Pending);
        assert!(continuation.resolve("first"));
        assert!(!continuation.reject("second"));
        assert_eq!(promise.settled().await, Ok(JsValue::from("first")));
    }

    #[tokio::test]
    async fn test_clones_share_the_slot() {
        let mut handle = None;
        let promise = JsPromise::new(|c| handle = Some(c));
        let a = handle.unwrap();
        let b = a.clone();

        assert!(b.reject("boom"));
        assert!(!a.resolve(1));
        assert!(a.is_settled());
        assert_eq!(promise.state(), PromiseState::Rejected(JsValue::from("boom")));
    }

    #[tokio::test]
    async fn test_dropped_continuation_rejects() {
        let promise = JsPromise::new(drop);
        let JsValue::Error(err) = promise.settled().await.unwrap_err() else {
            panic!("expected an error value");
        };
        assert_eq!(err.message, "continuation dropped before it was resumed");
    }

    #[tokio::test]
    async fn test_spawn_maps_errors() {
        let ok = JsPromise::spawn(async { Ok::<_, ScriptError>(JsValue::from(7)) });
        assert_eq!(ok.settled().await, Ok(JsValue::from(7)));

        let err = JsPromise::spawn(async {
            Err::<JsValue, _>(ScriptError::Type("bad input".into()))
        });
        let reason = err.settled().await.unwrap_err();
        assert_eq!(reason.get("name"), JsValue::from("TypeError"));
        assert_eq!(reason.get("message"), JsValue::from("bad input"));
    }

    #[test]
    fn test_spawn_without_runtime_rejects() {
        let promise = JsPromise::spawn(async { Ok::<_, ScriptError>(JsValue::Null) });
        assert!(matches!(promise.state(), PromiseState::Rejected(_)));
    }

    #[tokio::test]
    async fn test_then_and_catch_chain() {
        let doubled = JsPromise::resolved(21).then(|v| Ok(JsValue::from(v.to_number() * 2.0)));
        assert_eq!(doubled.settled().await, Ok(JsValue::from(42)));

        let recovered = JsPromise::rejected("nope").catch(|reason| {
            Ok(JsValue::from(format!("recovered from {}", reason.to_js_string())))
        });
        assert_eq!(
            recovered.settled().await,
            Ok(JsValue::from("recovered from nope"))
        );

        let skipped = JsPromise::rejected("still failing").then(|_| Ok(JsValue::Null));
        assert_eq!(skipped.settled().await, Err(JsValue::from("still failing")));
    }

    #[tokio::test]
    async fn test_finally_passes_outcome_through() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let promise = JsPromise::resolved("done").finally(move || {
            let _ = tx.send(());
        });
        assert_eq!(promise.settled().await, Ok(JsValue::from("done")));
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn test_value_surfaces_rejection() {
        let err = JsPromise::rejected("why").value().await.unwrap_err();
        assert_eq!(err.to_string(), "why");
    }

    #[tokio::test]
    async fn test_script_then_adopts_returned_promise() {
        let promise = JsPromise::resolved(2);
        let handler = NativeFunction::new("next", |args| {
            Ok(JsPromise::resolved(args[0].to_number() + 1.0).into())
        });
        let chained = promise.call_method("then", &[handler.into()]).unwrap();
        let chained = chained.as_promise().unwrap();
        assert_eq!(chained.settled().await, Ok(JsValue::from(3)));
    }

    #[tokio::test]
    async fn test_script_catch_and_finally() {
        let recover = NativeFunction::new("recover", |args| {
            Ok(JsValue::from(format!("caught {}", args[0].to_js_string())))
        });
        let caught = JsPromise::rejected("x")
            .call_method("catch", &[recover.into()])
            .unwrap();
        assert_eq!(
            caught.as_promise().unwrap().settled().await,
            Ok(JsValue::from("caught x"))
        );

        let failing =
            NativeFunction::new("cleanup", |_| Err(ScriptError::Type("cleanup failed".into())));
        let finished = JsPromise::resolved(1)
            .call_method("finally", &[failing.into()])
            .unwrap();
        let reason = finished.as_promise().unwrap().settled().await.unwrap_err();
        assert_eq!(reason.get("message"), JsValue::from("cleanup failed"));
        assert!(JsPromise::resolved(1).call_method("await", &[]).is_err());
    }
}
