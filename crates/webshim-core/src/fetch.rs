//! Fetch task state machine and the script `fetch` function.
//!
//! A [`FetchTask`] owns one network exchange. It is the delegate of the
//! transport task it creates, so every callback (head, chunk, completion)
//! lands here and is translated into promise settlement and body stream
//! updates. All mutable state sits behind a single lock; transport calls
//! that may call back synchronously are made after the lock is released.
//!
//! ```text
//! Idle ── perform ──▶ Running ── head ──▶ Resolved
//!   │                    │ ├── error ──▶ Rejected
//!   └ cancel; perform ─▶ Cancelled ◀── cancel
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, trace, warn};
use url::Url;
use webshim_config::FetchConfig;

use crate::error::ScriptError;
use crate::file::FileInstaller;
use crate::http::{
    HttpTransport, NativeRequest, NativeResponse, ReqwestTransport, TaskDelegate, TransportError,
    TransportTask,
};
use crate::install::{ClassDef, HostClass, Installable, Namespace, no_such_method};
use crate::lock;
use crate::promise::{Continuation, JsPromise};
use crate::request::{Request, RequestInstaller};
use crate::response::{Response, ResponseInstaller};
use crate::stream::{BufferingPolicy, ResponseBodyStream};
use crate::value::{JsValue, NativeFunction, arg};

const NO_RESPONSE: &str = "Server closed the connection before sending a response.";
const NON_HTTP_RESPONSE: &str = "Server responded with a non-HTTP response.";

/// Parse `raw` and require an `http` or `https` scheme.
pub fn validate_url(raw: &str) -> Result<Url, ScriptError> {
    let url = Url::parse(raw)
        .map_err(|_| ScriptError::Type(format!("Failed to parse URL from {raw}.")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ScriptError::Type(format!(
            "Cannot load from {raw}. URL scheme \"{scheme}\" is not supported."
        ))),
    }
}

/// Lifecycle of a [`FetchTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    /// Created, not yet performed. A cancel in this phase only records the
    /// reason; the next `perform` rejects with it.
    Idle,
    /// The transport task is running and no response head has arrived.
    Running,
    /// The promise resolved with a Response. The body may still be streaming.
    Resolved,
    /// The exchange failed before a response head arrived.
    Rejected,
    /// Cancelled before a response head arrived.
    Cancelled,
}

impl TaskPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

// ── Task ────────────────────────────────────────────────────────────────

/// One fetch exchange, driven by transport callbacks.
pub struct FetchTask {
    request: NativeRequest,
    transport: Arc<dyn HttpTransport>,
    policy: BufferingPolicy,
    state: Mutex<TaskState>,
    completion: watch::Sender<bool>,
}

struct TaskState {
    phase: TaskPhase,
    handle: Option<Arc<dyn TransportTask>>,
    continuation: Option<Continuation>,
    body: Option<ResponseBodyStream>,
    cancel_reason: Option<JsValue>,
    did_redirect: bool,
}

impl FetchTask {
    pub fn new(
        request: NativeRequest,
        transport: Arc<dyn HttpTransport>,
        policy: BufferingPolicy,
    ) -> Arc<Self> {
        let (completion, _) = watch::channel(false);
        Arc::new(Self {
            request,
            transport,
            policy,
            state: Mutex::new(TaskState {
                phase: TaskPhase::Idle,
                handle: None,
                continuation: None,
                body: None,
                cancel_reason: None,
                did_redirect: false,
            }),
            completion,
        })
    }

    /// Build a task from a script options object
    /// `{ url, method, headers, body }`.
    ///
    /// `headers` may be a `Headers` object or a plain record; `body` is
    /// sent only when it is a non-empty byte array.
    pub fn from_init(
        init: &JsValue,
        transport: Arc<dyn HttpTransport>,
        policy: BufferingPolicy,
    ) -> Result<Arc<Self>, ScriptError> {
        if !init.is_object() {
            return Err(ScriptError::construct(
                "FetchTask",
                "parameter 1 is not of type 'Object'.",
            ));
        }
        let url = validate_url(&init.get("url").to_js_string())?;
        let method = match init.get("method") {
            JsValue::Undefined => "GET".to_string(),
            value => value.to_js_string(),
        };
        let mut request = NativeRequest::new(method, url);

        let headers = init.get("headers");
        if let Some(headers) = headers.as_headers() {
            request.headers = headers.entries();
        } else if let Some(record) = headers.as_object() {
            request.headers = record
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_js_string()))
                .collect();
        }
        request.body = init.get("body").as_bytes().filter(|b| !b.is_empty()).cloned();

        Ok(Self::new(request, transport, policy))
    }

    pub fn request(&self) -> &NativeRequest {
        &self.request
    }

    pub fn phase(&self) -> TaskPhase {
        lock(&self.state).phase
    }

    /// Whether the transport reported completion, or a cancelled task was
    /// performed.
    pub fn is_complete(&self) -> bool {
        *self.completion.borrow()
    }

    /// Wait until the exchange is over, body included.
    pub async fn completed(&self) {
        let mut rx = self.completion.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Start the exchange. The promise resolves with a `Response` once the
    /// response head arrives, or rejects on failure or cancellation.
    ///
    /// A task can be performed once. When it was cancelled before this call
    /// it rejects with the cancellation reason and no transport task is
    /// created.
    pub fn perform(self: &Arc<Self>) -> JsPromise {
        JsPromise::new(|continuation| {
            let handle = {
                let mut state = lock(&self.state);
                if state.phase != TaskPhase::Idle {
                    drop(state);
                    continuation.reject(ScriptError::execute(
                        "FetchTask",
                        "perform",
                        "The task has already been performed.",
                    ));
                    return;
                }
                if let Some(reason) = state.cancel_reason.clone() {
                    state.phase = TaskPhase::Cancelled;
                    drop(state);
                    debug!(url = %self.request.url, "fetch task cancelled before it started");
                    continuation.reject(reason);
                    self.completion.send_replace(true);
                    return;
                }
                state.phase = TaskPhase::Running;
                state.continuation = Some(continuation);
                let delegate: Arc<dyn TaskDelegate> = Arc::clone(self) as Arc<dyn TaskDelegate>;
                let handle = self.transport.create_task(self.request.clone(), delegate);
                state.handle = Some(Arc::clone(&handle));
                handle
            };
            debug!(method = %self.request.method, url = %self.request.url, "fetch task started");
            handle.resume();
        })
    }

    /// Cancel the exchange with `reason`. The first reason wins; cancelling
    /// a completed task does nothing.
    pub fn cancel(&self, reason: JsValue) {
        let handle = {
            let mut state = lock(&self.state);
            if self.is_complete() {
                trace!(url = %self.request.url, "cancel after completion ignored");
                return;
            }
            if state.cancel_reason.is_none() {
                state.cancel_reason = Some(reason);
            }
            state.handle.clone()
        };
        if let Some(handle) = handle {
            debug!(url = %self.request.url, "fetch task cancelling");
            handle.cancel();
        }
    }
}

impl TaskDelegate for FetchTask {
    fn on_redirect(&self, location: &Url) {
        debug!(url = %self.request.url, location = %location, "fetch redirected");
        lock(&self.state).did_redirect = true;
    }

    fn on_response(&self, response: NativeResponse) {
        let mut state = lock(&self.state);
        let Some(continuation) = state.continuation.take() else {
            warn!(url = %self.request.url, "response head after settlement ignored");
            return;
        };
        match response {
            NativeResponse::NonHttp { url } => {
                debug!(url = %url, "non-HTTP response");
                state.phase = TaskPhase::Rejected;
                let handle = state.handle.clone();
                drop(state);
                continuation.reject(ScriptError::Protocol(NON_HTTP_RESPONSE.into()));
                if let Some(handle) = handle {
                    handle.cancel();
                }
            }
            NativeResponse::Http(head) => {
                debug!(url = %self.request.url, status = head.status, "response head received");
                let stream = ResponseBodyStream::new(head.content_length, self.policy);
                let response = Response::from_native(&head, stream.clone(), state.did_redirect);
                state.body = Some(stream);
                state.phase = TaskPhase::Resolved;
                drop(state);
                continuation.resolve(response);
            }
        }
    }

    fn on_data(&self, chunk: Bytes) {
        let state = lock(&self.state);
        match &state.body {
            Some(body) => {
                body.push(chunk);
            }
            None => trace!(len = chunk.len(), "chunk without a body stream dropped"),
        }
    }

    fn on_complete(&self, error: Option<TransportError>) {
        let (continuation, body, reason) = {
            let mut state = lock(&self.state);
            state.handle = None;
            let continuation = state.continuation.take();
            if continuation.is_some() {
                state.phase = match error {
                    Some(TransportError::Cancelled) => TaskPhase::Cancelled,
                    _ => TaskPhase::Rejected,
                };
            }
            (continuation, state.body.take(), state.cancel_reason.clone())
        };

        match error {
            None => {
                debug!(url = %self.request.url, "fetch task completed");
                if let Some(continuation) = continuation {
                    continuation.reject(ScriptError::Protocol(NO_RESPONSE.into()));
                }
                if let Some(body) = body {
                    body.finish();
                }
            }
            Some(TransportError::Cancelled) => {
                debug!(url = %self.request.url, "fetch task cancelled");
                let reason = reason.unwrap_or_else(|| ScriptError::abort_error().to_value());
                if let Some(continuation) = continuation {
                    continuation.reject(reason.clone());
                }
                if let Some(body) = body {
                    body.fail(ScriptError::Thrown(reason));
                }
            }
            Some(TransportError::Failed(message)) => {
                debug!(url = %self.request.url, error = %message, "fetch task failed");
                let error = ScriptError::Network(message);
                if let Some(continuation) = continuation {
                    continuation.reject(error.clone());
                }
                if let Some(body) = body {
                    body.fail(error);
                }
            }
        }
        self.completion.send_replace(true);
    }
}

impl fmt::Debug for FetchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchTask")
            .field("method", &self.request.method)
            .field("url", &self.request.url.as_str())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl HostClass for Arc<FetchTask> {
    fn class_name(&self) -> &'static str {
        "FetchTask"
    }

    fn get_property(&self, name: &str) -> Option<JsValue> {
        match name {
            "url" => Some(self.request.url.as_str().into()),
            "method" => Some(self.request.method.clone().into()),
            "phase" => Some(self.phase().as_str().into()),
            _ => None,
        }
    }

    fn call_method(&self, name: &str, args: &[JsValue]) -> Result<JsValue, ScriptError> {
        match name {
            "perform" => Ok(self.perform().into()),
            "cancel" => {
                self.cancel(arg(args, 0).clone());
                Ok(JsValue::Undefined)
            }
            _ => Err(no_such_method(self.class_name(), name)),
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────────

/// Runs `fetch` calls over a shared transport.
#[derive(Clone)]
pub struct FetchClient {
    transport: Arc<dyn HttpTransport>,
    policy: BufferingPolicy,
}

impl FetchClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            policy: BufferingPolicy::default(),
        }
    }

    pub fn with_buffering(mut self, policy: BufferingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// A client over [`ReqwestTransport`] honouring the `[fetch]` settings.
    pub fn from_config(config: &FetchConfig) -> Result<Self, ScriptError> {
        let transport = ReqwestTransport::from_config(config)
            .map_err(|e| ScriptError::Network(e.to_string()))?;
        Ok(Self::new(Arc::new(transport)).with_buffering(config.body_buffering.into()))
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    pub fn policy(&self) -> BufferingPolicy {
        self.policy
    }

    /// Create an idle task for `request`.
    pub fn task(&self, request: NativeRequest) -> Arc<FetchTask> {
        FetchTask::new(request, Arc::clone(&self.transport), self.policy)
    }

    /// Script `fetch(input, init)`.
    ///
    /// A `Request` input without `init` is used as-is, and a plain
    /// `{ url, ...options }` object doubles as its own init. Anything else
    /// goes through the `Request` constructor. Construction errors reject.
    pub fn fetch(&self, input: &JsValue, init: &JsValue) -> JsPromise {
        let request_like = input
            .as_object()
            .is_some_and(|object| object.contains_key("url"));
        let request = match input.as_request() {
            Some(request) if init.is_undefined() => Ok(request),
            None if request_like && init.is_undefined() => {
                Request::construct(&[input.get("url"), input.clone()])
            }
            _ => Request::construct(&[input.clone(), init.clone()]),
        };
        let request = match request {
            Ok(request) => request,
            Err(err) => return JsPromise::rejected(err),
        };
        let client = self.clone();
        JsPromise::spawn(async move { client.fetch_request(request).await.map(JsValue::from) })
    }

    /// Perform `request` and wait for the response head.
    ///
    /// The request's abort signal cancels the task until the exchange is
    /// over, so an abort during body streaming fails the body read.
    pub async fn fetch_request(&self, request: Request) -> Result<Response, ScriptError> {
        let signal = request.signal();
        if let Some(signal) = &signal {
            signal.throw_if_aborted()?;
        }

        let url = validate_url(request.url())?;
        let body = request.bytes().await?;
        let mut native = NativeRequest::new(request.method(), url);
        native.headers = request.headers().entries();
        if !body.is_empty() {
            native.body = Some(body);
        }

        let task = self.task(native);
        let listener = match signal {
            Some(signal) => {
                signal.throw_if_aborted()?;
                let listener = abort_listener(&task);
                signal.add_listener(listener.clone());
                Some((signal, listener))
            }
            None => None,
        };

        let outcome = task.perform().value().await;

        if let Some((signal, listener)) = listener {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) if outcome.is_ok() && !task.is_complete() => {
                    let task = Arc::clone(&task);
                    handle.spawn(async move {
                        task.completed().await;
                        signal.remove_listener(&listener);
                    });
                }
                _ => signal.remove_listener(&listener),
            }
        }

        outcome?
            .as_response()
            .ok_or_else(|| ScriptError::Protocol("fetch settled without a Response".into()))
    }
}

impl fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// An `abort` listener that cancels `task` with the signal's reason.
fn abort_listener(task: &Arc<FetchTask>) -> NativeFunction {
    let task = Arc::clone(task);
    NativeFunction::new("abortFetch", move |args| {
        let reason = arg(args, 0).get("target").get("reason");
        let reason = if reason.is_nullish() {
            ScriptError::abort_error().to_value()
        } else {
            reason
        };
        task.cancel(reason);
        Ok(JsValue::Undefined)
    })
}

/// Installs `fetch`, `FetchTask`, `Request`, `Response` and their
/// dependencies.
#[derive(Debug, Clone)]
pub struct FetchInstaller {
    client: FetchClient,
}

impl FetchInstaller {
    pub fn new(client: FetchClient) -> Self {
        Self { client }
    }
}

impl Installable for FetchInstaller {
    fn install(&self, namespace: &mut Namespace) {
        namespace
            .install(&FileInstaller)
            .install(&RequestInstaller)
            .install(&ResponseInstaller);

        let client = self.client.clone();
        namespace.define_function("fetch", move |args| {
            Ok(client.fetch(arg(args, 0), arg(args, 1)).into())
        });

        let client = self.client.clone();
        namespace.define_class(ClassDef::new("FetchTask", move |args| {
            FetchTask::from_init(arg(args, 0), Arc::clone(client.transport()), client.policy())
                .map(JsValue::from)
        }));
    }
}
