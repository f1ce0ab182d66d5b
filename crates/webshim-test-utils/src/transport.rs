//! Scripted HTTP transport.
//!
//! [`MockTransport`] plays a [`MockResponse`] script for every task it
//! creates: an optional redirect, the response head, each body chunk, then
//! completion. Scripts run on the tokio runtime after `resume`, so tests can
//! pause a body between chunks, cancel, and observe what the delegate saw.
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.push_response(MockResponse::ok().header("a", "b").chunk("he").chunk("llo"));
//! let client = FetchClient::new(Arc::new(transport.clone()));
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::Notify;
use url::Url;
use webshim_core::http::{
    HttpTransport, NativeRequest, NativeResponse, ResponseHead, TaskDelegate, TransportError,
    TransportTask,
};

/// What a scripted task reports to its delegate.
#[derive(Debug, Clone)]
pub struct MockResponse {
    redirect_to: Option<Url>,
    response: Option<NativeResponse>,
    chunks: Vec<Bytes>,
    failure: Option<String>,
    pause_before_chunk: Option<usize>,
}

impl MockResponse {
    /// `200` with no headers and an empty body.
    pub fn ok() -> Self {
        Self::status(200)
    }

    pub fn status(status: u16) -> Self {
        Self {
            redirect_to: None,
            response: Some(NativeResponse::Http(ResponseHead::new(status))),
            chunks: Vec::new(),
            failure: None,
            pause_before_chunk: None,
        }
    }

    /// A response that is not HTTP.
    pub fn non_http(url: &str) -> Self {
        Self {
            response: Some(NativeResponse::NonHttp {
                url: url.to_string(),
            }),
            ..Self::ok()
        }
    }

    /// Completes successfully without ever delivering a response head.
    pub fn no_response() -> Self {
        Self {
            response: None,
            ..Self::ok()
        }
    }

    /// Fails before a response head with `message`.
    pub fn network_error(message: &str) -> Self {
        Self::no_response().fail_with(message)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Some(NativeResponse::Http(head)) = self.response.take() {
            self.response = Some(NativeResponse::Http(head.with_header(name, value)));
        }
        self
    }

    /// Final URL reported with the head.
    pub fn url(mut self, url: &str) -> Self {
        let url = Url::parse(url).expect("invalid mock url");
        if let Some(NativeResponse::Http(head)) = self.response.take() {
            self.response = Some(NativeResponse::Http(head.with_url(url)));
        }
        self
    }

    /// Report a redirect to `location` before the head.
    pub fn redirected_to(mut self, location: &str) -> Self {
        self.redirect_to = Some(Url::parse(location).expect("invalid redirect url"));
        self
    }

    pub fn chunk(mut self, chunk: impl Into<Bytes>) -> Self {
        self.chunks.push(chunk.into());
        self
    }

    /// Complete with a transport failure after the scripted chunks.
    pub fn fail_with(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Stop before chunk `index` (or before completion when `index` equals
    /// the chunk count) until [`MockTransport::release`] or a cancel.
    pub fn pause_before_chunk(mut self, index: usize) -> Self {
        self.pause_before_chunk = Some(index);
        self
    }
}

/// An [`HttpTransport`] that plays scripted responses. Clones share state.
#[derive(Clone, Default)]
pub struct MockTransport {
    shared: Arc<TransportShared>,
}

#[derive(Default)]
struct TransportShared {
    scripts: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<NativeRequest>>,
    resumed: AtomicUsize,
    paused: Notify,
    release: Notify,
}

impl MockTransport {
    /// A transport answering `200` with an empty body until scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose next task plays `response`.
    pub fn with_response(response: MockResponse) -> Self {
        let transport = Self::new();
        transport.push_response(response);
        transport
    }

    /// Queue a script for the next created task.
    pub fn push_response(&self, response: MockResponse) {
        lock(&self.shared.scripts).push_back(response);
    }

    /// Requests passed to `create_task`, in order.
    pub fn requests(&self) -> Vec<NativeRequest> {
        lock(&self.shared.requests).clone()
    }

    pub fn created_count(&self) -> usize {
        lock(&self.shared.requests).len()
    }

    pub fn resumed_count(&self) -> usize {
        self.shared.resumed.load(Ordering::SeqCst)
    }

    /// Wait until a task reaches its pause point.
    pub async fn wait_until_paused(&self) {
        self.shared.paused.notified().await;
    }

    /// Let a paused task continue.
    pub fn release(&self) {
        self.shared.release.notify_one();
    }
}

impl HttpTransport for MockTransport {
    fn create_task(
        &self,
        request: NativeRequest,
        delegate: Arc<dyn TaskDelegate>,
    ) -> Arc<dyn TransportTask> {
        lock(&self.shared.requests).push(request);
        let script = lock(&self.shared.scripts)
            .pop_front()
            .unwrap_or_else(MockResponse::ok);
        Arc::new(MockTask {
            transport: Arc::clone(&self.shared),
            shared: Arc::new(TaskShared {
                state: Mutex::new(TaskState::Created(script)),
                delegate,
                cancelled: AtomicBool::new(false),
                cancel: Notify::new(),
            }),
        })
    }
}

// ── Task ────────────────────────────────────────────────────────────────

enum TaskState {
    Created(MockResponse),
    Running,
    Done,
}

struct TaskShared {
    state: Mutex<TaskState>,
    delegate: Arc<dyn TaskDelegate>,
    cancelled: AtomicBool,
    cancel: Notify,
}

impl TaskShared {
    fn finish(&self, error: Option<TransportError>) {
        {
            let mut state = lock(&self.state);
            if matches!(*state, TaskState::Done) {
                return;
            }
            *state = TaskState::Done;
        }
        self.delegate.on_complete(error);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct MockTask {
    transport: Arc<TransportShared>,
    shared: Arc<TaskShared>,
}

impl TransportTask for MockTask {
    fn resume(&self) {
        let script = {
            let mut state = lock(&self.shared.state);
            match std::mem::replace(&mut *state, TaskState::Running) {
                TaskState::Created(script) => script,
                other => {
                    *state = other;
                    return;
                }
            }
        };
        self.transport.resumed.fetch_add(1, Ordering::SeqCst);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(play(
                    script,
                    Arc::clone(&self.shared),
                    Arc::clone(&self.transport),
                ));
            }
            Err(_) => self
                .shared
                .finish(Some(TransportError::Failed("no runtime".into()))),
        }
    }

    fn cancel(&self) {
        let never_started = {
            let mut state = lock(&self.shared.state);
            match *state {
                TaskState::Created(_) => {
                    *state = TaskState::Done;
                    true
                }
                TaskState::Running => false,
                TaskState::Done => return,
            }
        };
        if never_started {
            self.shared
                .delegate
                .on_complete(Some(TransportError::Cancelled));
        } else {
            self.shared.cancelled.store(true, Ordering::SeqCst);
            self.shared.cancel.notify_one();
        }
    }
}

async fn play(script: MockResponse, task: Arc<TaskShared>, transport: Arc<TransportShared>) {
    let delegate = Arc::clone(&task.delegate);
    if let Some(location) = &script.redirect_to {
        delegate.on_redirect(location);
    }
    if let Some(response) = script.response {
        delegate.on_response(response);
    }

    let count = script.chunks.len();
    let mut chunks = script.chunks.into_iter();
    for index in 0..=count {
        if script.pause_before_chunk == Some(index) {
            transport.paused.notify_one();
            tokio::select! {
                _ = transport.release.notified() => {}
                _ = task.cancel.notified() => {}
            }
        }
        if task.is_cancelled() {
            task.finish(Some(TransportError::Cancelled));
            return;
        }
        let Some(chunk) = chunks.next() else { break };
        delegate.on_data(chunk);
        tokio::task::yield_now().await;
    }

    task.finish(script.failure.map(TransportError::Failed));
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
