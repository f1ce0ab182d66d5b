//! `reqwest`-backed [`HttpTransport`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use tokio::sync::Notify;
use tracing::{debug, trace};
use webshim_config::FetchConfig;

use super::{
    HttpTransport, NativeRequest, NativeResponse, ResponseHead, TaskDelegate, TransportError,
    TransportTask, mime_essence,
};
use crate::lock;

/// Production transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// A transport with the default `[fetch]` settings.
    pub fn new() -> Result<Self, TransportError> {
        Self::from_config(&FetchConfig::default())
    }

    /// A transport honouring the `[fetch]` settings.
    pub fn from_config(config: &FetchConfig) -> Result<Self, TransportError> {
        let redirect = match config.max_redirects {
            0 => Policy::none(),
            limit => Policy::limited(limit),
        };
        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(redirect);
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Failed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn create_task(
        &self,
        request: NativeRequest,
        delegate: Arc<dyn TaskDelegate>,
    ) -> Arc<dyn TransportTask> {
        Arc::new(ReqwestTask {
            client: self.client.clone(),
            shared: Arc::new(TaskShared {
                state: Mutex::new(RunState::Created(request)),
                delegate,
                cancel: Notify::new(),
            }),
        })
    }
}

// ── Task ────────────────────────────────────────────────────────────────

enum RunState {
    Created(NativeRequest),
    Running,
    Done,
}

struct TaskShared {
    state: Mutex<RunState>,
    delegate: Arc<dyn TaskDelegate>,
    cancel: Notify,
}

impl TaskShared {
    fn complete(&self, error: Option<TransportError>) {
        *lock(&self.state) = RunState::Done;
        self.delegate.on_complete(error);
    }
}

struct ReqwestTask {
    client: Client,
    shared: Arc<TaskShared>,
}

impl TransportTask for ReqwestTask {
    fn resume(&self) {
        let request = {
            let mut state = lock(&self.shared.state);
            match std::mem::replace(&mut *state, RunState::Running) {
                RunState::Created(request) => request,
                other => {
                    *state = other;
                    return;
                }
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(drive(self.client.clone(), request, Arc::clone(&self.shared)));
            }
            Err(e) => self.shared.complete(Some(TransportError::Failed(format!(
                "no async runtime available: {e}"
            )))),
        }
    }

    fn cancel(&self) {
        let never_started = {
            let mut state = lock(&self.shared.state);
            match *state {
                RunState::Created(_) => {
                    *state = RunState::Done;
                    true
                }
                RunState::Running => false,
                RunState::Done => return,
            }
        };
        if never_started {
            debug!("transport task cancelled before it started");
            self.shared
                .delegate
                .on_complete(Some(TransportError::Cancelled));
        } else {
            // A stored permit wakes the driver even if it is not yet waiting.
            self.shared.cancel.notify_one();
        }
    }
}

async fn drive(client: Client, request: NativeRequest, shared: Arc<TaskShared>) {
    let url = request.url.clone();
    debug!(method = %request.method, url = %url, "transport request started");
    let outcome = tokio::select! {
        _ = shared.cancel.notified() => Err(TransportError::Cancelled),
        result = exchange(&client, request, shared.delegate.as_ref()) => result,
    };
    debug!(url = %url, ok = outcome.is_ok(), "transport request finished");
    shared.complete(outcome.err());
}

async fn exchange(
    client: &Client,
    request: NativeRequest,
    delegate: &dyn TaskDelegate,
) -> Result<(), TransportError> {
    let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|e| TransportError::Failed(format!("invalid method {:?}: {e}", request.method)))?;
    let mut builder = client.request(method, request.url.clone());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let mut response = builder.send().await.map_err(failed)?;
    if response.url() != &request.url {
        delegate.on_redirect(response.url());
    }
    delegate.on_response(NativeResponse::Http(head_of(&response)));

    while let Some(chunk) = response.chunk().await.map_err(failed)? {
        trace!(len = chunk.len(), "transport chunk");
        delegate.on_data(chunk);
    }
    Ok(())
}

fn head_of(response: &reqwest::Response) -> ResponseHead {
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(mime_essence);
    ResponseHead {
        status: response.status().as_u16(),
        headers,
        url: Some(response.url().clone()),
        content_length: response.content_length(),
        mime_type,
    }
}

fn failed(err: reqwest::Error) -> TransportError {
    TransportError::Failed(err.to_string())
}
