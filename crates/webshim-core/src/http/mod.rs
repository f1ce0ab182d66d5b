//! Native HTTP transport seam.
//!
//! A [`FetchTask`](crate::fetch::FetchTask) never talks to the network
//! directly. It asks an [`HttpTransport`] for a [`TransportTask`] and then
//! receives the response head, body chunks, redirects and completion through
//! the [`TaskDelegate`] callbacks, which may arrive on any thread.
//!
//! Implementations:
//! - [`ReqwestTransport`]: the production transport over `reqwest`.
//! - `MockTransport` in `webshim-test-utils`: scripted responses for tests.

mod client;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use url::Url;

pub use client::ReqwestTransport;

/// A request ready for the network.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeRequest {
    pub method: String,
    pub url: Url,
    /// Header pairs in insertion order. Repeated names are sent repeatedly.
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl NativeRequest {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into(),
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Status line and headers of an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Final URL after redirects.
    pub url: Option<Url>,
    /// `Content-Length`, when the server declared one.
    pub content_length: Option<u64>,
    /// Essence of the `Content-Type` header (`text/html`), lowercased.
    pub mime_type: Option<String>,
}

impl ResponseHead {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            url: None,
            content_length: None,
            mime_type: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        if name.eq_ignore_ascii_case("content-type") {
            self.mime_type = mime_essence(&value);
        } else if name.eq_ignore_ascii_case("content-length") {
            self.content_length = value.trim().parse().ok();
        }
        self.headers.push((name, value));
        self
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }
}

/// The `type/subtype` part of a `Content-Type` value.
pub fn mime_essence(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim();
    if essence.is_empty() {
        None
    } else {
        Some(essence.to_ascii_lowercase())
    }
}

/// What a transport received in place of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeResponse {
    Http(ResponseHead),
    /// The peer answered with something that is not HTTP (a `file:` or
    /// `data:` loader, a raw socket).
    NonHttp { url: String },
}

/// Why a transport task ended without completing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The task was cancelled through [`TransportTask::cancel`].
    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

/// Receives the lifecycle of one transport task.
///
/// Order of calls: any number of `on_redirect`, then `on_response` at most
/// once, then `on_data` for each body chunk, then `on_complete` exactly once.
pub trait TaskDelegate: Send + Sync {
    fn on_redirect(&self, location: &Url);
    fn on_response(&self, response: NativeResponse);
    fn on_data(&self, chunk: Bytes);
    fn on_complete(&self, error: Option<TransportError>);
}

/// A created network task. Nothing is sent before [`resume`](Self::resume).
pub trait TransportTask: Send + Sync {
    fn resume(&self);

    /// Stop the task. The delegate then completes with
    /// [`TransportError::Cancelled`], also when the task was never resumed.
    fn cancel(&self);
}

/// Creates transport tasks.
///
/// Implementations must be `Send + Sync`: fetch tasks hold them behind an
/// `Arc<dyn HttpTransport>` and callbacks run on runtime worker threads.
pub trait HttpTransport: Send + Sync {
    fn create_task(
        &self,
        request: NativeRequest,
        delegate: Arc<dyn TaskDelegate>,
    ) -> Arc<dyn TransportTask>;
}

impl fmt::Debug for dyn HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HttpTransport")
    }
}

/// Status text for a response status.
///
/// A short override table wins; otherwise the lowercased canonical reason
/// phrase, otherwise a phrase for the status class.
pub fn status_text(status: u16) -> String {
    if let Some((_, text)) = STATUS_OVERRIDES.iter().find(|(code, _)| *code == status) {
        return (*text).to_string();
    }
    if let Some(reason) = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
    {
        return reason.to_lowercase();
    }
    match status {
        100..=199 => "informational",
        200..=299 => "success",
        300..=399 => "redirected",
        400..=499 => "client error",
        500..=599 => "server error",
        _ => "",
    }
    .to_string()
}

const STATUS_OVERRIDES: &[(u16, &str)] = &[(200, "ok")];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_text() {
        assert_eq!(status_text(200), "ok");
        assert_eq!(status_text(404), "not found");
        assert_eq!(status_text(503), "service unavailable");
        assert_eq!(status_text(299), "success");
        assert_eq!(status_text(599), "server error");
    }

    #[test]
    fn test_head_builder_tracks_content_headers() {
        let head = ResponseHead::new(200)
            .with_header("Content-Type", "Text/HTML; charset=utf-8")
            .with_header("Content-Length", "42")
            .with_header("x-extra", "1");
        assert_eq!(head.mime_type.as_deref(), Some("text/html"));
        assert_eq!(head.content_length, Some(42));
        assert_eq!(head.headers.len(), 3);
    }

    #[test]
    fn test_mime_essence() {
        assert_eq!(mime_essence("application/json").as_deref(), Some("application/json"));
        assert_eq!(mime_essence(" ; x=y"), None);
    }

    #[test]
    fn test_request_builder() {
        let url = Url::parse("https://example.com/a").unwrap();
        let request = NativeRequest::new("POST", url)
            .with_header("a", "b")
            .with_body(Bytes::from_static(b"x"));
        assert_eq!(request.headers, vec![("a".to_string(), "b".to_string())]);
        assert_eq!(request.body.as_deref(), Some(&b"x"[..]));
    }
}
