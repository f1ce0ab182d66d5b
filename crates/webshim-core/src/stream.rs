//! Streaming response bodies.
//!
//! A [`ResponseBodyStream`] is filled by a fetch task as chunks arrive and
//! read through the Blob interface. How chunks are retained until a reader
//! consumes them is governed by a [`BufferingPolicy`].

use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use tokio::sync::watch;
use tracing::{debug, trace};
use webshim_config::BodyBuffering;

use crate::BoxFuture;
use crate::error::ScriptError;
use crate::lock;
use crate::storage::{ByteRangeStorage, clamp_range};

/// Chunk retention policy for a streamed body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BufferingPolicy {
    /// Keep every chunk. A read waits for the end of the body and resolves
    /// with the requested window of the complete body.
    #[default]
    Accumulate,
    /// Keep only the newest unread chunk. A read resolves with that chunk,
    /// or waits for the next one. Earlier unread chunks are dropped.
    LatestChunk,
}

impl From<BodyBuffering> for BufferingPolicy {
    fn from(value: BodyBuffering) -> Self {
        match value {
            BodyBuffering::Accumulate => Self::Accumulate,
            BodyBuffering::LatestChunk => Self::LatestChunk,
        }
    }
}

/// Storage fed incrementally by a fetch task. Clones share the stream.
#[derive(Debug, Clone)]
pub struct ResponseBodyStream {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    declared_len: Option<u64>,
    policy: BufferingPolicy,
    state: Mutex<StreamState>,
    version: watch::Sender<u64>,
}

#[derive(Debug, Default)]
struct StreamState {
    chunks: Vec<Bytes>,
    pending: Option<Bytes>,
    received: u64,
    outcome: Option<Result<(), ScriptError>>,
}

impl ResponseBodyStream {
    pub fn new(declared_len: Option<u64>, policy: BufferingPolicy) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                declared_len,
                policy,
                state: Mutex::new(StreamState::default()),
                version,
            }),
        }
    }

    /// Content length announced by the response head, if any.
    pub fn declared_len(&self) -> Option<u64> {
        self.shared.declared_len
    }

    pub fn policy(&self) -> BufferingPolicy {
        self.shared.policy
    }

    /// Bytes pushed so far.
    pub fn received_len(&self) -> u64 {
        lock(&self.shared.state).received
    }

    pub fn is_finished(&self) -> bool {
        lock(&self.shared.state).outcome.is_some()
    }

    /// Append a chunk. Ignored once the stream has finished or failed.
    pub fn push(&self, chunk: Bytes) -> bool {
        let accepted = {
            let mut state = lock(&self.shared.state);
            if state.outcome.is_some() {
                false
            } else {
                state.received += chunk.len() as u64;
                match self.shared.policy {
                    BufferingPolicy::Accumulate => state.chunks.push(chunk),
                    BufferingPolicy::LatestChunk => {
                        if state.pending.replace(chunk).is_some() {
                            trace!("unread chunk replaced by a newer one");
                        }
                    }
                }
                true
            }
        };
        if accepted {
            self.bump();
        } else {
            debug!("chunk arrived after the body stream ended; ignored");
        }
        accepted
    }

    /// Mark the body complete.
    pub fn finish(&self) -> bool {
        self.terminate(Ok(()))
    }

    /// Mark the body failed. Unread data is discarded.
    pub fn fail(&self, error: ScriptError) -> bool {
        self.terminate(Err(error))
    }

    fn terminate(&self, outcome: Result<(), ScriptError>) -> bool {
        {
            let mut state = lock(&self.shared.state);
            if state.outcome.is_some() {
                return false;
            }
            if outcome.is_err() {
                state.chunks.clear();
                state.pending = None;
            }
            debug!(received = state.received, failed = outcome.is_err(), "body stream ended");
            state.outcome = Some(outcome);
        }
        self.bump();
        true
    }

    fn bump(&self) {
        self.shared.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    async fn next_read(&self, start: u64, end: u64) -> Result<Bytes, ScriptError> {
        let mut changes = self.shared.version.subscribe();
        loop {
            if let Some(result) = self.try_read(start, end) {
                return result;
            }
            if changes.changed().await.is_err() {
                return Err(ScriptError::Network("response body stream closed".into()));
            }
        }
    }

    fn try_read(&self, start: u64, end: u64) -> Option<Result<Bytes, ScriptError>> {
        let mut state = lock(&self.shared.state);
        match self.shared.policy {
            BufferingPolicy::Accumulate => match &state.outcome {
                None => None,
                Some(Err(err)) => Some(Err(err.clone())),
                Some(Ok(())) => Some(Ok(window(&state.chunks, start, end))),
            },
            BufferingPolicy::LatestChunk => {
                if let Some(chunk) = state.pending.take() {
                    return Some(Ok(window(std::slice::from_ref(&chunk), start, end)));
                }
                match &state.outcome {
                    None => None,
                    Some(Ok(())) => Some(Ok(Bytes::new())),
                    Some(Err(err)) => Some(Err(err.clone())),
                }
            }
        }
    }
}

fn window(chunks: &[Bytes], start: u64, end: u64) -> Bytes {
    let total: u64 = chunks.iter().map(|c| c.len() as u64).sum();
    let (start, end) = clamp_range(start, end, total);
    if let [single] = chunks {
        return single.slice(start as usize..end as usize);
    }
    let mut joined = BytesMut::with_capacity(total as usize);
    for chunk in chunks {
        joined.extend_from_slice(chunk);
    }
    joined.freeze().slice(start as usize..end as usize)
}

impl ByteRangeStorage for ResponseBodyStream {
    fn size(&self) -> u64 {
        self.shared.declared_len.unwrap_or(0)
    }

    fn is_streaming(&self) -> bool {
        true
    }

    fn read_range(&self, start: u64, end: u64) -> BoxFuture<'_, Result<Bytes, ScriptError>> {
        Box::pin(self.next_read(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn test_accumulate_waits_for_completion() {
        let stream = ResponseBodyStream::new(Some(5), BufferingPolicy::Accumulate);
        let reader = stream.clone();
        let read = tokio::spawn(async move { reader.read_range(0, u64::MAX).await });

        stream.push(Bytes::from_static(b"he"));
        tokio::task::yield_now().await;
        assert!(!read.is_finished());
        stream.push(Bytes::from_static(b"llo"));
        stream.finish();

        assert_eq!(read.await.unwrap().unwrap(), "hello");
        assert_eq!(stream.received_len(), 5);
    }

    #[tokio::test]
    async fn test_accumulate_windowed_read() {
        let stream = ResponseBodyStream::new(None, BufferingPolicy::Accumulate);
        stream.push(Bytes::from_static(b"abc"));
        stream.push(Bytes::from_static(b"def"));
        stream.finish();
        assert_eq!(stream.read_range(2, 4).await.unwrap(), "cd");
        assert_eq!(stream.size(), 0);
        assert!(stream.is_streaming());
    }

    #[tokio::test]
    async fn test_latest_chunk_delivers_newest() {
        let stream = ResponseBodyStream::new(None, BufferingPolicy::LatestChunk);
        stream.push(Bytes::from_static(b"one"));
        stream.push(Bytes::from_static(b"two"));
        assert_eq!(stream.read_range(0, u64::MAX).await.unwrap(), "two");

        let reader = stream.clone();
        let read = tokio::spawn(async move { reader.read_range(0, u64::MAX).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        stream.push(Bytes::from_static(b"three"));
        assert_eq!(read.await.unwrap().unwrap(), "three");

        stream.finish();
        assert!(stream.read_range(0, u64::MAX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_terminal() {
        let stream = ResponseBodyStream::new(Some(10), BufferingPolicy::LatestChunk);
        stream.push(Bytes::from_static(b"partial"));
        assert!(stream.fail(ScriptError::Network("connection reset".into())));

        let err = stream.read_range(0, 10).await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
        assert!(!stream.push(Bytes::from_static(b"late")));
        assert!(!stream.finish());
        assert!(stream.is_finished());
    }

    #[tokio::test]
    async fn test_pending_read_observes_failure() {
        let stream = ResponseBodyStream::new(None, BufferingPolicy::Accumulate);
        let reader = stream.clone();
        let read = tokio::spawn(async move { reader.read_range(0, u64::MAX).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        stream.fail(ScriptError::Thrown("stopped".into()));
        let err = read.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "stopped");
    }

    #[test]
    fn test_policy_from_config() {
        assert_eq!(
            BufferingPolicy::from(BodyBuffering::LatestChunk),
            BufferingPolicy::LatestChunk
        );
        assert_eq!(BufferingPolicy::default(), BufferingPolicy::Accumulate);
    }
}
