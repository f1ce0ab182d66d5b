#![deny(unsafe_code)]

//! Web platform shim for embedded script engines.
//!
//! Provides native implementations of the Blob/File, fetch, Request/Response,
//! Headers, FormData, AbortController, console and crypto surfaces that a
//! bare script engine lacks. Host code installs them into a [`Namespace`]
//! and drives asynchronous work on a tokio runtime; script code sees promises
//! settled through the [`promise`] bridge.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A boxed `Send` future, returned by object-safe async trait methods such as
/// [`ByteRangeStorage::read_range`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// AbortController, AbortSignal and DOMException.
pub mod abort;
/// Immutable byte windows over shared storage.
pub mod blob;
/// Body extraction and consumption shared by Request and Response.
pub mod body;
/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Script `console` forwarding.
pub mod console;
/// `crypto.randomUUID` and `crypto.getRandomValues`.
pub mod crypto;
/// Script-visible errors.
pub mod error;
/// Fetch task state machine and the `fetch` entry point.
pub mod fetch;
/// Named Blobs with a modification time.
pub mod file;
/// Multipart form entries.
pub mod form_data;
/// Case-insensitive header multimap.
pub mod headers;
/// Native HTTP transport seam.
pub mod http;
/// Namespace registration of host functions and classes.
pub mod install;
/// In-memory log capture.
pub mod logging;
/// Promise/continuation bridge.
pub mod promise;
/// `Request` and `RequestInit`.
pub mod request;
/// `Response`, `ResponseInit` and the native response bridge.
pub mod response;
/// Byte-range storage backends.
pub mod storage;
/// Streaming response body storage.
pub mod stream;
/// Script value model.
pub mod value;

pub use abort::{AbortController, AbortSignal};
pub use blob::Blob;
pub use error::ScriptError;
pub use fetch::{FetchClient, FetchTask, TaskPhase};
pub use file::File;
pub use form_data::{FormData, FormDataValue};
pub use headers::Headers;
pub use http::{HttpTransport, ReqwestTransport, TaskDelegate, TransportTask};
pub use install::{HostClass, Installable, Namespace};
pub use logging::{LogCollector, LogReader};
pub use promise::{Continuation, JsPromise, PromiseState};
pub use request::{Request, RequestInit};
pub use response::{Response, ResponseInit};
pub use storage::{ByteRangeStorage, FileStorage, MemoryStorage};
pub use stream::{BufferingPolicy, ResponseBodyStream};
pub use value::{JsObject, JsValue, NativeFunction, NativeObject};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
