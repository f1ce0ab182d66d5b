//! Integration tests for `fetch` and `FetchTask` over a scripted transport.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use url::Url;
use webshim_core::console::ConsoleInstaller;
use webshim_core::http::NativeRequest;
use webshim_core::install::standard_namespace;
use webshim_core::value::JsObject;
use webshim_core::{
    AbortController, BufferingPolicy, FetchClient, HostClass, JsValue, Request, RequestInit,
    Response, ScriptError, TaskPhase,
};
use webshim_test_utils::{MockResponse, MockTransport, init_test_tracing};

fn client(transport: &MockTransport) -> FetchClient {
    FetchClient::new(Arc::new(transport.clone()))
}

async fn fetch_url(client: &FetchClient, url: &str) -> Result<Response, ScriptError> {
    let value = client.fetch(&url.into(), &JsValue::Undefined).value().await?;
    Ok(value.as_response().expect("fetch resolved with a Response"))
}

fn message(err: &ScriptError) -> String {
    err.to_value().get("message").to_js_string()
}

// ── Success ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_streams_scripted_response() {
    init_test_tracing();
    let transport = MockTransport::with_response(
        MockResponse::ok()
            .header("a", "b")
            .header("content-type", "text/plain")
            .chunk("he")
            .chunk("llo"),
    );
    let response = fetch_url(&client(&transport), "https://example.com/").await.unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.ok());
    assert_eq!(response.status_text(), "ok");
    assert_eq!(response.headers().get("a").as_deref(), Some("b"));
    assert_eq!(response.text().await.unwrap(), "hello");
    assert!(response.body_used());

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].url.as_str(), "https://example.com/");
    assert_eq!(requests[0].body, None);
}

#[tokio::test]
async fn test_fetch_sends_method_headers_and_body() {
    let transport = MockTransport::new();
    let init = RequestInit::new()
        .method("post")
        .headers(JsValue::Object(JsObject::new().with("X-Key", "v")))
        .body("payload");
    let request = Request::new("https://example.com/submit", init).unwrap();

    let response = client(&transport).fetch_request(request.clone()).await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(request.body_used());

    let sent = &transport.requests()[0];
    assert_eq!(sent.method, "POST");
    assert_eq!(sent.body.as_deref(), Some(&b"payload"[..]));
    assert!(sent.headers.contains(&("x-key".to_string(), "v".to_string())));
    assert!(sent.headers.contains(&(
        "content-type".to_string(),
        "text/plain; charset=UTF-8".to_string()
    )));
}

#[tokio::test]
async fn test_fetch_reports_redirect_and_final_url() {
    let transport = MockTransport::with_response(
        MockResponse::ok()
            .redirected_to("https://example.com/final")
            .url("https://example.com/final"),
    );
    let response = fetch_url(&client(&transport), "https://example.com/start").await.unwrap();
    assert!(response.redirected());
    assert_eq!(response.url(), "https://example.com/final");
}

#[tokio::test]
async fn test_fetch_error_status_still_resolves() {
    let transport = MockTransport::with_response(MockResponse::status(404).chunk("missing"));
    let response = fetch_url(&client(&transport), "https://example.com/nope").await.unwrap();
    assert_eq!(response.status(), 404);
    assert!(!response.ok());
    assert_eq!(response.status_text(), "not found");
    assert_eq!(response.text().await.unwrap(), "missing");
}

// ── Failures ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unsupported_scheme_never_reaches_transport() {
    let transport = MockTransport::new();
    let err = fetch_url(&client(&transport), "ftp://example.com/file")
        .await
        .unwrap_err();
    assert!(err.is_type_error());
    assert_eq!(
        message(&err),
        "Cannot load from ftp://example.com/file. URL scheme \"ftp\" is not supported."
    );
    assert_eq!(transport.created_count(), 0);
}

#[tokio::test]
async fn test_unparsable_url_rejects() {
    let transport = MockTransport::new();
    let err = fetch_url(&client(&transport), "::nope").await.unwrap_err();
    assert_eq!(message(&err), "Failed to parse URL from ::nope.");
    assert_eq!(transport.created_count(), 0);
}

#[tokio::test]
async fn test_non_http_response_rejects() {
    let transport = MockTransport::with_response(MockResponse::non_http("file:///tmp/x"));
    let err = fetch_url(&client(&transport), "https://example.com/").await.unwrap_err();
    assert_eq!(message(&err), "Server responded with a non-HTTP response.");
}

#[tokio::test]
async fn test_completion_without_head_rejects() {
    let transport = MockTransport::with_response(MockResponse::no_response());
    let err = fetch_url(&client(&transport), "https://example.com/").await.unwrap_err();
    assert_eq!(
        message(&err),
        "Server closed the connection before sending a response."
    );
}

#[tokio::test]
async fn test_network_error_rejects_with_message() {
    let transport =
        MockTransport::with_response(MockResponse::network_error("connection refused"));
    let err = fetch_url(&client(&transport), "https://example.com/").await.unwrap_err();
    assert_eq!(message(&err), "connection refused");
}

#[tokio::test]
async fn test_failure_mid_body_fails_the_read() {
    let transport = MockTransport::with_response(
        MockResponse::ok().chunk("partial").fail_with("connection reset"),
    );
    let response = fetch_url(&client(&transport), "https://example.com/").await.unwrap();
    let err = response.text().await.unwrap_err();
    assert_eq!(err.to_string(), "connection reset");
}

// ── Cancellation ────────────────────────────────────────────────────────

#[test_log::test(tokio::test)]
async fn test_cancel_before_perform_rejects_with_reason() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let url = Url::parse("https://example.com/").unwrap();
    let task = client.task(NativeRequest::new("GET", url));

    task.cancel("changed my mind".into());
    let settled = task.perform().settled().await;
    assert_eq!(settled, Err(JsValue::from("changed my mind")));
    assert_eq!(task.phase(), TaskPhase::Cancelled);
    assert_eq!(transport.created_count(), 0);
    assert_eq!(transport.resumed_count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_already_aborted_signal_rejects_without_transport() {
    let transport = MockTransport::new();
    let controller = AbortController::new();
    controller.abort(None);

    let request = Request::new(
        "https://example.com/",
        RequestInit::new().signal(controller.signal()),
    )
    .unwrap();
    let err = client(&transport).fetch_request(request).await.unwrap_err();
    assert_eq!(err.name(), "AbortError");
    assert_eq!(transport.created_count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_abort_before_head_rejects_with_reason() {
    let transport =
        MockTransport::with_response(MockResponse::no_response().pause_before_chunk(0));
    let controller = AbortController::new();
    let request = Request::new(
        "https://example.com/",
        RequestInit::new().signal(controller.signal()),
    )
    .unwrap();

    let promise = client(&transport).fetch(&request.into(), &JsValue::Undefined);
    transport.wait_until_paused().await;
    controller.abort(Some("too slow".into()));

    assert_eq!(promise.settled().await, Err(JsValue::from("too slow")));
}

#[test_log::test(tokio::test)]
async fn test_abort_mid_body_fails_the_read_with_reason() {
    let transport = MockTransport::with_response(
        MockResponse::ok().chunk("he").chunk("llo").pause_before_chunk(1),
    );
    let controller = AbortController::new();
    let signal = controller.signal();
    let request = Request::new("https://example.com/", RequestInit::new().signal(signal.clone()))
        .unwrap();

    let response = client(&transport).fetch_request(request).await.unwrap();
    assert_eq!(signal.listener_count(), 1);

    transport.wait_until_paused().await;
    controller.abort(Some("stop".into()));

    match response.text().await {
        Err(ScriptError::Thrown(reason)) => assert_eq!(reason, JsValue::from("stop")),
        other => panic!("expected the abort reason, got {other:?}"),
    }
}

#[test_log::test(tokio::test)]
async fn test_listener_removed_after_body_completes() {
    let transport = MockTransport::with_response(MockResponse::ok().chunk("done"));
    let controller = AbortController::new();
    let signal = controller.signal();
    let request = Request::new("https://example.com/", RequestInit::new().signal(signal.clone()))
        .unwrap();

    let response = client(&transport).fetch_request(request).await.unwrap();
    assert_eq!(response.text().await.unwrap(), "done");

    for _ in 0..50 {
        if signal.listener_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(signal.listener_count(), 0);

    // Aborting afterwards has no effect on the finished exchange.
    controller.abort(None);
    assert_eq!(transport.created_count(), 1);
}

// ── Buffering ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_latest_chunk_policy_reads_newest_chunk() {
    let transport = MockTransport::with_response(
        MockResponse::ok().chunk("first").pause_before_chunk(1).chunk("second"),
    );
    let client = client(&transport).with_buffering(BufferingPolicy::LatestChunk);
    let response = fetch_url(&client, "https://example.com/").await.unwrap();

    transport.wait_until_paused().await;
    let blob = response.body().expect("streamed body");
    assert_eq!(blob.read().await.unwrap(), Bytes::from_static(b"first"));
    transport.release();
}

// ── Script surface ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_script_fetch_task_class() {
    let transport = MockTransport::with_response(MockResponse::ok().chunk("raw"));
    let namespace = standard_namespace(client(&transport), ConsoleInstaller::default());

    let init = JsValue::Object(
        JsObject::new()
            .with("url", "https://example.com/raw")
            .with("method", "PUT")
            .with("body", JsValue::Bytes(Bytes::from_static(b"up"))),
    );
    let task = namespace.construct("FetchTask", &[init]).unwrap();
    let promise = task
        .as_native()
        .unwrap()
        .call_method("perform", &[])
        .unwrap()
        .as_promise()
        .unwrap();

    let response = promise.value().await.unwrap().as_response().unwrap();
    assert_eq!(response.text().await.unwrap(), "raw");
    assert_eq!(task.get("phase"), JsValue::from("resolved"));

    let sent = &transport.requests()[0];
    assert_eq!(sent.method, "PUT");
    assert_eq!(sent.body.as_deref(), Some(&b"up"[..]));
}

#[tokio::test]
async fn test_script_fetch_with_init_object() {
    let transport = MockTransport::new();
    let namespace = standard_namespace(client(&transport), ConsoleInstaller::default());

    let init = JsValue::Object(JsObject::new().with("method", "DELETE"));
    let promise = namespace
        .call("fetch", &["https://example.com/item/1".into(), init])
        .unwrap()
        .as_promise()
        .unwrap();
    promise.value().await.unwrap();
    assert_eq!(transport.requests()[0].method, "DELETE");
}
