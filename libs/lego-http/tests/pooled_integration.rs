//! End-to-end tests of the pooled transport against a local mock server.

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use lego_http::{
    AttemptRecord, HttpClient, HttpClientMetrics, HttpError, PooledConfig, RequestContext,
    TraceMiddleware,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Default)]
struct Codes(Mutex<Vec<String>>);

impl HttpClientMetrics for Codes {
    fn record(&self, attempt: &AttemptRecord<'_>) {
        self.0.lock().push(format!("{} {}", attempt.code, attempt.protocol));
    }
}

fn test_config() -> PooledConfig {
    PooledConfig {
        use_env_proxy: false,
        ..Default::default()
    }
}

fn client() -> HttpClient {
    HttpClient::builder().pooled(test_config()).build().unwrap()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Item {
    id: u64,
    name: String,
}

#[tokio::test]
async fn get_item_over_http11() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/item").query_param("id", "42");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"id":42,"name":"brick"}"#);
    });

    let codes = Arc::new(Codes::default());
    let client = HttpClient::builder()
        .pooled(test_config())
        .metrics(codes.clone())
        .build()
        .unwrap();

    let resp = client
        .get(server.url("/item"))
        .set_param("id", [42])
        .set_name("getItem")
        .to_json::<Item>()
        .await;

    assert_eq!(resp.status(), Some(http::StatusCode::OK));
    assert!(resp.is_http11());
    assert_eq!(resp.content_type(), Some("application/json"));
    assert_eq!(resp.content_length(), Some(24));
    assert_eq!(resp.value().map(|i| i.id), Some(42));
    assert_eq!(*codes.0.lock(), vec!["200 HTTP/1.1".to_owned()]);
    mock.assert_calls(1);
}

#[tokio::test]
async fn post_json_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/items")
            .header("content-type", "application/json")
            .json_body(json!({"id": 7, "name": "plate"}));
        then.status(201).body(r#"{"id":7,"name":"plate"}"#);
    });

    let sent = Item {
        id: 7,
        name: "plate".to_owned(),
    };
    let resp = client()
        .post(server.url("/items"))
        .set_json_body(&sent)
        .to_json::<Item>()
        .await;

    assert_eq!(resp.status(), Some(http::StatusCode::CREATED));
    assert_eq!(resp.into_result().unwrap(), sent);
    mock.assert_calls(1);
}

#[tokio::test]
async fn form_body_and_headers() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PUT)
            .path("/settings")
            .header("content-type", "application/x-www-form-urlencoded")
            .header("x-tenant", "acme")
            .body("theme=dark");
        then.status(204);
    });

    let resp = client()
        .put(server.url("/settings"))
        .add_header("x-tenant", "acme")
        .set_body("theme=dark")
        .to_bytes()
        .await;

    assert_eq!(resp.status(), Some(http::StatusCode::NO_CONTENT));
    assert!(resp.value().is_some_and(bytes::Bytes::is_empty));
    mock.assert_calls(1);
}

#[tokio::test]
async fn gzip_reply_is_decoded() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/zipped");
        then.status(200)
            .header("content-encoding", "gzip")
            .body(gzip(b"compressed hello"));
    });

    let resp = client().get(server.url("/zipped")).to_string().await;
    assert_eq!(resp.into_result().unwrap(), "compressed hello");
}

#[tokio::test]
async fn error_status_keeps_meta_and_preview() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(DELETE).path("/item/1");
        then.status(503)
            .header("retry-after", "3")
            .body("maintenance");
    });

    let resp = client().delete(server.url("/item/1")).to_string().await;

    assert_eq!(resp.status(), Some(http::StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(
        resp.headers().and_then(|h| h.get("retry-after")).unwrap(),
        "3"
    );
    match resp.error() {
        Some(err @ HttpError::HttpStatus { body_preview, .. }) => {
            assert_eq!(body_preview, "maintenance");
            assert_eq!(err.to_string(), "The requested URL returned error: 503");
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn head_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(httpmock::Method::HEAD).path("/ping");
        then.status(200);
    });

    let resp = client().head(server.url("/ping")).to_bytes().await;
    assert!(resp.is_ok());
    mock.assert_calls(1);
}

#[tokio::test]
async fn coalesced_calls_hit_server_once() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/slow");
        then.status(200)
            .delay(Duration::from_millis(300))
            .body("shared");
    });

    let client = client();
    let calls = (0..6).map(|_| {
        client
            .get(server.url("/slow"))
            .singleflight(["slow:", "1"])
            .to_string()
    });
    let results = futures::future::join_all(calls).await;

    for resp in results {
        assert_eq!(resp.into_result().unwrap(), "shared");
    }
    mock.assert_calls(1);
}

#[tokio::test]
async fn uncoalesced_calls_hit_server_each_time() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/each");
        then.status(200).body("x");
    });

    let client = client();
    let calls = (0..4).map(|_| client.get(server.url("/each")).to_bytes());
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(lego_http::Response::is_ok));
    mock.assert_calls(4);
}

#[tokio::test]
async fn disabled_keep_alive_still_works() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/once");
        then.status(200).body("ok");
    });

    let client = HttpClient::builder()
        .pooled(PooledConfig {
            disable_keep_alives: true,
            ..test_config()
        })
        .build()
        .unwrap();

    for _ in 0..2 {
        let resp = client.get(server.url("/once")).to_string().await;
        assert_eq!(resp.into_result().unwrap(), "ok");
    }
    mock.assert_calls(2);
}

#[tokio::test]
async fn call_timeout_applies_to_slow_server() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/stall");
        then.status(200).delay(Duration::from_secs(5)).body("late");
    });

    let client = HttpClient::builder()
        .pooled(test_config())
        .call_timeout(Duration::from_millis(200))
        .build()
        .unwrap();

    let resp = client.get(server.url("/stall")).to_string().await;
    assert!(matches!(resp.error(), Some(HttpError::Timeout(_))));
    assert!(resp.meta().is_none());
}

#[tokio::test]
async fn trace_middleware_sets_header() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/traced")
            .header("ht-trace-id", "abc123")
            .header("x-client-version", "2.0.0");
        then.status(200);
    });

    let client = HttpClient::builder()
        .pooled(test_config())
        .middleware(TraceMiddleware::new(["X-CLIENT-VERSION"]))
        .build()
        .unwrap();

    let ctx = RequestContext::new()
        .with_trace_id("abc123")
        .with_value("X-CLIENT-VERSION", "2.0.0");
    let resp = client
        .get(server.url("/traced"))
        .set_context(ctx)
        .to_bytes()
        .await;

    assert!(resp.is_ok(), "unexpected error: {:?}", resp.error());
    mock.assert_calls(1);
}

#[tokio::test]
async fn connection_refused_is_transport_error() {
    // bind and drop to get a port nobody listens on
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let resp = client()
        .get(format!("http://127.0.0.1:{port}/"))
        .to_string()
        .await;

    assert!(matches!(resp.error(), Some(HttpError::Transport(_))));
    assert!(resp.status().is_none());
}
