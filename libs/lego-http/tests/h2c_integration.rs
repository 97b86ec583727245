//! End-to-end tests of the cleartext HTTP/2 transport against a local mock server.

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use lego_http::{AttemptRecord, H2cConfig, HttpClient, HttpClientMetrics, HttpError};
use parking_lot::Mutex;
use serde::Deserialize;

#[derive(Default)]
struct Codes(Mutex<Vec<String>>);

impl HttpClientMetrics for Codes {
    fn record(&self, attempt: &AttemptRecord<'_>) {
        self.0.lock().push(format!("{} {}", attempt.code, attempt.protocol));
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct Item {
    id: u64,
    name: String,
}

#[tokio::test]
async fn get_item_over_h2c() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/item").query_param("id", "42");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"id":42,"name":"brick"}"#);
    });

    let codes = Arc::new(Codes::default());
    let client = HttpClient::builder()
        .h2c(H2cConfig::default())
        .metrics(codes.clone())
        .build()
        .unwrap();
    assert_eq!(client.transport_name(), "h2c");

    let resp = client
        .get(server.url("/item"))
        .set_param("id", [42])
        .set_name("getItem")
        .to_json::<Item>()
        .await;

    assert_eq!(resp.status(), Some(http::StatusCode::OK));
    assert!(!resp.is_http11());
    assert_eq!(resp.meta().map(|m| m.protocol()), Some("HTTP/2.0"));
    assert_eq!(resp.value().map(|i| i.name.as_str()), Some("brick"));
    assert_eq!(*codes.0.lock(), vec!["200 HTTP/2.0".to_owned()]);
    mock.assert_calls(1);
}

#[tokio::test]
async fn error_status_over_h2c() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/missing");
        then.status(404).body("no such item");
    });

    let resp = HttpClient::h2c()
        .unwrap()
        .get(server.url("/missing"))
        .to_string()
        .await;

    assert_eq!(resp.status(), Some(http::StatusCode::NOT_FOUND));
    match resp.error() {
        Some(HttpError::HttpStatus { body_preview, .. }) => assert_eq!(body_preview, "no such item"),
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn coalesced_calls_share_one_h2c_stream() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/slow");
        then.status(200)
            .delay(Duration::from_millis(300))
            .body("shared");
    });

    let client = HttpClient::h2c().unwrap();
    let calls = (0..5).map(|_| {
        client
            .get(server.url("/slow"))
            .singleflight(["slow:", "1"])
            .to_string()
    });
    let results = futures::future::join_all(calls).await;

    for resp in results {
        assert!(!resp.is_http11());
        assert_eq!(resp.into_result().unwrap(), "shared");
    }
    mock.assert_calls(1);
}

#[tokio::test]
async fn h2c_rejects_https_targets() {
    let resp = HttpClient::h2c()
        .unwrap()
        .get("https://127.0.0.1:1/item")
        .to_bytes()
        .await;

    assert!(matches!(resp.error(), Some(HttpError::Transport(_))));
    assert!(resp.meta().is_none());
}
