#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Outbound HTTP client core
//!
//! This crate provides a hyper-based HTTP client with:
//! - Two transport strategies: a keep-alive pool (HTTP/1.1, h2 over TLS via
//!   ALPN, environment proxies) and cleartext HTTP/2 with prior knowledge
//! - A middleware pipeline wrapped around every network attempt
//! - Request coalescing: concurrent calls sharing a key run once
//! - Transparent gzip decoding and JSON/XML/text/bytes decode sinks
//! - A pluggable per-attempt metrics sink
//! - Optional OpenTelemetry context propagation (feature `otel`)
//!
//! # Failure classification
//!
//! Every terminal operation returns a [`Response`] holding the reply
//! metadata (when a reply arrived) and either the decoded value or an
//! [`HttpError`]. Statuses in `[400, 600]` are failures but still carry
//! metadata. Build errors and middleware stops never reach the network.
//!
//! # Example
//!
//! ```ignore
//! use lego_http::{HttpClient, TraceMiddleware};
//!
//! #[derive(serde::Deserialize)]
//! struct Item { id: u64 }
//!
//! let client = HttpClient::builder()
//!     .middleware(TraceMiddleware::new(["X-CLIENT-VERSION"]))
//!     .build()?;
//!
//! let resp = client
//!     .get("http://svc/item")
//!     .set_param("id", [42])
//!     .set_name("getItem")
//!     .to_json::<Item>()
//!     .await;
//!
//! let item = resp.into_result()?;
//! ```

mod builder;
mod client;
mod coalesce;
mod config;
mod context;
mod error;
mod metrics;
mod middleware;
pub mod otel;
mod request;
mod response;
#[cfg(test)]
mod testing;
mod tls;
mod trace;
mod transport;

pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use config::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_BODY_SIZE, ENV_PREFIX, H2cConfig, HttpClientConfig,
    PooledConfig, TlsRootConfig, TransportKind,
};
pub use context::{RequestContext, TRACE_ID_KEY};
pub use error::{HttpError, InvalidUriKind, SharedError};
pub use metrics::{AttemptRecord, ERROR_CODE_LABEL, HttpClientMetrics, LoggingMetrics, NoOpMetrics};
pub use middleware::{Completion, Handler, Middleware};
pub use request::Request;
pub use response::{ERROR_BODY_PREVIEW_LIMIT, Response, ResponseBody, ResponseMeta};
pub use trace::{TRACE_ID_HEADER, TraceMiddleware};
pub use transport::{
    FAILURE_STATUS_MAX, FAILURE_STATUS_MIN, H2cTransport, PooledTransport, Transport, box_body,
    is_failure_status,
};
