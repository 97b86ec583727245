//! Transport strategies.
//!
//! A [`Transport`] performs exactly one network attempt for a fully built
//! request. Two strategies ship with the crate:
//!
//! - [`PooledTransport`]: keep-alive connection pool, HTTP/1.1 (and h2 over
//!   TLS via ALPN), honors environment proxies.
//! - [`H2cTransport`]: HTTP/2 over cleartext TCP with prior knowledge.
//!
//! Transports return the raw reply for every status code. Classifying
//! `[400, 600]` as a failure, reading the body and reporting metrics happen
//! in the terminal pipeline stage so that every strategy, including test
//! stubs, shares one contract.

mod h2c;
mod pooled;
mod proxy;

pub use h2c::H2cTransport;
pub use pooled::PooledTransport;

use crate::error::HttpError;
use crate::response::ResponseBody;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};

/// Lowest status code treated as a failed call.
pub const FAILURE_STATUS_MIN: u16 = 400;

/// Highest status code treated as a failed call (inclusive).
pub const FAILURE_STATUS_MAX: u16 = 600;

/// Performs one network attempt.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `request` and return the reply head with its still-unread body.
    ///
    /// # Errors
    /// Returns `HttpError::Transport`, `HttpError::Tls` or `HttpError::Timeout`
    /// for failures below HTTP (DNS, connect, handshake, reset).
    async fn execute(&self, request: Request<Full<Bytes>>)
    -> Result<Response<ResponseBody>, HttpError>;

    /// Short label used in logs.
    fn name(&self) -> &'static str;
}

/// `true` for status codes in the inclusive failure range `[400, 600]`.
#[must_use]
pub fn is_failure_status(status: StatusCode) -> bool {
    (FAILURE_STATUS_MIN..=FAILURE_STATUS_MAX).contains(&status.as_u16())
}

/// Box any hyper-compatible body into a [`ResponseBody`].
pub fn box_body<B>(body: B) -> ResponseBody
where
    B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    body.map_err(Into::into).boxed()
}

/// Map a pool error to the matching `HttpError` variant.
///
/// Timed-out connects become `Timeout(connect_budget)`, rustls failures
/// become `Tls`, everything else is `Transport`.
pub(crate) fn classify_client_error(
    err: hyper_util::client::legacy::Error,
    connect_budget: std::time::Duration,
) -> HttpError {
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        if cause.is::<rustls::Error>() {
            return HttpError::Tls(std::sync::Arc::new(err));
        }
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut && err.is_connect() {
                return HttpError::Timeout(connect_budget);
            }
            if io.get_ref().is_some_and(|inner| inner.is::<rustls::Error>()) {
                return HttpError::Tls(std::sync::Arc::new(err));
            }
        }
        source = cause.source();
    }
    HttpError::from(err)
}
