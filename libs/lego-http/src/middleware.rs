//! Middleware pipeline.
//!
//! Handlers run in registration order around the network attempt. Each
//! handler receives a [`Middleware`] capability by value and must hand back
//! the [`Completion`] obtained from exactly one of [`Middleware::next`],
//! [`Middleware::stop`] or [`Middleware::stop_with`]. Since those methods
//! consume the capability, a handler can neither skip the decision nor run
//! the rest of the chain twice.
//!
//! ```ignore
//! struct Tenant;
//!
//! #[async_trait::async_trait]
//! impl Handler for Tenant {
//!     async fn handle(&self, mut mw: Middleware<'_>) -> Completion {
//!         let Some(tenant) = mw.request().context().value("tenant").map(str::to_owned) else {
//!             return mw.stop_with("tenant is required");
//!         };
//!         if let Ok(value) = http::HeaderValue::from_str(&tenant) {
//!             mw.request_mut().headers_mut().insert("x-tenant", value);
//!         }
//!         mw.next().await
//!     }
//! }
//! ```

use crate::error::HttpError;
use crate::metrics::{AttemptRecord, ERROR_CODE_LABEL, HttpClientMetrics};
use crate::request::Request;
use crate::response::{ResponseMeta, body_preview, protocol_label, read_body};
use crate::transport::{Transport, is_failure_status};
use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use http_body::Body as _;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Interceptor wrapped around every network attempt of a client.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, mw: Middleware<'_>) -> Completion;
}

/// Outcome of one physical execution: reply metadata and the raw body.
///
/// Shared as-is by every caller coalesced onto the execution.
#[derive(Debug, Clone)]
pub(crate) struct Exchange {
    pub(crate) meta: Option<ResponseMeta>,
    pub(crate) outcome: Result<Bytes, HttpError>,
}

impl Exchange {
    pub(crate) fn failed(err: HttpError) -> Self {
        Self {
            meta: None,
            outcome: Err(err),
        }
    }
}

/// Token proving the chain below a handler has finished.
///
/// Exposes the outcome so handlers can instrument it after `next()` returns.
#[derive(Debug)]
#[must_use = "a handler must return the Completion it obtained"]
pub struct Completion {
    exchange: Exchange,
}

impl Completion {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.exchange.meta.as_ref().map(|m| m.status)
    }

    /// Reply metadata; `None` when no reply was received.
    #[must_use]
    pub fn meta(&self) -> Option<&ResponseMeta> {
        self.exchange.meta.as_ref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&HttpError> {
        self.exchange.outcome.as_ref().err()
    }

    /// Raw (already decompressed) body of a successful attempt.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.exchange.outcome.as_ref().ok()
    }

    pub(crate) fn into_exchange(self) -> Exchange {
        self.exchange
    }
}

/// Capability handed to a [`Handler`] for the request being executed.
pub struct Middleware<'a> {
    request: &'a mut Request,
    pipeline: &'a Pipeline,
    index: usize,
}

impl Middleware<'_> {
    #[must_use]
    pub fn request(&self) -> &Request {
        self.request
    }

    /// Mutable access for adjusting headers or the context before `next()`.
    pub fn request_mut(&mut self) -> &mut Request {
        self.request
    }

    /// Run the remaining handlers and then the network attempt.
    pub async fn next(self) -> Completion {
        let Middleware {
            request,
            pipeline,
            index,
        } = self;

        match pipeline.handlers.get(index) {
            Some(handler) => {
                handler
                    .handle(Middleware {
                        request,
                        pipeline,
                        index: index + 1,
                    })
                    .await
            }
            None => Completion {
                exchange: pipeline.attempt(request).await,
            },
        }
    }

    /// Abort the chain with [`HttpError::MiddlewareStop`].
    pub fn stop(self) -> Completion {
        self.abort(HttpError::MiddlewareStop)
    }

    /// Abort the chain with a caller-supplied error.
    ///
    /// The terminal operation returns it as [`HttpError::Stopped`].
    pub fn stop_with(self, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Completion {
        self.abort(HttpError::stopped(err))
    }

    fn abort(self, err: HttpError) -> Completion {
        tracing::debug!(
            stage = self.index,
            name = self.request.name(),
            error = %err,
            "middleware stopped the request"
        );
        Completion {
            exchange: Exchange::failed(err),
        }
    }
}

/// Handler chain plus everything the terminal network stage needs.
pub(crate) struct Pipeline {
    pub(crate) handlers: Arc<[Arc<dyn Handler>]>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) metrics: Arc<dyn HttpClientMetrics>,
    pub(crate) call_timeout: Duration,
    pub(crate) max_body_size: usize,
}

impl Pipeline {
    /// Execute `request` through every handler.
    pub(crate) async fn run(&self, request: &mut Request) -> Exchange {
        Middleware {
            request,
            pipeline: self,
            index: 0,
        }
        .next()
        .await
        .into_exchange()
    }

    /// One network attempt: send, read the body, classify the status and
    /// report metrics.
    async fn attempt(&self, request: &mut Request) -> Exchange {
        let outgoing = match request.to_http() {
            Ok(outgoing) => outgoing,
            Err(err) => return Exchange::failed(err),
        };

        let host = outgoing
            .uri()
            .authority()
            .map(|a| a.as_str().to_owned())
            .unwrap_or_default();
        let method = outgoing.method().clone();
        let context = request.context().clone();
        let started = std::time::Instant::now();
        let deadline = tokio::time::Instant::now() + self.call_timeout;

        let reply = context
            .guard(within(
                deadline,
                self.call_timeout,
                self.transport.execute(outgoing),
            ))
            .await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                self.metrics.record(&AttemptRecord {
                    host: &host,
                    code: ERROR_CODE_LABEL.to_owned(),
                    protocol: "",
                    method: method.as_str(),
                    name: request.name(),
                    started,
                });
                tracing::warn!(
                    http.method = %method,
                    http.host = %host,
                    name = request.name(),
                    transport = self.transport.name(),
                    error = %err,
                    "HTTP attempt failed"
                );
                return Exchange::failed(err);
            }
        };

        let (parts, body) = reply.into_parts();
        let meta = ResponseMeta::from_reply(&parts, body.size_hint().exact());

        self.metrics.record(&AttemptRecord {
            host: &host,
            code: meta.status.as_u16().to_string(),
            protocol: protocol_label(meta.version),
            method: method.as_str(),
            name: request.name(),
            started,
        });

        let body = context
            .guard(within(
                deadline,
                self.call_timeout,
                read_body(&parts.headers, body, self.max_body_size),
            ))
            .await;

        let outcome = if is_failure_status(meta.status) {
            Err(HttpError::HttpStatus {
                status: meta.status,
                body_preview: body.as_deref().map(body_preview).unwrap_or_default(),
            })
        } else {
            body
        };

        match &outcome {
            Ok(bytes) => tracing::debug!(
                http.method = %method,
                http.host = %host,
                http.status_code = meta.status.as_u16(),
                name = request.name(),
                body_len = bytes.len(),
                "HTTP attempt completed"
            ),
            Err(err) => tracing::warn!(
                http.method = %method,
                http.host = %host,
                http.status_code = meta.status.as_u16(),
                name = request.name(),
                error = %err,
                "HTTP attempt failed"
            ),
        }

        Exchange {
            meta: Some(meta),
            outcome,
        }
    }
}

async fn within<F, T>(
    deadline: tokio::time::Instant,
    budget: Duration,
    fut: F,
) -> Result<T, HttpError>
where
    F: Future<Output = Result<T, HttpError>>,
{
    tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| HttpError::Timeout(budget))?
}
