//! Tracing middleware.

use crate::context::TRACE_ID_KEY;
use crate::middleware::{Completion, Handler, Middleware};
use crate::otel;
use async_trait::async_trait;
use http::header::{HeaderName, HeaderValue};
use tracing::Instrument;

/// Wire name of the trace id header (`Ht-Trace-Id`).
pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("ht-trace-id");

/// Opens an `http client` span around every attempt and propagates trace data.
///
/// Before calling `next()` it:
/// - copies the named context values ("packs") into same-named headers,
/// - sets `Ht-Trace-Id` from the context trace id, generating one if absent,
/// - injects W3C trace context when the `otel` feature is enabled.
///
/// After the chain returns it records `http.status_code` and `error` on the span.
#[derive(Debug, Clone, Default)]
pub struct TraceMiddleware {
    packs: Vec<String>,
}

impl TraceMiddleware {
    #[must_use]
    pub fn new<I>(packs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            packs: packs.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Handler for TraceMiddleware {
    async fn handle(&self, mut mw: Middleware<'_>) -> Completion {
        let request = mw.request_mut();

        let packed: Vec<(HeaderName, HeaderValue)> = self
            .packs
            .iter()
            .filter_map(|pack| {
                let value = request.context().value(pack).filter(|v| !v.is_empty())?;
                Some((
                    HeaderName::try_from(pack.as_str()).ok()?,
                    HeaderValue::from_str(value).ok()?,
                ))
            })
            .collect();
        for (name, value) in packed {
            request.headers_mut().insert(name, value);
        }

        let trace_id = request
            .context()
            .trace_id()
            .filter(|id| !id.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().simple().to_string(), str::to_owned);
        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            request.headers_mut().insert(TRACE_ID_HEADER, value);
        }
        request.context_mut().set_value(TRACE_ID_KEY, trace_id.clone());

        let host = http::Uri::try_from(request.url())
            .ok()
            .and_then(|uri| uri.host().map(str::to_owned))
            .unwrap_or_default();

        let span = tracing::info_span!(
            "http client",
            http.url = %host,
            http.method = %request.method(),
            trace_id = %trace_id,
            otel.kind = "client",
            http.status_code = tracing::field::Empty,
            error = tracing::field::Empty,
        );
        otel::inject_span(&span, request.headers_mut());

        let done = mw.next().instrument(span.clone()).await;

        if let Some(status) = done.status() {
            span.record("http.status_code", status.as_u16());
        }
        if let Some(err) = done.error() {
            span.record("error", tracing::field::display(err));
        }
        done
    }
}
