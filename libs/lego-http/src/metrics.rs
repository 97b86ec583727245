//! Metrics sink for outbound calls.
//!
//! One [`AttemptRecord`] is emitted per physical network attempt. Coalesced
//! waiters do not report: only the caller that executed the attempt does.
//! Backends (Prometheus, StatsD...) implement [`HttpClientMetrics`].

use std::time::Instant;

/// Status label used when the transport failed before a reply arrived.
pub const ERROR_CODE_LABEL: &str = "error";

/// Observation of one completed network attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord<'a> {
    /// Target authority (`host[:port]`)
    pub host: &'a str,
    /// Numeric status code, or [`ERROR_CODE_LABEL`] on transport failure
    pub code: String,
    /// Reply protocol (`HTTP/1.1`, `HTTP/2.0`); empty when there was no reply
    pub protocol: &'a str,
    pub method: &'a str,
    /// Logical request name set with `set_name`, empty if unset
    pub name: &'a str,
    /// When the attempt started
    pub started: Instant,
}

/// Trait for metrics backends
pub trait HttpClientMetrics: Send + Sync {
    /// Record one finished attempt, successful or not
    fn record(&self, attempt: &AttemptRecord<'_>);
}

/// No-op metrics implementation (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl HttpClientMetrics for NoOpMetrics {
    fn record(&self, _attempt: &AttemptRecord<'_>) {}
}

/// Logging-based metrics implementation (for debugging)
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMetrics;

impl HttpClientMetrics for LoggingMetrics {
    fn record(&self, attempt: &AttemptRecord<'_>) {
        let elapsed_ms = u64::try_from(attempt.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(
            metric = "http.client.request",
            http.host = attempt.host,
            http.status_code = %attempt.code,
            http.protocol = attempt.protocol,
            http.method = attempt.method,
            name = attempt.name,
            elapsed_ms,
            "HTTP client attempt recorded"
        );
    }
}
