use crate::error::HttpError;
use std::collections::HashMap;
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Propagation key carrying the request trace id.
pub const TRACE_ID_KEY: &str = "Ht-Trace-Id";

/// Cancellation, deadline and propagation values attached to a request.
///
/// The context is consulted when the network attempt starts, not when it is
/// attached, so it can be set at any point while building the request or
/// replaced by a middleware before it calls `next()`.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
    values: HashMap<String, String>,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the attempt when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Abort the attempt once `deadline` passes.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach a propagation value (trace id, tenant, client version...).
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Shorthand for `with_value(TRACE_ID_KEY, id)`.
    #[must_use]
    pub fn with_trace_id(self, id: impl Into<String>) -> Self {
        self.with_value(TRACE_ID_KEY, id)
    }

    #[must_use]
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Trace id carried by this context, if any.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.value(TRACE_ID_KEY)
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// `true` if the token already fired or the deadline already passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|d| d <= Instant::now())
    }

    /// Drive `fut` until it completes, the token fires or the deadline passes.
    pub(crate) async fn guard<F, T>(&self, fut: F) -> Result<T, HttpError>
    where
        F: Future<Output = Result<T, HttpError>>,
    {
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = cancelled => Err(HttpError::Cancelled),
            () = expired => Err(HttpError::DeadlineExceeded),
            result = fut => result,
        }
    }
}
