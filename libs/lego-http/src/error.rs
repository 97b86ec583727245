use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Boxed error that can be shared between coalesced callers.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
    /// URL uses a scheme other than http/https
    UnsupportedScheme,
}

/// HTTP client error types
///
/// Every variant is cheap to clone: wrapped sources are reference counted so
/// that one failed execution can be handed to all coalesced waiters as the
/// same value.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[source] Arc<http::Error>),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[source] Arc<http::header::InvalidHeaderName>),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[source] Arc<http::header::InvalidHeaderValue>),

    /// Client configuration could not be loaded
    #[error("Invalid client configuration: {0}")]
    Config(#[source] Arc<figment::Error>),

    /// Request body could not be serialized
    #[error("JSON serialization failed: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field is a
    /// diagnostic message for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// A middleware stopped the chain without supplying an error
    #[error("middleware stop")]
    MiddlewareStop,

    /// A middleware stopped the chain with its own error
    #[error("{0}")]
    Stopped(#[source] SharedError),

    /// Single network attempt timed out
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The caller's cancellation token fired
    #[error("Request cancelled")]
    Cancelled,

    /// The caller's deadline elapsed before the attempt finished
    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    /// Transport error (DNS, connect, reset, protocol)
    #[error("Transport error: {0}")]
    Transport(#[source] SharedError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] SharedError),

    /// Reply status fell into the failure range `[400, 600]`
    #[error("The requested URL returned error: {}", status.as_u16())]
    HttpStatus {
        status: http::StatusCode,
        /// First bytes of the reply body, for diagnostics
        body_preview: String,
    },

    /// Response body exceeded the configured size limit
    #[error("Response body too large: limit {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// `Content-Encoding: gzip` body could not be decompressed
    #[error("Failed to decompress response body: {0}")]
    Decompress(#[source] Arc<std::io::Error>),

    /// JSON response could not be decoded; carries the raw body text
    #[error("{source}, body:{body}")]
    Decode {
        #[source]
        source: Arc<serde_json::Error>,
        body: String,
    },

    /// XML response could not be decoded
    #[error("{0}")]
    Xml(#[source] Arc<quick_xml::DeError>),
}

impl HttpError {
    /// Wrap any error as a transport failure.
    pub fn transport(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        HttpError::Transport(Arc::from(err.into()))
    }

    /// Wrap a caller-supplied error as a middleware stop.
    pub fn stopped(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        HttpError::Stopped(Arc::from(err.into()))
    }

    /// `true` when the error happened before any network attempt was made.
    #[must_use]
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            HttpError::RequestBuild(_)
                | HttpError::InvalidHeaderName(_)
                | HttpError::InvalidHeaderValue(_)
                | HttpError::Json(_)
                | HttpError::InvalidUri { .. }
        )
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::Json(Arc::new(err))
    }
}

impl From<http::header::InvalidHeaderName> for HttpError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        HttpError::InvalidHeaderName(Arc::new(err))
    }
}

impl From<http::header::InvalidHeaderValue> for HttpError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        HttpError::InvalidHeaderValue(Arc::new(err))
    }
}

impl From<http::Error> for HttpError {
    fn from(err: http::Error) -> Self {
        HttpError::RequestBuild(Arc::new(err))
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Arc::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Arc::new(err))
    }
}
