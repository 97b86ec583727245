use crate::builder::HttpClientBuilder;
use crate::coalesce::Coalescer;
use crate::config::HttpClientConfig;
use crate::error::HttpError;
use crate::middleware::Pipeline;
use crate::request::Request;
use http::Method;
use std::fmt;
use std::sync::Arc;

/// Outbound HTTP client owning one transport
///
/// `HttpClient` is `Clone + Send + Sync`; clones share the transport, the
/// middleware chain, the metrics sink and the coalescing table. To change any
/// of those, build a new client.
///
/// Coalescing keys are scoped to one client: two clients never share an
/// execution even for the same key.
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::builder()
///     .middleware(TraceMiddleware::new(["X-Tenant"]))
///     .metrics(Arc::new(LoggingMetrics))
///     .build()?;
///
/// let body = client.get("http://svc/health").to_string().await.into_result()?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    pipeline: Pipeline,
    coalescer: Coalescer,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("transport", &self.inner.pipeline.transport.name())
            .field("middleware", &self.inner.pipeline.handlers.len())
            .field("call_timeout", &self.inner.pipeline.call_timeout)
            .field("max_body_size", &self.inner.pipeline.max_body_size)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a builder for configuring the HTTP client
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Client with the default pooled transport
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn pooled() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// Client with the default h2c transport
    ///
    /// # Errors
    /// Never fails for h2c; the `Result` mirrors the other constructors.
    pub fn h2c() -> Result<Self, HttpError> {
        HttpClientBuilder::with_config(HttpClientConfig::h2c()).build()
    }

    /// Client built from a loaded configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn from_config(config: HttpClientConfig) -> Result<Self, HttpError> {
        HttpClientBuilder::with_config(config).build()
    }

    pub(crate) fn from_pipeline(pipeline: Pipeline) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                pipeline,
                coalescer: Coalescer::default(),
            }),
        }
    }

    /// New GET request. `url` may be empty and set later with `set_url`.
    pub fn request(&self, url: impl Into<String>) -> Request {
        Request::new(self.clone(), Method::GET, url.into())
    }

    pub fn get(&self, url: impl Into<String>) -> Request {
        self.request(url)
    }

    pub fn post(&self, url: impl Into<String>) -> Request {
        self.request(url).post()
    }

    pub fn put(&self, url: impl Into<String>) -> Request {
        self.request(url).put()
    }

    pub fn delete(&self, url: impl Into<String>) -> Request {
        self.request(url).delete()
    }

    pub fn head(&self, url: impl Into<String>) -> Request {
        self.request(url).head()
    }

    /// Label of the transport this client sends through.
    #[must_use]
    pub fn transport_name(&self) -> &'static str {
        self.inner.pipeline.transport.name()
    }

    pub(crate) fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    pub(crate) fn coalescer(&self) -> &Coalescer {
        &self.inner.coalescer
    }
}
