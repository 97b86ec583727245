use crate::client::HttpClient;
use crate::config::{H2cConfig, HttpClientConfig, PooledConfig, TransportKind};
use crate::error::HttpError;
use crate::metrics::{HttpClientMetrics, NoOpMetrics};
use crate::middleware::{Handler, Pipeline};
use crate::transport::{H2cTransport, PooledTransport, Transport};
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`HttpClient`]
///
/// Middleware is fixed once the client is built; every request created by
/// the client runs through the same chain in registration order.
#[must_use]
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    transport: Option<Arc<dyn Transport>>,
    handlers: Vec<Arc<dyn Handler>>,
    metrics: Arc<dyn HttpClientMetrics>,
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a builder from an existing configuration
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            transport: None,
            handlers: Vec::new(),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Replace the whole configuration. Registered middleware and metrics are kept.
    pub fn config(mut self, config: HttpClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use the pooled transport with `config`
    pub fn pooled(mut self, config: PooledConfig) -> Self {
        self.config.transport = TransportKind::Pooled;
        self.config.pooled = config;
        self
    }

    /// Use the h2c transport with `config`
    pub fn h2c(mut self, config: H2cConfig) -> Self {
        self.config.transport = TransportKind::H2c;
        self.config.h2c = config;
        self
    }

    /// Use a caller-provided transport instead of building one from the configuration
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Append a handler to the middleware chain
    pub fn middleware(mut self, handler: impl Handler) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Set the metrics sink. Defaults to [`NoOpMetrics`].
    pub fn metrics(mut self, metrics: Arc<dyn HttpClientMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Overall timeout of one attempt, body read included
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Cap on the decoded response body
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Build the client
    ///
    /// # Errors
    /// Returns `HttpError::Tls` if the pooled transport cannot load its root
    /// certificates.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => match self.config.transport {
                TransportKind::Pooled => Arc::new(PooledTransport::new(&self.config.pooled)?),
                TransportKind::H2c => Arc::new(H2cTransport::new(&self.config.h2c)),
            },
        };

        tracing::debug!(
            transport = transport.name(),
            middleware = self.handlers.len(),
            call_timeout = ?self.config.call_timeout,
            max_body_size = self.config.max_body_size,
            "building HTTP client"
        );

        Ok(HttpClient::from_pipeline(Pipeline {
            handlers: self.handlers.into(),
            transport,
            metrics: self.metrics,
            call_timeout: self.config.call_timeout,
            max_body_size: self.config.max_body_size,
        }))
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
