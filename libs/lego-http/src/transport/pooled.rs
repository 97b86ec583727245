use super::proxy::{ProxyConnector, proxy_authorization};
use super::{Transport, box_body, classify_client_error};
use crate::config::PooledConfig;
use crate::error::HttpError;
use crate::response::ResponseBody;
use crate::tls;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, header};
use http_body_util::Full;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::proxy::matcher::Matcher;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use std::time::Duration;

type PooledConnector = ProxyConnector<HttpsConnector<HttpConnector>>;

/// Keep-alive pooled transport.
///
/// Speaks HTTP/1.1 over cleartext and negotiates h2 or HTTP/1.1 over TLS.
/// Idle connections are kept per host up to
/// [`PooledConfig::effective_idle_per_host`] and closed after
/// `idle_conn_timeout`.
#[derive(Clone)]
pub struct PooledTransport {
    client: Client<PooledConnector, Full<Bytes>>,
    proxy: Option<Arc<Matcher>>,
    close_connections: bool,
    connect_budget: Duration,
}

impl PooledTransport {
    /// Build the pool.
    ///
    /// # Errors
    /// Returns `HttpError::Tls` if the configured root certificates cannot be loaded.
    pub fn new(config: &PooledConfig) -> Result<Self, HttpError> {
        let mut tcp = HttpConnector::new();
        tcp.enforce_http(false);
        tcp.set_nodelay(true);
        tcp.set_connect_timeout(Some(config.dial_timeout));
        tcp.set_keepalive(Some(config.keep_alive));

        let https = tls::https_connector(config.tls_roots, tcp)?;
        let proxy = config.use_env_proxy.then(|| Arc::new(Matcher::from_env()));
        let connector = ProxyConnector::new(https, proxy.clone(), config.connect_budget());

        // pool_timer drives pool_idle_timeout
        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(config.idle_conn_timeout)
            .pool_max_idle_per_host(config.effective_idle_per_host())
            .build(connector);

        tracing::debug!(
            idle_per_host = config.effective_idle_per_host(),
            idle_timeout = ?config.idle_conn_timeout,
            env_proxy = config.use_env_proxy,
            "pooled transport ready"
        );

        Ok(Self {
            client,
            proxy,
            close_connections: config.disable_keep_alives,
            connect_budget: config.connect_budget(),
        })
    }

    fn prepare(&self, request: &mut Request<Full<Bytes>>) {
        if let Some(auth) = proxy_authorization(self.proxy.as_deref(), request.uri()) {
            request
                .headers_mut()
                .entry(header::PROXY_AUTHORIZATION)
                .or_insert(auth);
        }
        if self.close_connections {
            request
                .headers_mut()
                .entry(header::CONNECTION)
                .or_insert(header::HeaderValue::from_static("close"));
        }
    }
}

#[async_trait]
impl Transport for PooledTransport {
    async fn execute(
        &self,
        mut request: Request<Full<Bytes>>,
    ) -> Result<Response<ResponseBody>, HttpError> {
        self.prepare(&mut request);
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| classify_client_error(e, self.connect_budget))?;
        Ok(response.map(box_body))
    }

    fn name(&self) -> &'static str {
        "pooled"
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request<Full<Bytes>> {
        Request::get(uri).body(Full::new(Bytes::new())).unwrap()
    }

    #[tokio::test]
    async fn test_disable_keep_alives_sends_connection_close() {
        let config = PooledConfig {
            disable_keep_alives: true,
            use_env_proxy: false,
            ..Default::default()
        };
        let transport = PooledTransport::new(&config).unwrap();

        let mut req = request("http://svc/item");
        transport.prepare(&mut req);
        assert_eq!(req.headers().get(header::CONNECTION).unwrap(), "close");
    }

    #[tokio::test]
    async fn test_keep_alive_leaves_headers_alone() {
        let config = PooledConfig {
            use_env_proxy: false,
            ..Default::default()
        };
        let transport = PooledTransport::new(&config).unwrap();

        let mut req = request("http://svc/item");
        transport.prepare(&mut req);
        assert!(req.headers().is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let config = PooledConfig {
            use_env_proxy: false,
            dial_timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let transport = PooledTransport::new(&config).unwrap();

        // port 1 on loopback is never listening in CI containers
        let err = transport
            .execute(request("http://127.0.0.1:1/"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, HttpError::Transport(_) | HttpError::Timeout(_)),
            "unexpected error: {err:?}"
        );
    }
}
