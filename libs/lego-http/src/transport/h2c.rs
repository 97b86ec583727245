use super::{Transport, box_body, classify_client_error};
use crate::config::H2cConfig;
use crate::error::HttpError;
use crate::response::ResponseBody;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;

/// HTTP/2 over cleartext TCP using prior knowledge.
///
/// Every connection opens with the HTTP/2 preface, so the peer must speak h2c.
/// Proxies are never used.
///
/// Only `http://` targets are accepted. An `https://` URL is rejected before
/// dialing with [`HttpError::Transport`] rather than sent as cleartext to a TLS
/// port; use [`PooledTransport`](crate::PooledTransport) for TLS targets.
#[derive(Clone)]
pub struct H2cTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    dial_timeout: Duration,
}

impl H2cTransport {
    #[must_use]
    pub fn new(config: &H2cConfig) -> Self {
        let mut tcp = HttpConnector::new();
        tcp.set_nodelay(true);
        tcp.set_connect_timeout(Some(config.dial_timeout));

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .timer(TokioTimer::new())
            .http2_only(true)
            .build(tcp);

        Self {
            client,
            dial_timeout: config.dial_timeout,
        }
    }
}

impl Default for H2cTransport {
    fn default() -> Self {
        Self::new(&H2cConfig::default())
    }
}

#[async_trait]
impl Transport for H2cTransport {
    async fn execute(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<ResponseBody>, HttpError> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| classify_client_error(e, self.dial_timeout))?;
        Ok(response.map(box_body))
    }

    fn name(&self) -> &'static str {
        "h2c"
    }
}
