//! Stub transports for unit tests.

use crate::error::HttpError;
use crate::response::ResponseBody;
use crate::transport::{Transport, box_body};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) type Reply = Result<http::Response<ResponseBody>, HttpError>;

type Responder = Box<dyn Fn(http::Request<Bytes>) -> Reply + Send + Sync>;

/// Counts attempts and answers with a closure.
pub(crate) struct StubTransport {
    calls: AtomicUsize,
    delay: Option<Duration>,
    respond: Responder,
}

impl StubTransport {
    pub(crate) fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(http::Request<Bytes>) -> Reply + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: None,
            respond: Box::new(respond),
        })
    }

    /// Like [`StubTransport::new`] but sleeps for `delay` before answering.
    pub(crate) fn slow<F>(delay: Duration, respond: F) -> Arc<Self>
    where
        F: Fn(http::Request<Bytes>) -> Reply + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Some(delay),
            respond: Box::new(respond),
        })
    }

    /// Answers 200 with the request body and content type.
    pub(crate) fn echo() -> Arc<Self> {
        Self::new(|req| {
            let mut builder = http::Response::builder().status(200);
            if let Some(ct) = req.headers().get(http::header::CONTENT_TYPE) {
                builder = builder.header(http::header::CONTENT_TYPE, ct);
            }
            Ok(builder.body(box_body(Full::new(req.into_body())))?)
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn execute(
        &self,
        request: http::Request<Full<Bytes>>,
    ) -> Result<http::Response<ResponseBody>, HttpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };
        (self.respond)(http::Request::from_parts(parts, body))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

pub(crate) fn reply(status: u16, body: impl Into<Bytes>) -> Reply {
    Ok(http::Response::builder()
        .status(status)
        .version(http::Version::HTTP_11)
        .body(box_body(Full::new(body.into())))?)
}

pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
