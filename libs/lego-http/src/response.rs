use crate::error::HttpError;
use bytes::Bytes;
use flate2::read::GzDecoder;
use http::{HeaderMap, StatusCode, Version};
use http_body::Frame;
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use std::io::Read;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Maximum body preview size carried by status errors (8KB).
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Type alias for the boxed body a [`Transport`](crate::Transport) returns.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Metadata of one physical reply.
///
/// Produced once per network attempt and shared unchanged by every caller
/// coalesced onto that attempt.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Declared body length; `None` when the peer did not announce one
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub version: Version,
}

impl ResponseMeta {
    pub(crate) fn from_reply(parts: &http::response::Parts, body_hint: Option<u64>) -> Self {
        let content_length = parts
            .headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .or(body_hint);

        let content_type = parts
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self {
            status: parts.status,
            headers: parts.headers.clone(),
            content_length,
            content_type,
            version: parts.version,
        }
    }

    /// `true` only for exactly HTTP/1.1 replies.
    #[must_use]
    pub fn is_http11(&self) -> bool {
        self.version == Version::HTTP_11
    }

    /// Protocol label as it appears on the status line, e.g. `HTTP/1.1`.
    #[must_use]
    pub fn protocol(&self) -> &'static str {
        protocol_label(self.version)
    }
}

pub(crate) fn protocol_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "",
    }
}

/// Decoded result of a terminal operation together with the reply metadata.
///
/// `meta` is present whenever the network attempt produced a reply, including
/// status and decode failures. It is absent for build errors, middleware stops,
/// cancellations and transport failures.
///
/// # Example
///
/// ```ignore
/// let resp = client.get("http://svc/item").set_param("id", [42]).to_json::<Item>().await;
/// if let Some(err) = resp.error() {
///     tracing::warn!(status = ?resp.status(), error = %err, "lookup failed");
/// }
/// let item = resp.into_result()?;
/// ```
#[derive(Debug)]
pub struct Response<T> {
    meta: Option<ResponseMeta>,
    result: Result<T, HttpError>,
}

impl<T> Response<T> {
    pub(crate) fn new(meta: Option<ResponseMeta>, result: Result<T, HttpError>) -> Self {
        Self { meta, result }
    }

    #[must_use]
    pub fn meta(&self) -> Option<&ResponseMeta> {
        self.meta.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.meta.as_ref().map(|m| m.status)
    }

    #[must_use]
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.meta.as_ref().map(|m| &m.headers)
    }

    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.meta.as_ref().and_then(|m| m.content_length)
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.content_type.as_deref())
    }

    #[must_use]
    pub fn is_http11(&self) -> bool {
        self.meta.as_ref().is_some_and(ResponseMeta::is_http11)
    }

    #[must_use]
    pub fn error(&self) -> Option<&HttpError> {
        self.result.as_ref().err()
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    /// Drop the metadata and keep the decoded value or the error.
    ///
    /// # Errors
    /// Returns the error recorded for this call.
    pub fn into_result(self) -> Result<T, HttpError> {
        self.result
    }

    #[must_use]
    pub fn into_parts(self) -> (Option<ResponseMeta>, Result<T, HttpError>) {
        (self.meta, self.result)
    }
}

pin_project! {
    /// Body wrapper that fails with [`HttpError::BodyTooLarge`] once more than
    /// `limit` data bytes have been read.
    pub(crate) struct LimitedBody {
        #[pin]
        inner: ResponseBody,
        limit: usize,
        read: usize,
    }
}

impl LimitedBody {
    pub(crate) fn new(inner: ResponseBody, limit: usize) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }
}

impl http_body::Body for LimitedBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    *this.read = this.read.saturating_add(data.len());
                    if *this.read > *this.limit {
                        return Poll::Ready(Some(Err(HttpError::BodyTooLarge { limit: *this.limit })));
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(HttpError::Transport(Arc::from(e))))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}

/// Read the whole body, enforcing `limit`, and gunzip it when the reply
/// declares `Content-Encoding: gzip`.
///
/// The body is consumed (and therefore released) on every path.
pub(crate) async fn read_body(
    headers: &HeaderMap,
    body: ResponseBody,
    limit: usize,
) -> Result<Bytes, HttpError> {
    let raw = LimitedBody::new(body, limit).collect().await?.to_bytes();

    if is_gzip(headers) {
        gunzip(&raw, limit)
    } else {
        Ok(raw)
    }
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"))
}

fn gunzip(compressed: &[u8], limit: usize) -> Result<Bytes, HttpError> {
    let mut out = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    GzDecoder::new(compressed)
        .take(cap)
        .read_to_end(&mut out)
        .map_err(|e| HttpError::Decompress(Arc::new(e)))?;

    if out.len() > limit {
        return Err(HttpError::BodyTooLarge { limit });
    }
    Ok(Bytes::from(out))
}

/// First [`ERROR_BODY_PREVIEW_LIMIT`] bytes of a body as lossy text.
pub(crate) fn body_preview(body: &[u8]) -> String {
    let end = body.len().min(ERROR_BODY_PREVIEW_LIMIT);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

pub(crate) fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, HttpError> {
    serde_json::from_slice(body).map_err(|e| HttpError::Decode {
        source: Arc::new(e),
        body: String::from_utf8_lossy(body).into_owned(),
    })
}

pub(crate) fn decode_xml<T: DeserializeOwned>(body: &[u8]) -> Result<T, HttpError> {
    quick_xml::de::from_reader(body).map_err(|e| HttpError::Xml(Arc::new(e)))
}

pub(crate) fn decode_string(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}
