use crate::client::HttpClient;
use crate::context::RequestContext;
use crate::error::{HttpError, InvalidUriKind};
use crate::middleware::Exchange;
use crate::response::{Response, decode_json, decode_string, decode_xml};
use bytes::Bytes;
use futures::FutureExt;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Uri};
use http_body_util::Full;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Outbound request bound to one [`HttpClient`].
///
/// Created by [`HttpClient::request`] or one of the method shortcuts. Every
/// setter consumes and returns the request so calls chain. Build failures
/// (body serialization, malformed headers) are recorded and only reported by
/// the terminal operation, which then makes no network attempt.
///
/// The terminal operations [`to_json`](Request::to_json),
/// [`to_xml`](Request::to_xml), [`to_string`](Request::to_string) and
/// [`to_bytes`](Request::to_bytes) consume the request, so each built request
/// executes at most once. Build a new request to call again.
///
/// # Example
///
/// ```ignore
/// #[derive(serde::Deserialize)]
/// struct Item { id: u64 }
///
/// let resp = client
///     .get("http://svc/item")
///     .set_param("id", [42])
///     .set_name("getItem")
///     .singleflight(["item:", "42"])
///     .to_json::<Item>()
///     .await;
///
/// assert_eq!(resp.status(), Some(http::StatusCode::OK));
/// let item = resp.into_result()?;
/// ```
#[must_use = "Request does nothing until a terminal operation is awaited"]
pub struct Request {
    client: HttpClient,
    method: Method,
    url: String,
    params: BTreeMap<String, Vec<String>>,
    headers: HeaderMap,
    body: Option<Bytes>,
    body_type: Option<&'static str>,
    context: RequestContext,
    name: String,
    coalesce_key: Option<String>,
    error: Option<HttpError>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url())
            .field("name", &self.name)
            .field("coalesce_key", &self.coalesce_key)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl Request {
    pub(crate) fn new(client: HttpClient, method: Method, url: String) -> Self {
        Self {
            client,
            method,
            url,
            params: BTreeMap::new(),
            headers: HeaderMap::new(),
            body: None,
            body_type: None,
            context: RequestContext::default(),
            name: String::new(),
            coalesce_key: None,
            error: None,
        }
    }

    pub fn get(self) -> Self {
        self.set_method(Method::GET)
    }

    pub fn post(self) -> Self {
        self.set_method(Method::POST)
    }

    pub fn put(self) -> Self {
        self.set_method(Method::PUT)
    }

    pub fn delete(self) -> Self {
        self.set_method(Method::DELETE)
    }

    pub fn head(self) -> Self {
        self.set_method(Method::HEAD)
    }

    pub fn set_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Replace the base URL. Query parameters added with
    /// [`set_param`](Request::set_param) are kept.
    pub fn set_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Append values for a query parameter.
    ///
    /// ```ignore
    /// let req = client.get("http://svc/search").set_param("tag", ["a", "b"]).set_param("page", [2]);
    /// assert_eq!(req.url(), "http://svc/search?page=2&tag=a&tag=b");
    /// ```
    pub fn set_param<I>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        self.params
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(|v| v.to_string()));
        self
    }

    /// Replace all headers.
    pub fn set_header(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Append one header value. An invalid name or value is recorded as a
    /// build error.
    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            (Err(e), _) => self.error = Some(e.into()),
            (_, Err(e)) => self.error = Some(e.into()),
        }
        self
    }

    /// Serialize `body` as JSON.
    ///
    /// On failure the body stays unset and the error is reported by the
    /// terminal operation.
    pub fn set_json_body<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => {
                self.body = Some(Bytes::from(bytes));
                self.body_type = Some(JSON_CONTENT_TYPE);
            }
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e.into());
                }
            }
        }
        self
    }

    /// Set a raw form-encoded body.
    pub fn set_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self.body_type = Some(FORM_CONTENT_TYPE);
        self
    }

    /// Attach cancellation, deadline and propagation values.
    ///
    /// Read when the attempt starts, so ordering relative to other setters
    /// does not matter.
    pub fn set_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Logical name reported to metrics.
    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Coalesce concurrent calls whose key parts are equal.
    ///
    /// Each rendered part is length-prefixed, so `[1, 23]` and `[12, 3]` stay
    /// distinct keys. Parts that all render empty disable coalescing.
    pub fn singleflight<I>(mut self, parts: I) -> Self
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        let parts: Vec<String> = parts.into_iter().map(|p| p.to_string()).collect();
        self.coalesce_key = if parts.iter().all(String::is_empty) {
            None
        } else {
            Some(
                parts
                    .iter()
                    .map(|p| format!("{}:{p}", p.len()))
                    .collect(),
            )
        };
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut RequestContext {
        &mut self.context
    }

    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn coalesce_key(&self) -> Option<&str> {
        self.coalesce_key.as_deref()
    }

    /// Base URL plus the encoded query string, if any parameters are set.
    ///
    /// Keys are emitted in sorted order; values of one key keep their order.
    #[must_use]
    pub fn url(&self) -> String {
        let pairs: Vec<(&str, &str)> = self
            .params
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |v| (key.as_str(), v.as_str())))
            .collect();
        if pairs.is_empty() {
            return self.url.clone();
        }

        let query = serde_urlencoded::to_string(&pairs).unwrap_or_default();
        let separator = if self.url.ends_with(['?', '&']) {
            ""
        } else if self.url.contains('?') {
            "&"
        } else {
            "?"
        };
        format!("{}{separator}{query}", self.url)
    }

    /// Decode a JSON reply into `T`.
    pub async fn to_json<T: DeserializeOwned>(self) -> Response<T> {
        let Exchange { meta, outcome } = self.exchange().await;
        Response::new(meta, outcome.and_then(|body| decode_json(&body)))
    }

    /// Decode an XML reply into `T`.
    pub async fn to_xml<T: DeserializeOwned>(self) -> Response<T> {
        let Exchange { meta, outcome } = self.exchange().await;
        Response::new(meta, outcome.and_then(|body| decode_xml(&body)))
    }

    /// Reply body as text; invalid UTF-8 is replaced.
    pub async fn to_string(self) -> Response<String> {
        let Exchange { meta, outcome } = self.exchange().await;
        Response::new(meta, outcome.map(|body| decode_string(&body)))
    }

    /// Raw reply body. Coalesced callers share the same buffer.
    pub async fn to_bytes(self) -> Response<Bytes> {
        let Exchange { meta, outcome } = self.exchange().await;
        Response::new(meta, outcome)
    }

    async fn exchange(self) -> Exchange {
        if let Err(err) = self.validate() {
            tracing::debug!(
                http.method = %self.method,
                name = %self.name,
                error = %err,
                "request rejected before execution"
            );
            return Exchange::failed(err);
        }

        let client = self.client.clone();
        match self.coalesce_key.clone() {
            Some(key) => {
                client
                    .coalescer()
                    .run(key, move || self.execute().boxed())
                    .await
            }
            None => self.execute().await,
        }
    }

    async fn execute(mut self) -> Exchange {
        let client = self.client.clone();
        client.pipeline().run(&mut self).await
    }

    fn validate(&self) -> Result<(), HttpError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        parse_url(&self.url()).map(|_| ())
    }

    /// Build the wire request. The inferred body content type applies only
    /// when no `Content-Type` header was set.
    pub(crate) fn to_http(&self) -> Result<http::Request<Full<Bytes>>, HttpError> {
        let uri = parse_url(&self.url())?;
        let mut request = http::Request::builder()
            .method(self.method.clone())
            .uri(uri)
            .body(Full::new(self.body.clone().unwrap_or_default()))?;

        *request.headers_mut() = self.headers.clone();
        if let Some(body_type) = self.body_type {
            request
                .headers_mut()
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static(body_type));
        }
        Ok(request)
    }
}

fn parse_url(url: &str) -> Result<Uri, HttpError> {
    let invalid = |kind, reason: String| HttpError::InvalidUri {
        url: url.to_owned(),
        kind,
        reason,
    };

    let uri: Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| invalid(InvalidUriKind::ParseError, e.to_string()))?;

    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(scheme) => {
            return Err(invalid(
                InvalidUriKind::UnsupportedScheme,
                format!("unsupported scheme '{scheme}', expected http or https"),
            ));
        }
        None => {
            return Err(invalid(InvalidUriKind::MissingScheme, "missing scheme".to_owned()));
        }
    }

    if uri.authority().is_none() {
        return Err(invalid(
            InvalidUriKind::MissingAuthority,
            "missing host/authority".to_owned(),
        ));
    }
    Ok(uri)
}
