use crate::body::{ByteArrayBody, FormBuilder, RequestBody};
use crate::client::ClientInner;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::HttpResponse;
use crate::transport::Outgoing;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::Method;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use url::Url;

/// Request as seen by a [`RequestInterceptor`], just before it is sent.
///
/// Client defaults and body metadata have already been applied to the
/// headers.
pub struct InterceptedRequest<'a> {
    method: &'a Method,
    url: &'a Url,
    headers: &'a mut HeaderMap,
}

impl InterceptedRequest<'_> {
    #[must_use]
    pub fn method(&self) -> &Method {
        self.method
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        self.url
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.headers
    }
}

/// Hook run on every request of a client, in registration order.
///
/// Returning an error aborts the request before anything is sent.
pub trait RequestInterceptor: Send + Sync {
    /// # Errors
    ///
    /// Any error rejects the request and is returned from `send()`.
    fn intercept(&self, request: &mut InterceptedRequest<'_>) -> Result<(), HttpError>;
}

impl<F> RequestInterceptor for F
where
    F: Fn(&mut InterceptedRequest<'_>) -> Result<(), HttpError> + Send + Sync,
{
    fn intercept(&self, request: &mut InterceptedRequest<'_>) -> Result<(), HttpError> {
        self(request)
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), HttpError> {
    let name = HeaderName::try_from(name)?;
    let value = HeaderValue::try_from(value)?;
    Ok((name, value))
}

/// `Basic` credentials value, marked sensitive
pub fn basic_authorization(username: &str, password: &str) -> Result<HeaderValue, HttpError> {
    let encoded = STANDARD.encode(format!("{username}:{password}"));
    let mut value = HeaderValue::try_from(format!("Basic {encoded}"))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Parse and check an absolute `http`/`https` URL with a host
fn validate_url(raw: &str) -> Result<Url, HttpError> {
    let url = Url::parse(raw).map_err(|e| HttpError::InvalidUri {
        url: raw.to_owned(),
        kind: InvalidUriKind::ParseError,
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(HttpError::InvalidScheme {
            scheme: url.scheme().to_owned(),
        });
    }
    if url.host().is_none() {
        return Err(HttpError::InvalidUri {
            url: raw.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host".to_owned(),
        });
    }
    Ok(url)
}

/// Blocking HTTP request builder with fluent API
///
/// Created by [`HttpClient::get`](crate::HttpClient::get),
/// [`HttpClient::post`](crate::HttpClient::post), etc. Invalid header names
/// or values do not fail immediately; the first such error is returned by
/// [`send()`](RequestBuilder::send).
///
/// # Example
///
/// ```ignore
/// use modkit_http_sync::{HttpClient, body::ByteArrayBody};
///
/// let client = HttpClient::new()?;
///
/// let body = ByteArrayBody::encode("Hello, World!")
///     .with_content_type("text/plain; charset=utf-8");
/// let response = client
///     .post("https://api.example.com/echo")
///     .header("x-request-id", "123")
///     .body(body)
///     .send()?;
/// response.close()?;
/// ```
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    client: Arc<ClientInner>,
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Box<dyn RequestBody>>,
    content_length: Option<u64>,
    timeout: Option<Duration>,
    /// Error captured during building (deferred to `send()`)
    error: Option<HttpError>,
}

impl RequestBuilder {
    pub(crate) fn new(client: Arc<ClientInner>, method: Method, url: String) -> Self {
        Self {
            client,
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            content_length: None,
            timeout: None,
            error: None,
        }
    }

    fn with_header(mut self, name: &str, value: &str, mode: SetMode) -> Self {
        if self.error.is_some() {
            return self;
        }
        match parse_header(name, value) {
            Ok((name, value)) => match mode {
                SetMode::Replace => {
                    self.headers.insert(name, value);
                }
                SetMode::Append => {
                    self.headers.append(name, value);
                }
                SetMode::IfAbsent => {
                    self.headers.entry(name).or_insert(value);
                }
            },
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Set a header, replacing any value already set under the same name
    pub fn header(self, name: &str, value: &str) -> Self {
        self.with_header(name, value, SetMode::Replace)
    }

    /// Add a header value, keeping values already set under the same name.
    ///
    /// Repeated values are sent as one comma-separated header line.
    pub fn append_header(self, name: &str, value: &str) -> Self {
        self.with_header(name, value, SetMode::Append)
    }

    /// Set a header only if no value is set under that name yet
    pub fn set_if_absent(self, name: &str, value: &str) -> Self {
        self.with_header(name, value, SetMode::IfAbsent)
    }

    /// Set multiple headers, replacing existing values
    pub fn headers(mut self, headers: Vec<(String, String)>) -> Self {
        for (name, value) in headers {
            self = self.header(&name, &value);
        }
        self
    }

    /// `Authorization: Basic` with UTF-8 encoded `username:password`
    pub fn basic_auth(mut self, username: &str, password: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match basic_authorization(username, password) {
            Ok(value) => {
                self.headers.insert(header::AUTHORIZATION, value);
            }
            Err(e) => self.error = Some(e),
        }
        self
    }

    pub fn user_agent(self, user_agent: &str) -> Self {
        self.header(header::USER_AGENT.as_str(), user_agent)
    }

    /// `If-Modified-Since` as an HTTP-date
    pub fn if_modified_since(mut self, time: SystemTime) -> Self {
        let value = HeaderValue::from_str(&httpdate::fmt_http_date(time));
        match value {
            Ok(value) => {
                self.headers.insert(header::IF_MODIFIED_SINCE, value);
            }
            Err(e) => self.error = Some(e.into()),
        }
        self
    }

    /// Overall timeout for this request, on top of the client's connect and
    /// read timeouts
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the body's `Content-Type`
    pub fn content_type(self, content_type: &str) -> Self {
        self.header(header::CONTENT_TYPE.as_str(), content_type)
    }

    /// Override the body's `Content-Encoding`
    pub fn content_encoding(self, content_encoding: &str) -> Self {
        self.header(header::CONTENT_ENCODING.as_str(), content_encoding)
    }

    /// Declare the body length instead of using [`RequestBody::length`].
    ///
    /// The body must produce exactly this many bytes.
    pub fn content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    /// Set the request body.
    ///
    /// Its `Content-Type` and `Content-Encoding` are sent unless set on the
    /// request; a known length is sent as `Content-Length`, otherwise the
    /// body is sent with chunked transfer encoding.
    pub fn body(mut self, body: impl RequestBody + 'static) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    pub fn body_bytes(self, body: Bytes) -> Self {
        self.body(ByteArrayBody::new(body))
    }

    /// UTF-8 text body with `Content-Type: text/plain; charset=utf-8`
    pub fn body_string(self, body: &str) -> Self {
        self.body(ByteArrayBody::encode(body).with_content_type("text/plain; charset=utf-8"))
    }

    /// Set a form URL-encoded body.
    ///
    /// # Errors
    ///
    /// Returns any deferred builder error, or [`HttpError::FormEncode`] if
    /// encoding fails.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let response = client
    ///     .post("https://auth.example.com/token")
    ///     .form(&[("grant_type", "client_credentials"), ("client_id", "my-app")])?
    ///     .send()?;
    /// ```
    pub fn form(mut self, fields: &[(&str, &str)]) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let body = FormBuilder::new().encode_all(fields)?.build();
        Ok(self.body(body))
    }

    /// Apply client defaults and body metadata not set by the caller
    fn prepare_headers(&mut self) -> Result<(), HttpError> {
        let client = Arc::clone(&self.client);
        for (name, value) in &client.default_headers {
            if !self.headers.contains_key(name) {
                self.headers.insert(name.clone(), value.clone());
            }
        }
        if let Some(authorization) = &client.authorization {
            self.headers
                .entry(header::AUTHORIZATION)
                .or_insert_with(|| authorization.clone());
        }

        let length = match &self.body {
            Some(body) => {
                if let Some(encoding) = body.content_encoding()
                    && !self.headers.contains_key(header::CONTENT_ENCODING)
                {
                    self.headers
                        .insert(header::CONTENT_ENCODING, HeaderValue::try_from(encoding)?);
                }
                if let Some(content_type) = body.content_type()
                    && !self.headers.contains_key(header::CONTENT_TYPE)
                {
                    self.headers
                        .insert(header::CONTENT_TYPE, HeaderValue::try_from(content_type)?);
                }
                self.content_length.or_else(|| body.length())
            }
            None if matches!(self.method, Method::POST | Method::PUT | Method::PATCH) => Some(0),
            None => None,
        };
        if let Some(length) = length {
            self.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        }
        Ok(())
    }

    /// Send the request and wait for the response head.
    ///
    /// Blocks on the client's rate limiter first. The returned response
    /// holds the connection until it is closed or dropped.
    ///
    /// # Errors
    ///
    /// Returns `HttpError` if:
    /// - Request building failed (invalid headers, URL, etc.)
    /// - The URL is not an absolute `http`/`https` URL
    /// - An interceptor rejected the request
    /// - Writing the body or reading the response head failed
    /// - The server answered with a non-2xx status ([`HttpError::Status`])
    pub fn send(mut self) -> Result<HttpResponse, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let url = validate_url(&self.url)?;
        self.prepare_headers()?;

        let client = Arc::clone(&self.client);
        for interceptor in &client.interceptors {
            interceptor.intercept(&mut InterceptedRequest {
                method: &self.method,
                url: &url,
                headers: &mut self.headers,
            })?;
        }

        let waited = client.rate_limiter.acquire();
        tracing::debug!(
            method = %self.method,
            url = %url,
            rate_limit_wait_ms = waited.as_millis(),
            "sending request"
        );

        let connection = client
            .transport
            .open(&Outgoing {
                method: &self.method,
                url: &url,
                headers: &self.headers,
                body: self.body.as_deref(),
                timeout: self.timeout,
            })
            .inspect_err(|e| tracing::debug!(error = %e, url = %url, "request failed"))?;

        HttpResponse::from_connection(
            &self.method,
            Box::new(connection),
            client.max_error_body_size,
        )
    }
}

#[derive(Clone, Copy)]
enum SetMode {
    Replace,
    Append,
    IfAbsent,
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
