use crate::builder::HttpClientBuilder;
use crate::error::HttpError;
use crate::rate_limit::RateLimiter;
use crate::request::{RequestBuilder, RequestInterceptor};
use crate::transport::UreqTransport;
use http::{HeaderMap, HeaderValue, Method};
use std::fmt;
use std::sync::Arc;

/// State shared by a client and every request it creates
pub struct ClientInner {
    pub(crate) transport: UreqTransport,
    pub(crate) default_headers: HeaderMap,
    pub(crate) authorization: Option<HeaderValue>,
    pub(crate) rate_limiter: Arc<dyn RateLimiter>,
    pub(crate) interceptors: Vec<Arc<dyn RequestInterceptor>>,
    pub(crate) max_error_body_size: usize,
}

/// Blocking HTTP client
///
/// Every call blocks the calling thread until the response head has arrived;
/// there are no background threads.
///
/// # Thread Safety
///
/// `HttpClient` is `Clone + Send + Sync`. Clones share the connection pool,
/// the rate limiter and the interceptors, so a single client can be stored
/// and used from many threads at once. Individual requests and responses are
/// owned by one thread at a time.
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::builder()
///     .connect_timeout(Duration::from_secs(5))
///     .rate_limit(10.0)
///     .build()?;
///
/// let mut response = client.get("https://example.com/api").send()?;
/// let text = response.body().map(|body| body.text()).transpose()?;
/// response.close()?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    ///
    /// # Errors
    /// Returns an error if the default configuration cannot be applied
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// Create a builder for configuring the HTTP client
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Create a request builder for an arbitrary method
    ///
    /// The URL must be an absolute `http` or `https` URL with a host. It is
    /// validated by [`RequestBuilder::send`], which reports
    /// [`HttpError::InvalidUri`] or [`HttpError::InvalidScheme`].
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(Arc::clone(&self.inner), method, url.to_owned())
    }

    /// Create a GET request builder
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Create a HEAD request builder; its response never has a body
    pub fn head(&self, url: &str) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    /// Create an OPTIONS request builder
    pub fn options(&self, url: &str) -> RequestBuilder {
        self.request(Method::OPTIONS, url)
    }

    /// Create a TRACE request builder
    pub fn trace(&self, url: &str) -> RequestBuilder {
        self.request(Method::TRACE, url)
    }

    /// Create a POST request builder
    ///
    /// Without a body the request is sent with `Content-Length: 0`.
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Create a PUT request builder
    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Create a PATCH request builder
    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    /// Create a DELETE request builder
    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// The limiter every request of this client passes
    #[must_use]
    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.inner.rate_limiter.as_ref()
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("default_headers", &self.inner.default_headers)
            .field("rate", &self.inner.rate_limiter.rate())
            .field("interceptors", &self.inner.interceptors.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_client_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<HttpClient>();
    }

    #[test]
    fn test_clones_share_state() {
        let client = HttpClient::builder().rate_limit(5.0).build().unwrap();
        let clone = client.clone();
        assert!(Arc::ptr_eq(&client.inner, &clone.inner));
        assert!((clone.rate_limiter().rate() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_method_shortcuts() {
        let client = HttpClient::new().unwrap();
        let debug = format!("{:?}", client.patch("http://localhost/x"));
        assert!(debug.contains("PATCH"));
        let debug = format!("{:?}", client.trace("http://localhost/x"));
        assert!(debug.contains("TRACE"));
    }

    #[test]
    fn test_debug_hides_authorization() {
        let client = HttpClient::builder()
            .basic_auth("user", "secret")
            .build()
            .unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret"));
        assert!(client.inner.authorization.as_ref().unwrap().is_sensitive());
    }
}
