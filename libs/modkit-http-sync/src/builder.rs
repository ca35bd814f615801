use crate::client::{ClientInner, HttpClient};
use crate::config::{BasicAuthConfig, HttpClientConfig};
use crate::error::HttpError;
use crate::rate_limit::{RateLimiter, SimpleRateLimiter, UnlimitedRateLimiter};
use crate::request::{RequestInterceptor, basic_authorization};
use crate::transport::{TransportOptions, UreqTransport};
use http::{HeaderMap, HeaderName, HeaderValue};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;

/// Builder for constructing an [`HttpClient`]
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            rate_limiter: None,
            interceptors: Vec::new(),
        }
    }

    /// Set the timeout for establishing connections
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the timeout for each socket read
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Follow 3xx redirects, up to [`max_redirects`](Self::max_redirects)
    #[must_use]
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the maximum number of redirects to follow
    ///
    /// Set to `0` to disable redirect following; 3xx responses then fail
    /// with [`HttpError::Status`] like any other non-2xx status.
    #[must_use]
    pub fn max_redirects(mut self, max_redirects: u32) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    /// Set the user agent string
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a header sent with every request unless the request sets it.
    ///
    /// Replaces an earlier default of the same name (case-insensitively).
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.config
            .default_headers
            .retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        self.config.default_headers.insert(name, value.into());
        self
    }

    /// Route all requests through an HTTP proxy, e.g. `http://proxy:3128`.
    ///
    /// Other proxy schemes are rejected by [`build`](Self::build).
    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    /// Send `Authorization: Basic` with every request
    #[must_use]
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.basic_auth = Some(BasicAuthConfig::new(username, password));
        self
    }

    /// Limit requests to `permits_per_second`, validated by [`build`](Self::build)
    #[must_use]
    pub fn rate_limit(mut self, permits_per_second: f64) -> Self {
        self.config.rate_limit = Some(permits_per_second);
        self
    }

    /// Use a custom rate limiter; takes precedence over [`rate_limit`](Self::rate_limit)
    #[must_use]
    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Register an interceptor run on every request, after earlier ones
    #[must_use]
    pub fn interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Set the maximum decoded size of captured error payloads
    #[must_use]
    pub fn max_error_body_size(mut self, size: usize) -> Self {
        self.config.max_error_body_size = size;
        self
    }

    /// Build the HTTP client
    ///
    /// # Errors
    /// Returns [`HttpError::InvalidConfig`] for a bad rate or proxy, or a
    /// header error for default headers or credentials that are not valid
    /// header values
    pub fn build(self) -> Result<HttpClient, HttpError> {
        let config = self.config;

        let transport = UreqTransport::new(&TransportOptions {
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            max_redirects: config.effective_redirects(),
            user_agent: config.user_agent.clone(),
            proxy: config.proxy.clone(),
        })?;

        let mut default_headers = HeaderMap::with_capacity(config.default_headers.len());
        for (name, value) in &config.default_headers {
            default_headers.insert(
                HeaderName::try_from(name.as_str())?,
                HeaderValue::try_from(value.as_str())?,
            );
        }

        let authorization = config
            .basic_auth
            .as_ref()
            .map(|auth| basic_authorization(&auth.username, auth.password.expose_secret()))
            .transpose()?;

        let rate_limiter: Arc<dyn RateLimiter> = match (self.rate_limiter, config.rate_limit) {
            (Some(limiter), _) => limiter,
            (None, Some(rate)) => Arc::new(SimpleRateLimiter::new(rate)?),
            (None, None) => Arc::new(UnlimitedRateLimiter),
        };

        tracing::debug!(
            connect_timeout = ?config.connect_timeout,
            read_timeout = ?config.read_timeout,
            redirects = config.effective_redirects(),
            rate = rate_limiter.rate(),
            proxy = config.proxy.is_some(),
            "built blocking HTTP client"
        );

        Ok(HttpClient {
            inner: Arc::new(ClientInner {
                transport,
                default_headers,
                authorization,
                rate_limiter,
                interceptors: self.interceptors,
                max_error_body_size: config.max_error_body_size,
            }),
        })
    }
}
