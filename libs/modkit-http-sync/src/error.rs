use crate::response::HttpResponseError;
use thiserror::Error;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
}

/// A content type string that does not follow `type/subtype; name=value` grammar.
///
/// `index` is the byte offset in `input` where parsing stopped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}: '{}' (at index {index})", self.remainder())]
pub struct MediaTypeError {
    pub(crate) input: String,
    pub(crate) index: usize,
    pub(crate) reason: &'static str,
}

impl MediaTypeError {
    pub(crate) fn new(input: &str, index: usize, reason: &'static str) -> Self {
        Self {
            input: input.to_owned(),
            index,
            reason,
        }
    }

    /// The full string that failed to parse
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Byte offset of the offending substring
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Human-readable description of what was expected
    #[must_use]
    pub fn reason(&self) -> &'static str {
        self.reason
    }

    /// The unparsed tail of the input, starting at [`index`](Self::index)
    #[must_use]
    pub fn remainder(&self) -> &str {
        self.input.get(self.index..).unwrap_or_default()
    }
}

/// HTTP client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Content type could not be parsed
    #[error("Invalid media type: {0}")]
    InvalidMediaType(#[from] MediaTypeError),

    /// A bounded read saw more bytes than allowed
    #[error("Size limit exceeded: limit {limit} bytes, read at least {actual} bytes")]
    SizeLimitExceeded { limit: usize, actual: usize },

    /// Server answered with a non-2xx status.
    ///
    /// The boxed value carries status, headers, origin URL and the captured
    /// error payload, so no live connection is needed to inspect it.
    #[error("{}", .0.status_line())]
    Status(Box<HttpResponseError>),

    /// I/O failure while writing the request or reading the response
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport error (network, connection, DNS, TLS, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// One or more streams failed while closing a response.
    ///
    /// `source` is the first failure; every later one is kept in `suppressed`.
    #[error("Failed to close response: {source} ({} suppressed)", suppressed.len())]
    Close {
        #[source]
        source: std::io::Error,
        suppressed: Vec<std::io::Error>,
    },

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// URL scheme other than `http` or `https`
    #[error("URL scheme '{scheme}' not allowed: only http:// and https:// are supported")]
    InvalidScheme {
        /// The URL scheme that was rejected
        scheme: String,
    },

    /// Client configuration rejected at build time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Multipart body without any parts
    #[error("Invalid multipart body: {0}")]
    InvalidMultipart(&'static str),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),
}

impl HttpError {
    /// The response error when this is a non-2xx status failure
    #[must_use]
    pub fn as_response_error(&self) -> Option<&HttpResponseError> {
        match self {
            HttpError::Status(response) => Some(response),
            _ => None,
        }
    }

    /// Status code of a non-2xx failure
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        self.as_response_error().map(HttpResponseError::status)
    }
}

impl From<HttpResponseError> for HttpError {
    fn from(err: HttpResponseError) -> Self {
        HttpError::Status(Box::new(err))
    }
}

impl From<ureq::Transport> for HttpError {
    fn from(err: ureq::Transport) -> Self {
        HttpError::Transport(Box::new(err))
    }
}
