#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Blocking HTTP client infrastructure for `ModKit`
//!
//! This crate provides a thread-blocking HTTP client for code that cannot
//! run on an async runtime, with:
//! - Connection pooling with a reuse-safe close protocol
//! - Configurable timeouts, redirects, proxy and default headers
//! - Client-wide rate limiting
//! - Request interceptors
//! - Pluggable request bodies: in-memory, file, gzip, urlencoded form and
//!   multipart (`mixed` and `form-data`)
//! - Transparent response decompression (gzip, deflate)
//! - Error responses captured with their decoded payload
//!
//! # Response lifecycle
//!
//! A response holds its connection until [`HttpResponse::close`] is called or
//! the response is dropped. Closing reads one more byte from every opened
//! stream: if the body was fully consumed the connection goes back to the
//! pool, otherwise it is disconnected so the next request never reads stale
//! data.
//!
//! # Example
//!
//! ```ignore
//! use modkit_http_sync::{HttpClient, body::GzipEncoding, body::ByteArrayBody};
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .connect_timeout(Duration::from_secs(5))
//!     .user_agent("my-app/1.0")
//!     .rate_limit(10.0)
//!     .build()?;
//!
//! let mut response = client
//!     .post("https://example.com/api/upload")
//!     .body(GzipEncoding::encode(ByteArrayBody::encode("payload"))?)
//!     .send()?;
//!
//! let text = match response.body() {
//!     Some(body) => body.text()?,
//!     None => String::new(),
//! };
//! response.close()?;
//! ```

pub mod body;
mod builder;
pub mod byte_stream;
mod case_insensitive;
mod client;
mod config;
mod error;
mod media_type;
mod rate_limit;
mod request;
mod response;
mod transport;

pub use body::RequestBody;
pub use builder::HttpClientBuilder;
pub use case_insensitive::{CaseInsensitiveMap, MapKey};
pub use client::HttpClient;
pub use config::{
    BasicAuthConfig, DEFAULT_MAX_ERROR_BODY_SIZE, DEFAULT_USER_AGENT, HttpClientConfig,
};
pub use error::{HttpError, InvalidUriKind, MediaTypeError};
pub use media_type::MediaType;
pub use rate_limit::{RateLimiter, SimpleRateLimiter, UnlimitedRateLimiter};
pub use request::{InterceptedRequest, RequestBuilder, RequestInterceptor};
pub use response::{BodyReader, HttpResponse, HttpResponseError, ResponseBody, default_charset};

// Re-exported so callers can name methods, status codes and charsets
// without depending on the crates directly.
pub use encoding_rs::Encoding;
pub use http::{Method, StatusCode};
