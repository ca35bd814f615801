use crate::body::copy_chunked;
use crate::byte_stream::{read_byte, read_to_vec, read_to_vec_limited};
use crate::case_insensitive::CaseInsensitiveMap;
use crate::error::HttpError;
use crate::media_type::MediaType;
use crate::transport::{ByteStream, Connection, ResponseHead};
use bytes::Bytes;
use encoding_rs::Encoding;
use flate2::read::{GzDecoder, ZlibDecoder};
use http::{Method, StatusCode};
use std::fmt;
use std::io::{self, Read, Write};
use std::time::{Duration, SystemTime};

/// Charset used when the response does not declare a known one
#[must_use]
pub fn default_charset() -> &'static Encoding {
    encoding_rs::WINDOWS_1252
}

type Headers = CaseInsensitiveMap<Vec<String>>;

fn first_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers.get(name)?.first().map(String::as_str)
}

fn date_value(headers: &Headers, name: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(first_value(headers, name)?.trim()).ok()
}

/// `Content-Encoding` values the client decodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentCoding {
    Identity,
    /// `gzip` or `x-gzip`
    Gzip,
    /// `deflate`, zlib-wrapped per RFC 9110
    Deflate,
}

impl ContentCoding {
    fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("gzip") || v.eq_ignore_ascii_case("x-gzip") => {
                Self::Gzip
            }
            Some(v) if v.eq_ignore_ascii_case("deflate") => Self::Deflate,
            _ => Self::Identity,
        }
    }
}

/// Decoded view of a raw response stream.
///
/// Borrows the raw stream, which stays registered with its response so the
/// close protocol can still check it for unread bytes.
pub struct BodyReader<'a> {
    inner: Decoded<'a>,
}

enum Decoded<'a> {
    Identity(&'a mut ByteStream),
    Gzip(GzDecoder<&'a mut ByteStream>),
    Deflate(ZlibDecoder<&'a mut ByteStream>),
}

fn decode(stream: &mut ByteStream, coding: ContentCoding) -> BodyReader<'_> {
    let inner = match coding {
        ContentCoding::Identity => Decoded::Identity(stream),
        ContentCoding::Gzip => Decoded::Gzip(GzDecoder::new(stream)),
        ContentCoding::Deflate => Decoded::Deflate(ZlibDecoder::new(stream)),
    };
    BodyReader { inner }
}

impl Read for BodyReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Decoded::Identity(r) => r.read(buf),
            Decoded::Gzip(r) => r.read(buf),
            Decoded::Deflate(r) => r.read(buf),
        }
    }
}

impl fmt::Debug for BodyReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coding = match self.inner {
            Decoded::Identity(_) => ContentCoding::Identity,
            Decoded::Gzip(_) => ContentCoding::Gzip,
            Decoded::Deflate(_) => ContentCoding::Deflate,
        };
        f.debug_struct("BodyReader")
            .field("coding", &coding)
            .finish()
    }
}

/// Response to a request that completed with a 2xx status.
///
/// Non-2xx responses never reach the caller as an `HttpResponse`; they are
/// turned into [`HttpError::Status`] carrying an [`HttpResponseError`].
///
/// # Closing
///
/// The transport only reuses a connection whose body was read to the end.
/// [`close`](Self::close) reads one more byte from every stream handed out by
/// this response: end of stream means the exchange is complete; a byte or a
/// read error means it is not, and the connection is discarded. Dropping
/// an unclosed response runs the same protocol and logs failures.
pub struct HttpResponse {
    connection: Box<dyn Connection>,
    url: String,
    status: StatusCode,
    reason: String,
    status_line: String,
    headers: Headers,
    media_type: Option<MediaType>,
    charset: &'static Encoding,
    content_length: Option<u64>,
    coding: ContentCoding,
    has_body: bool,
    // raw streams handed out so far
    input: Option<ByteStream>,
    error: Option<ByteStream>,
    closed: bool,
}

impl HttpResponse {
    /// Wrap an opened connection, failing on non-2xx statuses.
    ///
    /// For a failure status the error payload is captured (decoded, at most
    /// `max_error_body_size` bytes) and the connection is closed before the
    /// error is returned.
    pub(crate) fn from_connection(
        method: &Method,
        connection: Box<dyn Connection>,
        max_error_body_size: usize,
    ) -> Result<Self, HttpError> {
        let ResponseHead {
            url,
            status,
            reason,
            status_line,
            headers,
        } = connection.head().clone();

        let media_type = first_value(&headers, "Content-Type").and_then(MediaType::try_parse);
        let charset = media_type
            .as_ref()
            .and_then(MediaType::charset)
            .unwrap_or_else(default_charset);
        let content_length =
            first_value(&headers, "Content-Length").and_then(|v| v.trim().parse().ok());
        let coding = ContentCoding::from_header(first_value(&headers, "Content-Encoding"));
        let has_body = *method != Method::HEAD
            && !status.is_informational()
            && status != StatusCode::NO_CONTENT
            && status != StatusCode::NOT_MODIFIED;

        tracing::debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            "received response"
        );

        let response = Self {
            connection,
            url,
            status,
            reason,
            status_line,
            headers,
            media_type,
            charset,
            content_length,
            coding,
            has_body,
            input: None,
            error: None,
            closed: false,
        };

        if status.is_success() {
            Ok(response)
        } else {
            Err(response.into_status_error(max_error_body_size))
        }
    }

    fn into_status_error(mut self, max_error_body_size: usize) -> HttpError {
        let body = self.capture_error_body(max_error_body_size);
        if let Err(e) = self.close_streams() {
            tracing::warn!(error = %e, url = %self.url, "failed to close error response");
        }

        HttpResponseError {
            url: std::mem::take(&mut self.url),
            status: self.status,
            reason: std::mem::take(&mut self.reason),
            status_line: std::mem::take(&mut self.status_line),
            headers: std::mem::take(&mut self.headers),
            charset: self.charset,
            body,
        }
        .into()
    }

    /// Best effort: any failure leaves the payload empty.
    fn capture_error_body(&mut self, max: usize) -> Option<Bytes> {
        let stream = self.connection.error_stream()?;
        let stream = self.error.insert(stream);
        match read_to_vec_limited(&mut decode(stream, self.coding), max) {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    status = self.status.as_u16(),
                    "failed to capture error response body"
                );
                None
            }
        }
    }

    /// Final URL, after any redirects
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Reason phrase as sent by the server
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// e.g. `HTTP/1.1 200 OK`
    #[must_use]
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// All response headers; names compare case-insensitively
    #[must_use]
    pub fn headers(&self) -> &CaseInsensitiveMap<Vec<String>> {
        &self.headers
    }

    /// First value of header `name`
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        first_value(&self.headers, name)
    }

    /// Parsed `Content-Type`, `None` if absent or malformed
    #[must_use]
    pub fn content_type(&self) -> Option<&MediaType> {
        self.media_type.as_ref()
    }

    /// Charset from `Content-Type`, else [`default_charset`]
    #[must_use]
    pub fn charset(&self) -> &'static Encoding {
        self.charset
    }

    /// Raw `Content-Encoding` header
    #[must_use]
    pub fn content_encoding(&self) -> Option<&str> {
        self.header("Content-Encoding")
    }

    /// `Content-Length` as sent, i.e. before content decoding
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    #[must_use]
    pub fn date(&self) -> Option<SystemTime> {
        date_value(&self.headers, "Date")
    }

    #[must_use]
    pub fn expires(&self) -> Option<SystemTime> {
        date_value(&self.headers, "Expires")
    }

    #[must_use]
    pub fn last_modified(&self) -> Option<SystemTime> {
        date_value(&self.headers, "Last-Modified")
    }

    /// `false` for HEAD requests and for 1xx, 204 and 304 responses
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.has_body
    }

    /// The response body, `None` when [`has_body`](Self::has_body) is false
    pub fn body(&mut self) -> Option<ResponseBody<'_>> {
        if self.has_body {
            Some(ResponseBody { response: self })
        } else {
            None
        }
    }

    /// Run the close protocol.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Close`] when the trailing read of a stream or
    /// discarding the connection failed. Every stream is still released;
    /// failures after the first are attached as `suppressed`.
    pub fn close(mut self) -> Result<(), HttpError> {
        self.close_streams()
    }

    /// Release all streams and discard the connection without reading further
    pub fn disconnect(mut self) {
        self.input = None;
        self.error = None;
        self.closed = true;
        if let Err(e) = self.connection.disconnect() {
            tracing::debug!(error = %e, url = %self.url, "disconnect failed");
        }
    }

    fn close_streams(&mut self) -> Result<(), HttpError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut dirty = false;
        let mut failures = Vec::new();
        for slot in [&mut self.input, &mut self.error] {
            let Some(mut stream) = slot.take() else {
                continue;
            };
            match read_byte(&mut stream) {
                Ok(None) => {}
                Ok(Some(_)) => dirty = true,
                Err(e) => {
                    dirty = true;
                    failures.push(e);
                }
            }
            drop(stream);
        }

        if dirty {
            tracing::debug!(url = %self.url, "response not fully consumed, discarding connection");
            if let Err(e) = self.connection.disconnect() {
                failures.push(e);
            }
        }

        let mut failures = failures.into_iter();
        match failures.next() {
            None => Ok(()),
            Some(source) => Err(HttpError::Close {
                source,
                suppressed: failures.collect(),
            }),
        }
    }
}

impl Drop for HttpResponse {
    fn drop(&mut self) {
        if let Err(e) = self.close_streams() {
            tracing::warn!(error = %e, url = %self.url, "failed to close dropped response");
        }
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("url", &self.url)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("has_body", &self.has_body)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Body of an [`HttpResponse`], decoded according to `Content-Encoding`.
///
/// Reading methods consume the `ResponseBody` but not the response; close
/// the response afterwards to release the connection.
#[derive(Debug)]
pub struct ResponseBody<'a> {
    response: &'a mut HttpResponse,
}

impl ResponseBody<'_> {
    /// Decoded reader over the body.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Io`] if the transport cannot provide the stream.
    pub fn reader(&mut self) -> Result<BodyReader<'_>, HttpError> {
        let response = &mut *self.response;
        let stream = match response.input.take() {
            Some(stream) => stream,
            None => response.connection.input_stream()?,
        };
        let stream = response.input.insert(stream);
        Ok(decode(stream, response.coding))
    }

    /// Read the whole decoded body.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Io`] if reading or decoding fails.
    pub fn bytes(mut self) -> Result<Bytes, HttpError> {
        let mut reader = self.reader()?;
        Ok(Bytes::from(read_to_vec(&mut reader)?))
    }

    /// Read the whole decoded body, giving up past `max` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::SizeLimitExceeded`] when the body is longer than
    /// `max`, or [`HttpError::Io`] if reading or decoding fails.
    pub fn bytes_limited(mut self, max: usize) -> Result<Bytes, HttpError> {
        let mut reader = self.reader()?;
        Ok(Bytes::from(read_to_vec_limited(&mut reader, max)?))
    }

    /// Read the body as text in the response charset.
    ///
    /// Malformed sequences are replaced with U+FFFD.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Io`] if reading or decoding fails.
    pub fn text(self) -> Result<String, HttpError> {
        let charset = self.response.charset;
        self.text_with(charset)
    }

    /// Read the body as text in `encoding`, ignoring the declared charset.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Io`] if reading or decoding fails.
    pub fn text_with(self, encoding: &'static Encoding) -> Result<String, HttpError> {
        let bytes = self.bytes()?;
        let (text, _) = encoding.decode_without_bom_handling(&bytes);
        Ok(text.into_owned())
    }

    /// Copy the decoded body into `writer`, returning the number of bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Io`] if reading, decoding or writing fails.
    pub fn copy_to<W: Write + ?Sized>(mut self, writer: &mut W) -> Result<u64, HttpError> {
        let mut reader = self.reader()?;
        Ok(copy_chunked(&mut reader, writer)?)
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&MediaType> {
        self.response.content_type()
    }

    /// Declared (encoded) length
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length
    }

    #[must_use]
    pub fn charset(&self) -> &'static Encoding {
        self.response.charset
    }
}

/// A non-2xx response, detached from its connection.
///
/// The error payload was read when the response arrived, so it stays
/// available after the connection is gone.
#[derive(Debug, Clone)]
pub struct HttpResponseError {
    url: String,
    status: StatusCode,
    reason: String,
    status_line: String,
    headers: Headers,
    charset: &'static Encoding,
    body: Option<Bytes>,
}

impl HttpResponseError {
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    #[must_use]
    pub fn headers(&self) -> &CaseInsensitiveMap<Vec<String>> {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        first_value(&self.headers, name)
    }

    /// Decoded error payload; `None` if it could not be captured
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Error payload as text in the response charset; empty if not captured
    #[must_use]
    pub fn text(&self) -> String {
        let bytes = self.body.as_deref().unwrap_or_default();
        let (text, _) = self.charset.decode_without_bom_handling(bytes);
        text.into_owned()
    }

    /// `Retry-After` as a delay from now.
    ///
    /// Accepts delta-seconds or an HTTP-date; `None` if absent, malformed or
    /// already in the past.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        let value = self.header("Retry-After")?.trim();
        if let Ok(seconds) = value.parse::<u64>() {
            return Some(Duration::from_secs(seconds));
        }
        httpdate::parse_http_date(value)
            .ok()?
            .duration_since(SystemTime::now())
            .ok()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::transport::mock::{MockConnection, MockStream};
    use flate2::Compression;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn open(
        method: &Method,
        connection: MockConnection,
    ) -> (Result<HttpResponse, HttpError>, Arc<AtomicBool>) {
        let disconnected = Arc::clone(&connection.disconnected);
        let result = HttpResponse::from_connection(method, Box::new(connection), 1024);
        (result, disconnected)
    }

    fn gzip_compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn ok_response(headers: &[(&str, &str)], body: &[u8]) -> (HttpResponse, Arc<AtomicBool>) {
        let connection =
            MockConnection::new(200, headers, Some(MockStream::Bytes(body.to_vec())));
        let (result, disconnected) = open(&Method::GET, connection);
        (result.unwrap(), disconnected)
    }

    #[test]
    fn test_fully_read_body_closes_cleanly() {
        let (mut response, disconnected) =
            ok_response(&[("Content-Type", "text/plain; charset=utf-8")], b"hello");

        assert_eq!(response.body().unwrap().text().unwrap(), "hello");
        response.close().unwrap();
        assert!(!disconnected.load(Ordering::SeqCst));
    }

    #[test]
    fn test_partially_read_body_disconnects() {
        let (mut response, disconnected) = ok_response(&[], b"hello world");

        {
            let mut body = response.body().unwrap();
            let mut reader = body.reader().unwrap();
            let mut buf = [0u8; 5];
            reader.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"hello");
        }

        response.close().unwrap();
        assert!(disconnected.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unopened_body_is_not_read_on_close() {
        let (response, disconnected) = ok_response(&[], b"ignored");
        response.close().unwrap();
        assert!(!disconnected.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_runs_close_protocol() {
        let (mut response, disconnected) = ok_response(&[], b"abc");
        {
            let mut body = response.body().unwrap();
            let mut byte = [0u8; 1];
            body.reader().unwrap().read_exact(&mut byte).unwrap();
        }
        drop(response);
        assert!(disconnected.load(Ordering::SeqCst));
    }

    #[test]
    fn test_trailing_read_failure_is_reported_and_disconnects() {
        let connection =
            MockConnection::new(200, &[], Some(MockStream::FailAfter(b"data".to_vec())));
        let (result, disconnected) = open(&Method::GET, connection);
        let mut response = result.unwrap();

        let mut buf = [0u8; 4];
        response
            .body()
            .unwrap()
            .reader()
            .unwrap()
            .read_exact(&mut buf)
            .unwrap();

        let err = response.close().unwrap_err();
        match err {
            HttpError::Close { source, suppressed } => {
                assert_eq!(source.kind(), io::ErrorKind::ConnectionReset);
                assert!(suppressed.is_empty());
            }
            other => panic!("expected Close, got {other:?}"),
        }
        assert!(disconnected.load(Ordering::SeqCst));
    }

    #[test]
    fn test_disconnect_failure_is_suppressed_behind_read_failure() {
        let connection =
            MockConnection::new(200, &[], Some(MockStream::FailAfter(b"data".to_vec())))
                .with_failing_disconnect();
        let (result, disconnected) = open(&Method::GET, connection);
        let mut response = result.unwrap();

        let mut buf = [0u8; 4];
        response
            .body()
            .unwrap()
            .reader()
            .unwrap()
            .read_exact(&mut buf)
            .unwrap();

        let err = response.close().unwrap_err();
        match err {
            HttpError::Close { source, suppressed } => {
                assert_eq!(source.kind(), io::ErrorKind::ConnectionReset);
                assert_eq!(suppressed.len(), 1);
                assert_eq!(suppressed[0].kind(), io::ErrorKind::BrokenPipe);
            }
            other => panic!("expected Close, got {other:?}"),
        }
        assert!(disconnected.load(Ordering::SeqCst));
    }

    #[test]
    fn test_disconnect_failure_alone_is_reported() {
        let connection = MockConnection::new(200, &[], Some(MockStream::Bytes(b"abc".to_vec())))
            .with_failing_disconnect();
        let (result, _) = open(&Method::GET, connection);
        let mut response = result.unwrap();

        let mut byte = [0u8; 1];
        response
            .body()
            .unwrap()
            .reader()
            .unwrap()
            .read_exact(&mut byte)
            .unwrap();

        match response.close().unwrap_err() {
            HttpError::Close { source, suppressed } => {
                assert_eq!(source.kind(), io::ErrorKind::BrokenPipe);
                assert!(suppressed.is_empty());
            }
            other => panic!("expected Close, got {other:?}"),
        }
    }

    #[test]
    fn test_drop_logs_close_failure() {
        use std::sync::Mutex;
        use tracing_subscriber::layer::SubscriberExt;

        #[derive(Clone, Default)]
        struct WarningCapture {
            warnings: Arc<Mutex<Vec<String>>>,
        }

        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarningCapture {
            fn on_event(
                &self,
                event: &tracing::Event<'_>,
                _ctx: tracing_subscriber::layer::Context<'_, S>,
            ) {
                if *event.metadata().level() == tracing::Level::WARN {
                    let mut visitor = MessageVisitor(String::new());
                    event.record(&mut visitor);
                    self.warnings.lock().unwrap().push(visitor.0);
                }
            }
        }

        struct MessageVisitor(String);
        impl tracing::field::Visit for MessageVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
        }

        let capture = WarningCapture::default();
        let warnings = Arc::clone(&capture.warnings);
        let subscriber = tracing_subscriber::registry().with(capture);

        tracing::subscriber::with_default(subscriber, || {
            let connection =
                MockConnection::new(200, &[], Some(MockStream::FailAfter(b"data".to_vec())));
            let (result, _) = open(&Method::GET, connection);
            let mut response = result.unwrap();
            let mut buf = [0u8; 4];
            response
                .body()
                .unwrap()
                .reader()
                .unwrap()
                .read_exact(&mut buf)
                .unwrap();
            drop(response);
        });

        let captured = warnings.lock().unwrap();
        assert!(
            captured
                .iter()
                .any(|w| w.contains("failed to close dropped response")),
            "expected a close warning, got: {:?}",
            *captured
        );
    }

    #[test]
    fn test_gzip_body_is_decoded() {
        let (mut response, disconnected) = ok_response(
            &[("Content-Encoding", "x-gzip")],
            &gzip_compress(b"compressed payload"),
        );
        assert_eq!(response.body().unwrap().bytes().unwrap().as_ref(), b"compressed payload");
        response.close().unwrap();
        assert!(!disconnected.load(Ordering::SeqCst));
    }

    #[test]
    fn test_deflate_body_is_decoded() {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"deflated").unwrap();
        let (mut response, _) =
            ok_response(&[("content-encoding", "Deflate")], &encoder.finish().unwrap());

        let mut out = Vec::new();
        let copied = response.body().unwrap().copy_to(&mut out).unwrap();
        assert_eq!(copied, 8);
        assert_eq!(out, b"deflated");
    }

    #[test]
    fn test_default_charset_is_latin1_compatible() {
        let (mut response, _) = ok_response(&[("Content-Type", "text/plain")], b"caf\xe9");
        assert_eq!(response.charset(), encoding_rs::WINDOWS_1252);
        assert_eq!(response.body().unwrap().text().unwrap(), "caf\u{e9}");
    }

    #[test]
    fn test_declared_charset_is_used() {
        let (mut response, _) =
            ok_response(&[("Content-Type", "text/plain; charset=UTF-8")], b"caf\xc3\xa9");
        assert_eq!(response.charset(), encoding_rs::UTF_8);
        assert_eq!(response.content_type().unwrap().essence(), "text/plain");
        assert_eq!(response.body().unwrap().text().unwrap(), "caf\u{e9}");
    }

    #[test]
    fn test_bytes_limited() {
        let (mut response, _) = ok_response(&[], &[7u8; 100]);
        let err = response.body().unwrap().bytes_limited(10).unwrap_err();
        assert!(matches!(err, HttpError::SizeLimitExceeded { limit: 10, .. }));
    }

    #[test]
    fn test_no_body_cases() {
        let connection = MockConnection::new(
            200,
            &[("Content-Length", "42")],
            Some(MockStream::Bytes(Vec::new())),
        );
        let (result, _) = open(&Method::HEAD, connection);
        let mut response = result.unwrap();
        assert!(!response.has_body());
        assert!(response.body().is_none());
        assert_eq!(response.content_length(), Some(42));

        let connection = MockConnection::new(204, &[], None);
        let (result, _) = open(&Method::DELETE, connection);
        assert!(result.unwrap().body().is_none());
    }

    #[test]
    fn test_headers_and_dates() {
        let (response, _) = ok_response(
            &[
                ("Date", "Sun, 06 Nov 1994 08:49:37 GMT"),
                ("Set-Cookie", "a=1"),
                ("set-cookie", "b=2"),
                ("Last-Modified", "not a date"),
            ],
            b"",
        );

        assert_eq!(
            response.date(),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(784_111_777))
        );
        assert_eq!(response.last_modified(), None);
        assert_eq!(response.expires(), None);
        assert_eq!(
            response.headers().get("SET-COOKIE").unwrap(),
            &vec!["a=1".to_owned(), "b=2".to_owned()]
        );
        assert_eq!(response.header("set-cookie"), Some("a=1"));
        assert_eq!(response.status_line(), "HTTP/1.1 200 OK");
        assert_eq!(response.url(), "http://localhost/test");
    }

    #[test]
    fn test_error_status_captures_gzip_body() {
        let json = br#"{"error":"not found","code":404}"#;
        let connection = MockConnection::new(
            404,
            &[("Content-Type", "application/json; charset=utf-8"), ("Content-Encoding", "gzip")],
            Some(MockStream::Bytes(gzip_compress(json))),
        );
        let (result, disconnected) = open(&Method::GET, connection);

        let err = result.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.to_string(), "HTTP/1.1 404 Not Found");

        let response = err.as_response_error().unwrap();
        assert_eq!(response.body().unwrap().as_ref(), json);
        assert_eq!(response.text().as_bytes(), json);
        assert_eq!(response.reason(), "Not Found");
        assert_eq!(response.header("content-encoding"), Some("gzip"));
        assert!(!disconnected.load(Ordering::SeqCst));
    }

    #[test]
    fn test_oversized_error_body_is_dropped_and_disconnects() {
        let connection =
            MockConnection::new(500, &[], Some(MockStream::Bytes(vec![b'x'; 64 * 1024])));
        let (result, disconnected) = open(&Method::POST, connection);

        let err = result.unwrap_err();
        let response = err.as_response_error().unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body().is_none());
        assert_eq!(response.text(), "");
        assert!(disconnected.load(Ordering::SeqCst));
    }

    #[test]
    fn test_error_without_stream() {
        let connection = MockConnection::new(503, &[("Retry-After", "120")], None);
        let (result, _) = open(&Method::GET, connection);

        let err = result.unwrap_err();
        let response = err.as_response_error().unwrap();
        assert!(response.body().is_none());
        assert_eq!(response.retry_after(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_retry_after_in_the_past() {
        let connection =
            MockConnection::new(429, &[("Retry-After", "Sun, 06 Nov 1994 08:49:37 GMT")], None);
        let (result, _) = open(&Method::GET, connection);
        assert_eq!(
            result
                .unwrap_err()
                .as_response_error()
                .unwrap()
                .retry_after(),
            None
        );
    }

    #[test]
    fn test_disconnect_skips_trailing_read() {
        let (mut response, disconnected) = ok_response(&[], b"abc");
        let mut byte = [0u8; 1];
        response
            .body()
            .unwrap()
            .reader()
            .unwrap()
            .read_exact(&mut byte)
            .unwrap();
        response.disconnect();
        assert!(disconnected.load(Ordering::SeqCst));
    }
}
