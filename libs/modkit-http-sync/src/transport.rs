//! Blocking connection seam over `ureq`.
//!
//! The rest of the crate only sees [`Connection`]: a response head plus the
//! raw (still content-coded) body or error stream. `ureq` hands a connection
//! back to its pool once a body reader has been read to end of stream;
//! dropping a reader that has not reached it closes the socket instead.

use crate::body::{RequestBody, wire_reader};
use crate::case_insensitive::CaseInsensitiveMap;
use crate::error::HttpError;
use std::io::{self, Read};
use std::time::Duration;

/// Raw response byte stream
pub type ByteStream = Box<dyn Read + Send>;

/// Status line and headers of a received response
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// Final URL after redirects
    pub url: String,
    pub status: http::StatusCode,
    pub reason: String,
    pub status_line: String,
    pub headers: CaseInsensitiveMap<Vec<String>>,
}

/// One request/response exchange on an open connection.
pub trait Connection: Send {
    fn head(&self) -> &ResponseHead;

    /// Body stream of a 2xx response. Can be taken once.
    fn input_stream(&mut self) -> io::Result<ByteStream>;

    /// Body stream of a non-2xx response, if the server sent one
    fn error_stream(&mut self) -> Option<ByteStream>;

    /// Give up on reusing the underlying socket
    fn disconnect(&mut self) -> io::Result<()>;
}

/// Agent-wide settings
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_redirects: u32,
    pub user_agent: String,
    pub proxy: Option<String>,
}

/// A request ready to go on the wire
pub struct Outgoing<'a> {
    pub method: &'a http::Method,
    pub url: &'a url::Url,
    pub headers: &'a http::HeaderMap,
    pub body: Option<&'a dyn RequestBody>,
    pub timeout: Option<Duration>,
}

/// Shared `ureq` agent; cloning shares its connection pool.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(options: &TransportOptions) -> Result<Self, HttpError> {
        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(options.connect_timeout)
            .timeout_read(options.read_timeout)
            .redirects(options.max_redirects)
            .user_agent(&options.user_agent);

        if let Some(proxy) = &options.proxy {
            // ureq is built without SOCKS support
            if let Some((scheme, _)) = proxy.split_once("://")
                && scheme != "http"
            {
                return Err(HttpError::InvalidConfig(format!(
                    "unsupported proxy scheme '{scheme}': only http:// proxies are supported"
                )));
            }
            let proxy = ureq::Proxy::new(proxy)
                .map_err(|e| HttpError::InvalidConfig(format!("invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            agent: builder.build(),
        })
    }

    /// Send `request` and wait for the response head.
    ///
    /// Non-2xx responses are returned as connections too; only failures to
    /// get any response at all are errors.
    pub fn open(&self, request: &Outgoing<'_>) -> Result<UreqConnection, HttpError> {
        let mut call = self.agent.request_url(request.method.as_str(), request.url);
        // `set` replaces, so repeated headers go out as one comma-joined line
        for name in request.headers.keys() {
            let joined = request
                .headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()))
                .collect::<Vec<_>>()
                .join(", ");
            call = call.set(name.as_str(), &joined);
        }
        if let Some(timeout) = request.timeout {
            call = call.timeout(timeout);
        }

        // `Content-Length`, when known, is already set, so `send` only falls
        // back to chunked encoding for bodies of unknown length
        let result = match request.body {
            None => call.call(),
            Some(body) => call.send(wire_reader(body)?),
        };

        match result {
            // unfollowed 3xx responses arrive as `Ok`
            Ok(response) | Err(ureq::Error::Status(_, response)) => {
                Ok(UreqConnection::new(response))
            }
            Err(ureq::Error::Transport(transport)) => Err(transport.into()),
        }
    }
}

pub struct UreqConnection {
    head: ResponseHead,
    response: Option<ureq::Response>,
    failed: bool,
}

impl UreqConnection {
    fn new(response: ureq::Response) -> Self {
        let mut headers = CaseInsensitiveMap::new();
        for name in response.headers_names() {
            if headers.contains_key(&name) {
                continue;
            }
            let values = response.all(&name).into_iter().map(str::to_owned).collect();
            headers.insert(&name, values);
        }

        let status = http::StatusCode::from_u16(response.status())
            .unwrap_or(http::StatusCode::BAD_GATEWAY);
        let failed = !status.is_success();
        let head = ResponseHead {
            url: response.get_url().to_owned(),
            status,
            reason: response.status_text().to_owned(),
            status_line: format!(
                "{} {} {}",
                response.http_version(),
                response.status(),
                response.status_text()
            ),
            headers,
        };

        Self {
            head,
            response: Some(response),
            failed,
        }
    }
}

impl Connection for UreqConnection {
    fn head(&self) -> &ResponseHead {
        &self.head
    }

    fn input_stream(&mut self) -> io::Result<ByteStream> {
        if self.failed {
            return Err(io::Error::other(format!(
                "{} has no input stream",
                self.head.status_line
            )));
        }
        match self.response.take() {
            Some(response) => Ok(Box::new(response.into_reader())),
            None => Err(io::Error::other("response stream already taken or disconnected")),
        }
    }

    fn error_stream(&mut self) -> Option<ByteStream> {
        if !self.failed {
            return None;
        }
        let response = self.response.take()?;
        Some(Box::new(response.into_reader()))
    }

    fn disconnect(&mut self) -> io::Result<()> {
        self.response = None;
        Ok(())
    }
}
