use super::{RequestBody, copy_chunked};
use bytes::Bytes;
use flate2::Compression;
use std::io::{self, Read, Write};
use std::sync::OnceLock;

/// `Content-Encoding` value reported by [`GzipEncoding`]
pub const GZIP: &str = "gzip";

fn compress<B: RequestBody + ?Sized>(body: &B) -> io::Result<Bytes> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), Compression::default());
    let mut input = body.stream()?;
    copy_chunked(&mut input, &mut encoder)?;
    Ok(Bytes::from(encoder.finish()?))
}

/// Gzip-compressing decorator around another [`RequestBody`].
///
/// Two modes:
///
/// - **Buffered** ([`encode`](Self::encode), or after
///   [`materialize`](Self::materialize)): the wrapped body is compressed once
///   into memory. [`length`](RequestBody::length) is the compressed size and
///   the body can be streamed or written any number of times.
/// - **Streaming** ([`streaming`](Self::streaming)): compression happens while
///   the request is sent, so the wire length is unknown up front and the
///   request uses chunked transfer encoding.
///
/// # Length changes after first use
///
/// In streaming mode `length()` returns `None` until the compressed output
/// has been produced once: either a reader from `stream()` was read to end of
/// stream, or `write()` completed. From then on it returns the number of
/// compressed bytes that were produced. Call `materialize()` instead when the
/// length must be known before sending.
///
/// The content type is the wrapped body's; the content encoding is always
/// `gzip`.
#[derive(Debug)]
pub struct GzipEncoding<B> {
    body: B,
    buffer: Option<Bytes>,
    length: OnceLock<u64>,
}

impl<B: RequestBody> GzipEncoding<B> {
    /// Compress `body` into memory right away.
    ///
    /// # Errors
    ///
    /// Returns any error from streaming `body` or compressing it.
    pub fn encode(body: B) -> io::Result<Self> {
        let mut encoding = Self::streaming(body);
        encoding.materialize()?;
        Ok(encoding)
    }

    /// Compress `body` lazily while it is being sent.
    #[must_use]
    pub fn streaming(body: B) -> Self {
        Self {
            body,
            buffer: None,
            length: OnceLock::new(),
        }
    }

    /// Switch to buffered mode, compressing the wrapped body now if needed.
    ///
    /// # Errors
    ///
    /// Returns any error from streaming the wrapped body or compressing it.
    pub fn materialize(&mut self) -> io::Result<()> {
        if self.buffer.is_none() {
            let buffer = compress(&self.body)?;
            self.length = OnceLock::from(buffer.len() as u64);
            self.buffer = Some(buffer);
        }
        Ok(())
    }

    /// `true` once the compressed bytes are held in memory
    #[must_use]
    pub fn is_buffered(&self) -> bool {
        self.buffer.is_some()
    }

    /// The wrapped body
    #[must_use]
    pub fn get_ref(&self) -> &B {
        &self.body
    }

    /// Unwrap the decorator
    #[must_use]
    pub fn into_inner(self) -> B {
        self.body
    }
}

impl<B: RequestBody> RequestBody for GzipEncoding<B> {
    fn stream(&self) -> io::Result<Box<dyn Read + '_>> {
        if let Some(buffer) = &self.buffer {
            return Ok(Box::new(buffer.as_ref()));
        }
        let encoder = flate2::read::GzEncoder::new(self.body.stream()?, Compression::default());
        Ok(Box::new(CountingReader {
            inner: encoder,
            count: 0,
            length: &self.length,
        }))
    }

    fn write(&self, sink: &mut dyn Write) -> io::Result<()> {
        if let Some(buffer) = &self.buffer {
            sink.write_all(buffer)?;
            return sink.flush();
        }
        let mut counter = CountingWriter {
            inner: sink,
            count: 0,
        };
        let mut encoder = flate2::write::GzEncoder::new(&mut counter, Compression::default());
        // a flush here would emit a sync marker into the deflate stream
        self.body.write(&mut IgnoreFlush(&mut encoder))?;
        let counter = encoder.finish()?;
        self.length.get_or_init(|| counter.count);
        counter.inner.flush()
    }

    fn content_encoding(&self) -> Option<&str> {
        Some(GZIP)
    }

    fn content_type(&self) -> Option<&str> {
        self.body.content_type()
    }

    fn length(&self) -> Option<u64> {
        self.length.get().copied()
    }
}

/// Records the total once the compressed stream reaches EOF.
struct CountingReader<'a, R> {
    inner: R,
    count: u64,
    length: &'a OnceLock<u64>,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.length.get_or_init(|| self.count);
        }
        self.count += n as u64;
        Ok(n)
    }
}

struct IgnoreFlush<W>(W);

impl<W: Write> Write for IgnoreFlush<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct CountingWriter<'a> {
    inner: &'a mut dyn Write,
    count: u64,
}

impl Write for CountingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
