//! Request bodies.
//!
//! A [`RequestBody`] either hands out a reader over its bytes or writes itself
//! to a sink. Concrete bodies: [`ByteArrayBody`] (in-memory), [`FileBody`]
//! (re-read from disk per send), [`GzipEncoding`] (compressing decorator),
//! [`MultipartBody`] (write-only) and the urlencoded [`FormBuilder`].

mod byte_array;
mod file;
mod form;
mod gzip;
mod multipart;

pub use byte_array::ByteArrayBody;
pub use file::FileBody;
pub use form::FormBuilder;
pub use gzip::GzipEncoding;
pub use multipart::{FormDataBuilder, MixedBuilder, MultipartBody, Part};

use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;

/// Chunk size used by the default [`RequestBody::write`]
pub const WRITE_CHUNK_SIZE: usize = 8 * 1024;

mod sealed {
    /// Only this crate can name or build it, so only this crate can call
    /// [`RequestBody::wire_stream`](super::RequestBody::wire_stream).
    #[derive(Debug, Clone, Copy)]
    pub struct Token;
}

/// Payload of an outgoing request.
///
/// Only [`stream`](Self::stream) is required. Whether a body can be streamed
/// more than once depends on the implementation; callers must not assume it
/// unless the concrete type documents it.
///
/// `content_encoding`, `content_type` and `length` describe the bytes as
/// they go on the wire; `None` means unknown and the request falls back to
/// chunked transfer encoding.
pub trait RequestBody: Send + Sync {
    /// Reader over the body bytes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the source cannot be opened, or
    /// `ErrorKind::Unsupported` for write-only bodies.
    fn stream(&self) -> io::Result<Box<dyn Read + '_>>;

    /// Write the body to `sink`.
    ///
    /// The default copies [`stream`](Self::stream) in [`WRITE_CHUNK_SIZE`]
    /// chunks, releases the reader and flushes `sink`. The sink itself is
    /// left open.
    ///
    /// # Errors
    ///
    /// Propagates any error from reading the body or writing the sink.
    fn write(&self, sink: &mut dyn Write) -> io::Result<()> {
        let mut input = self.stream()?;
        copy_chunked(&mut input, sink)?;
        drop(input);
        sink.flush()
    }

    /// Reader over the bytes as they go on the wire.
    ///
    /// Defaults to [`stream`](Self::stream). Write-only bodies of this crate
    /// override it with a lazy reader so the client never has to render
    /// them in memory.
    #[doc(hidden)]
    fn wire_stream(&self, _: sealed::Token) -> io::Result<Box<dyn Read + '_>> {
        self.stream()
    }

    /// Value for the `Content-Encoding` header
    fn content_encoding(&self) -> Option<&str> {
        None
    }

    /// Value for the `Content-Type` header
    fn content_type(&self) -> Option<&str> {
        None
    }

    /// Exact number of bytes [`write`](Self::write) produces, if known
    fn length(&self) -> Option<u64> {
        None
    }
}

/// Copy `reader` into `writer` in [`WRITE_CHUNK_SIZE`] chunks, returning the
/// number of bytes copied.
pub(crate) fn copy_chunked<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; WRITE_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}

/// Reader over the wire bytes of `body`.
///
/// Bodies with neither a reader nor a lazy wire form are rendered through
/// [`RequestBody::write`] into memory.
pub(crate) fn wire_reader(body: &dyn RequestBody) -> io::Result<Box<dyn Read + '_>> {
    match body.wire_stream(sealed::Token) {
        Err(e) if e.kind() == ErrorKind::Unsupported => {
            let mut buffer = Vec::new();
            body.write(&mut buffer)?;
            Ok(Box::new(io::Cursor::new(buffer)))
        }
        other => other,
    }
}

macro_rules! forward_request_body {
    ($($ty:ty),+) => {$(
        impl<T: RequestBody + ?Sized> RequestBody for $ty {
            fn stream(&self) -> io::Result<Box<dyn Read + '_>> {
                (**self).stream()
            }

            fn write(&self, sink: &mut dyn Write) -> io::Result<()> {
                (**self).write(sink)
            }

            fn wire_stream(&self, token: sealed::Token) -> io::Result<Box<dyn Read + '_>> {
                (**self).wire_stream(token)
            }

            fn content_encoding(&self) -> Option<&str> {
                (**self).content_encoding()
            }

            fn content_type(&self) -> Option<&str> {
                (**self).content_type()
            }

            fn length(&self) -> Option<u64> {
                (**self).length()
            }
        }
    )+};
}

forward_request_body!(Box<T>, Arc<T>, &T);

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    /// Body that only implements the required method.
    struct Minimal(Vec<u8>);

    impl RequestBody for Minimal {
        fn stream(&self) -> io::Result<Box<dyn Read + '_>> {
            Ok(Box::new(self.0.as_slice()))
        }
    }

    struct FlushCounter {
        out: Vec<u8>,
        flushes: usize,
    }

    impl Write for FlushCounter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.out.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_default_metadata_is_unknown() {
        let body = Minimal(b"abc".to_vec());
        assert_eq!(body.content_encoding(), None);
        assert_eq!(body.content_type(), None);
        assert_eq!(body.length(), None);
    }

    #[test]
    fn test_default_write_copies_and_flushes() {
        let data: Vec<u8> = (0..3 * WRITE_CHUNK_SIZE + 17)
            .map(|i| u8::try_from(i % 7).unwrap())
            .collect();
        let body = Minimal(data.clone());
        let mut sink = FlushCounter {
            out: Vec::new(),
            flushes: 0,
        };

        body.write(&mut sink).unwrap();

        assert_eq!(sink.out, data);
        assert_eq!(sink.flushes, 1);
    }

    #[test]
    fn test_boxed_and_shared_bodies_forward() {
        let boxed: Box<dyn RequestBody> =
            Box::new(ByteArrayBody::encode("hi").with_content_type("text/plain"));
        assert_eq!(boxed.content_type(), Some("text/plain"));
        assert_eq!(boxed.length(), Some(2));

        let shared = Arc::new(ByteArrayBody::encode("hi"));
        let mut out = Vec::new();
        RequestBody::write(&shared, &mut out).unwrap();
        assert_eq!(out, b"hi");
    }
}
