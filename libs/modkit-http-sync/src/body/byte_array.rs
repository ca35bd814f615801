use super::RequestBody;
use bytes::Bytes;
use encoding_rs::Encoding;
use std::io::{self, Read, Write};

/// In-memory request body.
///
/// Backed by [`Bytes`], so cloning is cheap and the body can be streamed or
/// written any number of times.
#[derive(Clone, Debug)]
pub struct ByteArrayBody {
    bytes: Bytes,
    content_type: Option<String>,
    content_encoding: Option<String>,
}

impl ByteArrayBody {
    /// Wrap `bytes` as a body with no content type
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
            content_encoding: None,
        }
    }

    /// Body over `length` bytes of `bytes` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidInput` if the range does not fit in `bytes`.
    pub fn slice(bytes: impl Into<Bytes>, offset: usize, length: usize) -> io::Result<Self> {
        let bytes = bytes.into();
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "range {offset}..{offset}+{length} out of bounds for {} bytes",
                        bytes.len()
                    ),
                )
            })?;
        Ok(Self::new(bytes.slice(offset..end)))
    }

    /// UTF-8 encode `text`
    #[must_use]
    pub fn encode(text: &str) -> Self {
        Self::new(text.to_owned().into_bytes())
    }

    /// Encode `text` with `encoding`.
    ///
    /// Characters the encoding cannot represent are written as numeric
    /// character references. UTF-16 labels encode as UTF-8, following the
    /// WHATWG Encoding Standard.
    #[must_use]
    pub fn encode_with(text: &str, encoding: &'static Encoding) -> Self {
        let (encoded, _, _) = encoding.encode(text);
        Self::new(encoded.into_owned())
    }

    /// Set the `Content-Type` reported for this body
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the `Content-Encoding` reported for this body
    #[must_use]
    pub fn with_content_encoding(mut self, content_encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(content_encoding.into());
        self
    }

    /// The body bytes
    #[must_use]
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }
}

impl RequestBody for ByteArrayBody {
    fn stream(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.bytes.as_ref()))
    }

    fn write(&self, sink: &mut dyn Write) -> io::Result<()> {
        sink.write_all(&self.bytes)?;
        sink.flush()
    }

    fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn length(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::byte_stream::read_to_vec;

    #[test]
    fn test_encode_reports_metadata() {
        let body =
            ByteArrayBody::encode("Hello, World!").with_content_type("text/plain; charset=utf-8");

        assert_eq!(body.length(), Some(13));
        assert_eq!(body.content_type(), Some("text/plain; charset=utf-8"));
        assert_eq!(body.content_encoding(), None);
    }

    #[test]
    fn test_stream_is_repeatable() {
        let body = ByteArrayBody::encode("abc");
        for _ in 0..2 {
            assert_eq!(read_to_vec(&mut body.stream().unwrap()).unwrap(), b"abc");
        }
    }

    #[test]
    fn test_slice() {
        let body = ByteArrayBody::slice(&b"0123456789"[..], 2, 3).unwrap();
        assert_eq!(body.as_bytes().as_ref(), b"234");
        assert_eq!(body.length(), Some(3));

        let mut out = Vec::new();
        body.write(&mut out).unwrap();
        assert_eq!(out, b"234");
    }

    #[test]
    fn test_slice_out_of_bounds() {
        let err = ByteArrayBody::slice(&b"0123"[..], 2, 3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        assert!(ByteArrayBody::slice(&b"0123"[..], usize::MAX, 2).is_err());
        assert!(ByteArrayBody::slice(&b"0123"[..], 4, 0).is_ok());
    }

    #[test]
    fn test_encode_with_legacy_encoding() {
        let body = ByteArrayBody::encode_with("caf\u{e9}", encoding_rs::WINDOWS_1252);
        assert_eq!(body.as_bytes().as_ref(), b"caf\xe9");
    }
}
