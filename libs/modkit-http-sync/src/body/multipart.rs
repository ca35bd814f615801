//! `multipart/mixed` and `multipart/form-data` bodies (RFC 2046, RFC 7578).

use super::{ByteArrayBody, RequestBody, sealed};
use crate::case_insensitive::CaseInsensitiveMap;
use crate::error::HttpError;
use std::fmt;
use std::io::{self, Read, Write};

const BOUNDARY_PREFIX: &str = "__END_OF_PART__";
const CRLF: &[u8] = b"\r\n";

/// One body part with its own headers.
pub struct Part {
    headers: CaseInsensitiveMap<String>,
    body: Box<dyn RequestBody>,
}

impl Part {
    /// Wrap `body`, deriving part headers from its metadata.
    ///
    /// In order: `Content-Encoding` and `Content-Length` and `Content-Type`
    /// when the body reports them, then `Content-Transfer-Encoding: binary`.
    #[must_use]
    pub fn new(body: impl RequestBody + 'static) -> Self {
        let mut headers = CaseInsensitiveMap::new();
        if let Some(encoding) = body.content_encoding() {
            headers.insert("Content-Encoding", encoding.to_owned());
        }
        if let Some(length) = body.length() {
            headers.insert("Content-Length", length.to_string());
        }
        if let Some(content_type) = body.content_type() {
            headers.insert("Content-Type", content_type.to_owned());
        }
        headers.insert("Content-Transfer-Encoding", "binary".to_owned());

        Self {
            headers,
            body: Box::new(body),
        }
    }

    /// Add or replace a header; names compare case-insensitively
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value.into());
        self
    }

    #[must_use]
    pub fn headers(&self) -> &CaseInsensitiveMap<String> {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &dyn RequestBody {
        self.body.as_ref()
    }

    /// Delimiter line, header lines and the blank line that precede the body
    fn preamble(&self, boundary: &str) -> Vec<u8> {
        let mut text = format!("--{boundary}\r\n");
        for (name, value) in self.headers.iter() {
            text.push_str(name.unwrap_or_default());
            text.push_str(": ");
            text.push_str(value);
            text.push_str("\r\n");
        }
        text.push_str("\r\n");
        latin1(&text)
    }
}

/// ISO-8859-1 bytes of `text`; characters outside that range become `?`
fn latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| u8::try_from(c).unwrap_or(b'?')).collect()
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("headers", &self.headers)
            .field("length", &self.body.length())
            .finish_non_exhaustive()
    }
}

fn new_boundary() -> String {
    format!("{BOUNDARY_PREFIX}{}", uuid::Uuid::new_v4())
}

/// Builder for `multipart/mixed`, from [`MultipartBody::mixed`]
#[derive(Debug)]
#[must_use]
pub struct MixedBuilder {
    parts: Vec<Part>,
}

impl MixedBuilder {
    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Add `body` as a part with derived headers
    pub fn body(self, body: impl RequestBody + 'static) -> Self {
        self.part(Part::new(body))
    }

    /// # Errors
    ///
    /// Returns [`HttpError::InvalidMultipart`] if no part was added.
    pub fn build(self) -> Result<MultipartBody, HttpError> {
        if self.parts.is_empty() {
            return Err(HttpError::InvalidMultipart(
                "multipart/mixed content must have at least one body part",
            ));
        }
        Ok(MultipartBody::new("multipart/mixed", self.parts))
    }
}

/// Builder for `multipart/form-data`, from [`MultipartBody::form_data`]
#[derive(Debug)]
#[must_use]
pub struct FormDataBuilder {
    parts: Vec<Part>,
}

impl FormDataBuilder {
    /// Add a part as is; it should carry its own `Content-Disposition`
    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Add a named field.
    ///
    /// One pair of surrounding double quotes around `name` is dropped.
    pub fn field(self, name: &str, body: impl RequestBody + 'static) -> Self {
        let name = name
            .strip_prefix('"')
            .and_then(|n| n.strip_suffix('"'))
            .unwrap_or(name);
        let disposition = format!("form-data; name=\"{name}\"");
        self.part(Part::new(body).with_header("Content-Disposition", disposition))
    }

    /// Add a UTF-8 text field
    pub fn text(self, name: &str, value: &str) -> Self {
        let body = ByteArrayBody::encode(value).with_content_type("text/plain; charset=\"UTF-8\"");
        self.field(name, body)
    }

    /// Add a file upload field
    pub fn file(self, name: &str, filename: &str, body: impl RequestBody + 'static) -> Self {
        let disposition = format!("form-data; name=\"{name}\"; filename=\"{filename}\"");
        self.part(Part::new(body).with_header("Content-Disposition", disposition))
    }

    /// # Errors
    ///
    /// Returns [`HttpError::InvalidMultipart`] if no field was added.
    pub fn build(self) -> Result<MultipartBody, HttpError> {
        if self.parts.is_empty() {
            return Err(HttpError::InvalidMultipart(
                "multipart/form-data content must have at least one field",
            ));
        }
        Ok(MultipartBody::new("multipart/form-data", self.parts))
    }
}

/// Write-only multipart body.
///
/// [`stream`](RequestBody::stream) is unsupported; the body is produced by
/// [`write`](RequestBody::write), which writes each part in turn without
/// buffering part bodies. The client sends it through an equivalent lazy
/// reader that opens one part body at a time.
///
/// The boundary is `__END_OF_PART__` followed by a random UUID. Part bodies
/// are not scanned for it.
pub struct MultipartBody {
    boundary: String,
    content_type: String,
    // (preamble, part) pairs, preamble rendered once at build time
    parts: Vec<(Vec<u8>, Part)>,
}

impl MultipartBody {
    pub fn mixed() -> MixedBuilder {
        MixedBuilder { parts: Vec::new() }
    }

    pub fn form_data() -> FormDataBuilder {
        FormDataBuilder { parts: Vec::new() }
    }

    fn new(media_type: &str, parts: Vec<Part>) -> Self {
        let boundary = new_boundary();
        let content_type = format!("{media_type}; boundary=\"{boundary}\"");
        let parts = parts
            .into_iter()
            .map(|part| (part.preamble(&boundary), part))
            .collect();
        Self {
            boundary,
            content_type,
            parts,
        }
    }

    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    #[must_use]
    pub fn parts(&self) -> impl ExactSizeIterator<Item = &Part> {
        self.parts.iter().map(|(_, part)| part)
    }

    fn close_delimiter(&self) -> String {
        format!("--{}--\r\n", self.boundary)
    }
}

impl fmt::Debug for MultipartBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartBody")
            .field("boundary", &self.boundary)
            .field("content_type", &self.content_type)
            .field("parts", &self.parts().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl RequestBody for MultipartBody {
    fn stream(&self) -> io::Result<Box<dyn Read + '_>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "multipart bodies can only be written",
        ))
    }

    fn wire_stream(&self, _: sealed::Token) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(WireReader::new(self)))
    }

    fn write(&self, sink: &mut dyn Write) -> io::Result<()> {
        for (preamble, part) in &self.parts {
            sink.write_all(preamble)?;
            part.body.write(sink)?;
            sink.write_all(CRLF)?;
        }
        sink.write_all(self.close_delimiter().as_bytes())?;
        sink.flush()
    }

    fn content_type(&self) -> Option<&str> {
        Some(&self.content_type)
    }

    /// Exact wire length when every part reports its length
    fn length(&self) -> Option<u64> {
        let mut total = self.close_delimiter().len() as u64;
        for (preamble, part) in &self.parts {
            total += preamble.len() as u64 + part.body.length()? + CRLF.len() as u64;
        }
        Some(total)
    }
}

/// Lazy reader producing the same bytes as [`MultipartBody::write`].
struct WireReader<'a> {
    parts: std::slice::Iter<'a, (Vec<u8>, Part)>,
    close: Option<Vec<u8>>,
    current: Box<dyn Read + 'a>,
}

impl<'a> WireReader<'a> {
    fn new(body: &'a MultipartBody) -> Self {
        Self {
            parts: body.parts.iter(),
            close: Some(body.close_delimiter().into_bytes()),
            current: Box::new(io::empty()),
        }
    }

    /// Switch to the next part, then to the close delimiter. `false` once
    /// both are used up.
    fn advance(&mut self) -> io::Result<bool> {
        if let Some((preamble, part)) = self.parts.next() {
            let body = super::wire_reader(part.body.as_ref())?;
            self.current = Box::new(preamble.as_slice().chain(body).chain(CRLF));
            return Ok(true);
        }
        match self.close.take() {
            Some(close) => {
                self.current = Box::new(io::Cursor::new(close));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Read for WireReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.current.read(buf)?;
            if n > 0 || !self.advance()? {
                return Ok(n);
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::body::{FileBody, GzipEncoding, wire_reader};
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom};

    /// Streamed body with unknown length
    struct Unsized(&'static [u8]);

    impl RequestBody for Unsized {
        fn stream(&self) -> io::Result<Box<dyn Read + '_>> {
            Ok(Box::new(self.0))
        }
    }

    /// Body that can only be written
    struct WriteOnly;

    impl RequestBody for WriteOnly {
        fn stream(&self) -> io::Result<Box<dyn Read + '_>> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "write only"))
        }

        fn write(&self, sink: &mut dyn Write) -> io::Result<()> {
            sink.write_all(b"rendered")
        }
    }

    fn read_in_chunks(reader: &mut dyn Read, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    fn written(body: &MultipartBody) -> String {
        let mut out = Vec::new();
        body.write(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_part_headers_are_derived_in_order() {
        let body =
            GzipEncoding::encode(ByteArrayBody::encode("abc").with_content_type("text/plain"))
                .unwrap();
        let length = body.length().unwrap().to_string();
        let part = Part::new(body);

        let headers: Vec<_> = part.headers().iter().collect();
        assert_eq!(
            headers,
            vec![
                (Some("Content-Encoding"), &"gzip".to_owned()),
                (Some("Content-Length"), &length),
                (Some("Content-Type"), &"text/plain".to_owned()),
                (Some("Content-Transfer-Encoding"), &"binary".to_owned()),
            ]
        );
    }

    #[test]
    fn test_with_header_overrides_case_insensitively() {
        let part = Part::new(ByteArrayBody::encode("x"))
            .with_header("content-transfer-encoding", "8bit");
        assert_eq!(part.headers().len(), 2);
        assert_eq!(
            part.headers()
                .get("Content-Transfer-Encoding")
                .map(String::as_str),
            Some("8bit")
        );
    }

    #[test]
    fn test_mixed_wire_format() {
        let body = MultipartBody::mixed()
            .body(ByteArrayBody::encode("first"))
            .body(ByteArrayBody::encode("second").with_content_type("text/plain"))
            .build()
            .unwrap();
        let b = body.boundary().to_owned();

        assert!(b.starts_with("__END_OF_PART__"));
        assert_eq!(b.len(), "__END_OF_PART__".len() + 36);
        assert_eq!(
            body.content_type(),
            Some(format!("multipart/mixed; boundary=\"{b}\"").as_str())
        );

        let expected = format!(
            "--{b}\r\nContent-Length: 5\r\nContent-Transfer-Encoding: binary\r\n\r\nfirst\r\n\
             --{b}\r\nContent-Length: 6\r\nContent-Type: text/plain\r\n\
             Content-Transfer-Encoding: binary\r\n\r\nsecond\r\n\
             --{b}--\r\n"
        );
        let actual = written(&body);
        assert_eq!(actual, expected);
        assert_eq!(body.length(), Some(expected.len() as u64));
    }

    #[test]
    fn test_form_data_fields() {
        let body = MultipartBody::form_data()
            .text("\"greeting\"", "hello")
            .file("upload", "a.txt", ByteArrayBody::encode("data"))
            .build()
            .unwrap();
        let b = body.boundary().to_owned();

        let expected = format!(
            "--{b}\r\nContent-Length: 5\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\
             Content-Transfer-Encoding: binary\r\n\
             Content-Disposition: form-data; name=\"greeting\"\r\n\r\nhello\r\n\
             --{b}\r\nContent-Length: 4\r\nContent-Transfer-Encoding: binary\r\n\
             Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\r\ndata\r\n\
             --{b}--\r\n"
        );
        assert_eq!(written(&body), expected);
        assert!(
            body.content_type()
                .unwrap()
                .starts_with("multipart/form-data; boundary=\"")
        );
    }

    #[test]
    fn test_boundaries_differ() {
        let a = MultipartBody::mixed()
            .body(ByteArrayBody::encode("a"))
            .build()
            .unwrap();
        let b = MultipartBody::mixed()
            .body(ByteArrayBody::encode("a"))
            .build()
            .unwrap();
        assert_ne!(a.boundary(), b.boundary());
    }

    #[test]
    fn test_unknown_part_length_makes_total_unknown() {
        let body = MultipartBody::mixed()
            .body(ByteArrayBody::encode("a"))
            .body(Unsized(b"streamed"))
            .build()
            .unwrap();
        assert_eq!(body.length(), None);
        assert!(written(&body).contains("\r\n\r\nstreamed\r\n"));
    }

    #[test]
    fn test_stream_is_unsupported() {
        let body = MultipartBody::mixed()
            .body(ByteArrayBody::encode("a"))
            .build()
            .unwrap();
        let err = body.stream().err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn test_empty_builders_fail() {
        let err = MultipartBody::mixed().build().unwrap_err();
        assert!(matches!(
            err,
            HttpError::InvalidMultipart(msg) if msg.contains("at least one body part")
        ));

        let err = MultipartBody::form_data().build().unwrap_err();
        assert!(matches!(
            err,
            HttpError::InvalidMultipart(msg) if msg.contains("at least one field")
        ));
    }

    #[test]
    fn test_wire_reader_matches_write() {
        let nested = MultipartBody::mixed()
            .body(ByteArrayBody::encode("inner"))
            .build()
            .unwrap();
        let body = MultipartBody::mixed()
            .body(ByteArrayBody::encode("first"))
            .body(Unsized(b"streamed"))
            .body(WriteOnly)
            .body(nested)
            .build()
            .unwrap();

        let mut reader = wire_reader(&body).unwrap();
        let wire = String::from_utf8(read_in_chunks(&mut reader, 7)).unwrap();

        assert_eq!(wire, written(&body));
        assert!(wire.contains("\r\n\r\nrendered\r\n"));
        assert_eq!(reader.read(&mut [0u8; 4]).unwrap(), 0);
    }

    #[test]
    fn test_file_part_is_not_buffered() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![b'a'; 64 * 1024]).unwrap();
        file.flush().unwrap();
        let body = MultipartBody::form_data()
            .file("upload", "data.bin", FileBody::open(file.path()).unwrap())
            .build()
            .unwrap();
        let length = body.length().unwrap();

        let mut reader = wire_reader(&body).unwrap();
        let mut head = vec![0u8; 1024];
        reader.read_exact(&mut head).unwrap();

        // only bytes still on disk when the reader gets there can see this
        let mut handle = OpenOptions::new().write(true).open(file.path()).unwrap();
        handle.seek(SeekFrom::Start(32 * 1024)).unwrap();
        handle.write_all(&vec![b'z'; 32 * 1024]).unwrap();
        handle.flush().unwrap();

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        let wire = [head, rest].concat();

        assert_eq!(wire.len() as u64, length);
        assert_eq!(wire.iter().filter(|&&b| b == b'z').count(), 32 * 1024);
    }

    #[test]
    fn test_header_characters_outside_latin1_become_question_marks() {
        let part = Part::new(ByteArrayBody::encode("x")).with_header(
            "Content-Disposition",
            "form-data; name=\"caf\u{e9}\u{4e2d}\u{20ac}\"",
        );
        let body = MultipartBody::mixed().part(part).build().unwrap();

        let mut out = Vec::new();
        body.write(&mut out).unwrap();

        let expected: &[u8] = b"Content-Disposition: form-data; name=\"caf\xe9??\"\r\n";
        assert!(out.windows(expected.len()).any(|window| window == expected));
        assert!(!out.contains(&b'&'));
    }
}
