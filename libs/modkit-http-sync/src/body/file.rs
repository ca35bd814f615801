use super::RequestBody;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Mapping of file extensions to MIME types
/// Format: `(extension, mime_type)`
const EXTENSION_MIME_MAPPINGS: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("xml", "application/xml"),
    ("json", "application/json"),
    ("js", "text/javascript"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("webp", "image/webp"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
];

fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTENSION_MIME_MAPPINGS
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, mime_type)| *mime_type)
}

/// Request body read from a regular file.
///
/// Every [`stream`](RequestBody::stream) opens the file anew, so the body can
/// be sent repeatedly. The length is the file size when the body was created.
#[derive(Clone, Debug)]
pub struct FileBody {
    path: PathBuf,
    size: u64,
    content_type: Option<String>,
    content_encoding: Option<String>,
}

impl FileBody {
    /// Create a body for the file at `path`.
    ///
    /// The content type is guessed from the file extension and can be
    /// replaced with [`with_content_type`](Self::with_content_type).
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidInput` if `path` is not a regular file, or
    /// the underlying error if its metadata cannot be read.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
            content_type: guess_content_type(path).map(str::to_owned),
            content_encoding: None,
        })
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, used as the multipart `filename`
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
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
}

impl RequestBody for FileBody {
    fn stream(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(BufReader::new(File::open(&self.path)?)))
    }

    fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn length(&self) -> Option<u64> {
        Some(self.size)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::byte_stream::read_to_vec;
    use std::io::Write;

    #[test]
    fn test_file_body_metadata_and_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.JSON");
        fs::File::create(&path)
            .unwrap()
            .write_all(br#"{"ok":true}"#)
            .unwrap();

        let body = FileBody::open(&path).unwrap();
        assert_eq!(body.length(), Some(11));
        assert_eq!(body.content_type(), Some("application/json"));
        assert_eq!(body.file_name(), Some("report.JSON"));

        // each stream starts from the beginning of the file
        for _ in 0..2 {
            assert_eq!(read_to_vec(&mut body.stream().unwrap()).unwrap(), br#"{"ok":true}"#);
        }
    }

    #[test]
    fn test_unknown_extension_has_no_content_type() {
        let mut file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        file.write_all(b"\x00\x01").unwrap();

        let body = FileBody::open(file.path())
            .unwrap()
            .with_content_type("application/octet-stream")
            .with_content_encoding("identity");
        assert_eq!(body.content_type(), Some("application/octet-stream"));
        assert_eq!(body.content_encoding(), Some("identity"));
    }

    #[test]
    fn test_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileBody::open(dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileBody::open(dir.path().join("missing.txt")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
