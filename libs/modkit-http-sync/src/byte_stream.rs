//! Read-to-completion helpers for blocking byte streams.

use crate::error::HttpError;
use std::io::{self, ErrorKind, Read};

/// Initial buffer size for [`read_to_vec`] and [`read_to_vec_limited`]
pub const INITIAL_BUFFER_SIZE: usize = 8 * 1024;

const MAX_BUFFER_SIZE: usize = isize::MAX.unsigned_abs();

enum ReadError {
    Io(io::Error),
    TooLarge { limit: usize, actual: usize },
}

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> Self {
        ReadError::Io(err)
    }
}

/// Read a single byte, retrying on `Interrupted`. `None` means end of stream.
pub(crate) fn read_byte<R: Read + ?Sized>(reader: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

fn check_limit(total: usize, limit: Option<usize>) -> Result<(), ReadError> {
    if let Some(limit) = limit
        && total > limit
    {
        return Err(ReadError::TooLarge {
            limit,
            actual: total,
        });
    }
    Ok(())
}

/// Fill the buffer, read one byte past it, double on demand.
///
/// The buffer never grows beyond one doubling past the data actually read,
/// and the result is truncated to exactly the bytes read.
fn read_all<R: Read + ?Sized>(reader: &mut R, limit: Option<usize>) -> Result<Vec<u8>, ReadError> {
    let mut buf = vec![0u8; INITIAL_BUFFER_SIZE];
    let mut total = 0;

    loop {
        let mut eof = false;
        while total < buf.len() {
            match reader.read(&mut buf[total..]) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        check_limit(total, limit)?;
        if eof {
            break;
        }

        let Some(byte) = read_byte(reader)? else {
            break;
        };
        if buf.len() == MAX_BUFFER_SIZE {
            return Err(io::Error::new(
                ErrorKind::OutOfMemory,
                "stream exceeds maximum buffer size",
            )
            .into());
        }
        let grown = buf.len().saturating_mul(2).min(MAX_BUFFER_SIZE);
        buf.resize(grown, 0);
        buf[total] = byte;
        total += 1;
        check_limit(total, limit)?;
    }

    buf.truncate(total);
    Ok(buf)
}

/// Read `reader` to end of stream into an exactly sized vector.
///
/// # Errors
///
/// Propagates any I/O error other than `Interrupted`, which is retried.
pub fn read_to_vec<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
    match read_all(reader, None) {
        Ok(bytes) => Ok(bytes),
        Err(ReadError::Io(e)) => Err(e),
        Err(ReadError::TooLarge { .. }) => {
            Err(io::Error::other("unbounded read reported a size limit"))
        }
    }
}

/// Read `reader` to end of stream, failing once more than `max` bytes arrive.
///
/// The limit is checked after every fill burst, so at most one buffer's
/// worth of data past `max` is read before giving up.
///
/// # Errors
///
/// Returns [`HttpError::SizeLimitExceeded`] when the stream is longer than
/// `max`, or [`HttpError::Io`] if reading fails.
pub fn read_to_vec_limited<R: Read + ?Sized>(
    reader: &mut R,
    max: usize,
) -> Result<Vec<u8>, HttpError> {
    read_all(reader, Some(max)).map_err(|e| match e {
        ReadError::Io(e) => HttpError::Io(e),
        ReadError::TooLarge { limit, actual } => HttpError::SizeLimitExceeded { limit, actual },
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Yields at most `chunk` bytes per read and injects an `Interrupted` first.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        chunk: usize,
        interrupted: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(ErrorKind::Interrupted.into());
            }
            let n = buf.len().min(self.chunk);
            self.data.read(&mut buf[..n])
        }
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::ConnectionReset, "reset"))
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| u8::try_from(i % 251).unwrap()).collect()
    }

    #[test]
    fn test_reads_empty_stream() {
        let bytes = read_to_vec(&mut io::empty()).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_exact_sizes_around_buffer_boundaries() {
        for len in [
            1,
            INITIAL_BUFFER_SIZE - 1,
            INITIAL_BUFFER_SIZE,
            INITIAL_BUFFER_SIZE + 1,
            5 * INITIAL_BUFFER_SIZE + 3,
        ] {
            let data = pattern(len);
            let bytes = read_to_vec(&mut Cursor::new(data.clone())).unwrap();
            assert_eq!(bytes, data, "len {len}");
        }
    }

    #[test]
    fn test_capacity_is_one_doubling_at_most() {
        let data = pattern(INITIAL_BUFFER_SIZE + 1);
        let bytes = read_to_vec(&mut Cursor::new(data)).unwrap();
        assert_eq!(bytes.len(), INITIAL_BUFFER_SIZE + 1);
        assert!(bytes.capacity() <= 2 * INITIAL_BUFFER_SIZE);
    }

    #[test]
    fn test_short_reads_and_interrupts() {
        let data = pattern(3 * INITIAL_BUFFER_SIZE);
        let mut reader = Trickle {
            data: Cursor::new(data.clone()),
            chunk: 1000,
            interrupted: false,
        };
        assert_eq!(read_to_vec(&mut reader).unwrap(), data);
    }

    #[test]
    fn test_limit_not_exceeded() {
        let data = pattern(100);
        let bytes = read_to_vec_limited(&mut Cursor::new(data.clone()), 100).unwrap();
        assert_eq!(bytes, data);
    }

    #[test]
    fn test_limit_exceeded_within_first_burst() {
        let err = read_to_vec_limited(&mut Cursor::new(pattern(101)), 100).unwrap_err();
        match err {
            HttpError::SizeLimitExceeded { limit, actual } => {
                assert_eq!(limit, 100);
                assert_eq!(actual, 101);
            }
            other => panic!("expected SizeLimitExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_limit_checked_before_stream_end() {
        // An endless stream must still stop once the limit is crossed.
        let mut endless = io::repeat(7);
        let err = read_to_vec_limited(&mut endless, 3 * INITIAL_BUFFER_SIZE).unwrap_err();
        assert!(matches!(err, HttpError::SizeLimitExceeded { .. }));
    }

    #[test]
    fn test_io_error_is_distinct_from_limit() {
        let err = read_to_vec_limited(&mut Failing, 10).unwrap_err();
        assert!(matches!(err, HttpError::Io(ref e) if e.kind() == ErrorKind::ConnectionReset));

        let err = read_to_vec(&mut Failing).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_read_byte() {
        let mut reader = Cursor::new(vec![42u8]);
        assert_eq!(read_byte(&mut reader).unwrap(), Some(42));
        assert_eq!(read_byte(&mut reader).unwrap(), None);
    }
}
