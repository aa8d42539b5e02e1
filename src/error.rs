//! The error type used throughout this crate.

use std::{fmt, io};

/// An error that occurred while reading or writing a SOM file or archive.
#[derive(Debug)]
pub struct Error {
    inner: ErrorInner,
}

#[derive(Debug)]
enum ErrorInner {
    WrongFormat(&'static str),
    MalformedArchive(String),
    MalformedFixupStream(String),
    BadValue(String),
    NoMemory,
    FileTooBig,
    Io(io::Error),
}

/// The kind of error, for callers that want to distinguish recoverable
/// "try another back-end" failures from everything else.
///
/// Mirrors the taxonomy in the error handling design: `WrongFormat` is not
/// fatal to a caller that tries multiple back-ends in turn; every other
/// kind means the data (or the host) is actually broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The header magic or system id was not recognized as SOM.
    WrongFormat,
    /// An archive (or its LST) was structurally inconsistent.
    MalformedArchive,
    /// The relocation (fixup) byte stream was truncated or used an unknown
    /// opcode or a dangling `R_PREV_FIXUP` reference.
    MalformedFixupStream,
    /// A field was out of its valid range (bad name offset, non-power-of-two
    /// alignment, oversized skip/addend, ...).
    BadValue,
    /// An allocation or size computation overflowed.
    NoMemory,
    /// A computed file size exceeded representable limits.
    FileTooBig,
    /// The underlying I/O operation failed.
    Io(io::ErrorKind),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            ErrorInner::WrongFormat(e) => f.write_str(e),
            ErrorInner::MalformedArchive(e) => write!(f, "malformed archive: {}", e),
            ErrorInner::MalformedFixupStream(e) => write!(f, "malformed fixup stream: {}", e),
            ErrorInner::BadValue(e) => write!(f, "bad value: {}", e),
            ErrorInner::NoMemory => f.write_str("allocation size overflowed"),
            ErrorInner::FileTooBig => f.write_str("file size exceeds representable limits"),
            ErrorInner::Io(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.inner {
            ErrorInner::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    /// Get the kind of error.
    pub fn kind(&self) -> ErrorKind {
        match &self.inner {
            ErrorInner::WrongFormat(_) => ErrorKind::WrongFormat,
            ErrorInner::MalformedArchive(_) => ErrorKind::MalformedArchive,
            ErrorInner::MalformedFixupStream(_) => ErrorKind::MalformedFixupStream,
            ErrorInner::BadValue(_) => ErrorKind::BadValue,
            ErrorInner::NoMemory => ErrorKind::NoMemory,
            ErrorInner::FileTooBig => ErrorKind::FileTooBig,
            ErrorInner::Io(e) => ErrorKind::Io(e.kind()),
        }
    }

    pub(crate) fn wrong_format(message: &'static str) -> Self {
        Error {
            inner: ErrorInner::WrongFormat(message),
        }
    }

    pub(crate) fn malformed_archive(message: impl Into<String>) -> Self {
        Error {
            inner: ErrorInner::MalformedArchive(message.into()),
        }
    }

    pub(crate) fn malformed_fixup_stream(message: impl Into<String>) -> Self {
        Error {
            inner: ErrorInner::MalformedFixupStream(message.into()),
        }
    }

    pub(crate) fn bad_value(message: impl Into<String>) -> Self {
        Error {
            inner: ErrorInner::BadValue(message.into()),
        }
    }

    pub(crate) fn no_memory() -> Self {
        Error {
            inner: ErrorInner::NoMemory,
        }
    }

    pub(crate) fn file_too_big() -> Self {
        Error {
            inner: ErrorInner::FileTooBig,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error {
            inner: ErrorInner::Io(e),
        }
    }
}

/// Extension trait for converting `Option`/`Result<_, ()>` into [`Error`]
/// with a caller-supplied message, used pervasively by the parsing code in
/// [`crate::read`] and [`crate::archive`].
pub(crate) trait ReadError<T> {
    fn read_error(self, message: &'static str) -> Result<T>;
}

impl<T> ReadError<T> for Option<T> {
    fn read_error(self, message: &'static str) -> Result<T> {
        self.ok_or_else(|| Error::bad_value(message))
    }
}

impl<T> ReadError<T> for std::result::Result<T, ()> {
    fn read_error(self, message: &'static str) -> Result<T> {
        self.map_err(|()| Error::bad_value(message))
    }
}

/// The `Result` type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
