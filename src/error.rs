use std::{error, fmt, io};

/// An error that occurred while editing the debug information of an object.
#[derive(Debug)]
pub struct Error {
    inner: ErrorInner,
}

#[derive(Debug)]
enum ErrorInner {
    Io(io::Error),
    Object(object::read::Error),
    Dwarf(String),
    Config(String),
}

/// The kind of error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An I/O error occurred while reading or writing a file.
    Io(io::ErrorKind),
    /// The object container could not be parsed.
    Object,
    /// The debug information is malformed or uses an unsupported encoding.
    Dwarf,
    /// The supplied configuration is invalid.
    Config,
}

impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            ErrorInner::Io(e) => e.fmt(f),
            ErrorInner::Object(e) => e.fmt(f),
            ErrorInner::Dwarf(e) => f.write_str(e),
            ErrorInner::Config(e) => f.write_str(e),
        }
    }
}

impl error::Error for Error {}

impl Error {
    /// Get the kind of error.
    pub fn kind(&self) -> ErrorKind {
        match &self.inner {
            ErrorInner::Io(e) => ErrorKind::Io(e.kind()),
            ErrorInner::Object(_) => ErrorKind::Object,
            ErrorInner::Dwarf(_) => ErrorKind::Dwarf,
            ErrorInner::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn io(error: io::Error) -> Self {
        Self {
            inner: ErrorInner::Io(error),
        }
    }

    pub(crate) fn object(error: object::read::Error) -> Self {
        Self {
            inner: ErrorInner::Object(error),
        }
    }

    pub(crate) fn dwarf(message: impl Into<String>) -> Self {
        Self {
            inner: ErrorInner::Dwarf(message.into()),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self {
            inner: ErrorInner::Config(message.into()),
        }
    }
}

/// The `Result` type for this library.
pub type Result<T> = std::result::Result<T, Error>;
