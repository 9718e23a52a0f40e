use thiserror::Error;

/// Errors from data source operations.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backend supplied fewer bytes than requested.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// The backend accepted fewer bytes than requested.
    #[error("short write: expected {expected} bytes, wrote {actual}")]
    ShortWrite { expected: usize, actual: usize },

    /// The operation is not implemented by this kind of source.
    #[error("{op} is not supported on {kind} sources")]
    NotSupported { op: &'static str, kind: &'static str },

    /// A position or range falls outside the backing buffer.
    #[error("out of bounds: offset {offset}, length {len}, size {size}")]
    OutOfBounds { offset: i64, len: usize, size: u64 },

    /// A type tag read from the stream did not match the expected one.
    #[error("type code mismatch: expected {expected:#010x}, found {found:#010x}")]
    TypeCodeMismatch { expected: u32, found: u32 },

    /// A length-prefixed string exceeds the accepted maximum.
    #[error("string length {len} exceeds limit {max}")]
    StringTooLong { len: usize, max: usize },

    /// String bytes were not valid UTF-8.
    #[error("invalid UTF-8 in string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// An open mode string was not recognized.
    #[error("invalid open mode: {0:?}")]
    InvalidMode(String),

    /// The source has been closed.
    #[error("source is closed")]
    Closed,

    /// I/O error from the underlying file or socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for data source operations.
pub type SourceResult<T> = Result<T, SourceError>;
