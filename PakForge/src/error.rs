//! Error types for `pakforge`

use thiserror::Error;

/// The error type for `pakforge` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// IO error from file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ==================== Buffer Errors ====================
    /// A read or write would go past the end of a [`ByteBuffer`](crate::buffer::ByteBuffer).
    ///
    /// Reads and writes never partially apply; callers are expected to
    /// bounds-check before invoking, as the format codecs do.
    #[error("buffer access out of bounds: offset {offset} + len {len} > size {size}")]
    BufferOverrun {
        /// The cursor or range offset that was requested.
        offset: usize,
        /// The requested length in bytes.
        len: usize,
        /// The current buffer size.
        size: usize,
    },

    // ==================== Container Format Errors ====================
    /// The data does not carry this format's magic signature.
    ///
    /// Always recoverable: a format-detection chain treats this as
    /// "not this format" and tries the next codec.
    #[error("invalid archive magic: expected {expected}")]
    FormatMismatch {
        /// The magic signature the codec expected, as ASCII.
        expected: &'static str,
    },

    /// The directory geometry is inconsistent or a record points outside
    /// the archive. The open is aborted wholesale; no partial tree is valid.
    #[error("archive is invalid or corrupt: {reason}")]
    Corrupt {
        /// Description of the inconsistency.
        reason: String,
    },

    /// No registered container format recognized the data.
    #[error("no known archive format matches the data")]
    UnknownFormat,

    /// The serialized archive would exceed the 32-bit offsets the wire
    /// format can express.
    #[error("archive too large to serialize: {size} bytes")]
    TooLarge {
        /// The computed total size in bytes.
        size: u64,
    },

    // ==================== Entry Errors ====================
    /// No entry exists at the given path in the archive tree.
    #[error("entry not found: {path}")]
    EntryNotFound {
        /// The path that was looked up.
        path: String,
    },

    /// A lazy load was requested but the archive has no backing file
    /// to read from.
    #[error("no backing file to load entry data from")]
    NoBackingFile,
}

/// A specialized Result type for `pakforge` operations.
pub type Result<T> = std::result::Result<T, Error>;
