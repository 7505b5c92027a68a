//! Error types for the trace store.

use std::path::PathBuf;
use thiserror::Error;

use standard_headers::FieldType;

/// Main error type for trace store operations.
///
/// Expected end-of-data conditions are never reported through this type;
/// readers return `Ok(false)` for those.
#[derive(Error, Debug)]
pub enum Error {
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Destination exists and overwriting was not allowed
    #[error("File already exists: {0}")]
    FileExists(PathBuf),

    /// First five bytes are not a known store magic
    #[error("Not a recognized store file: magic {0:?}")]
    InvalidMagic(String),

    /// Magic is known but the version string is not
    #[error("Unsupported store version: {0:?}")]
    UnsupportedVersion(String),

    /// File header ends before all of its fields were read
    #[error("Truncated file header: {0}")]
    TruncatedHeader(String),

    /// Header decoded but its contents are inconsistent
    #[error("Corrupt file header: {0}")]
    CorruptHeader(String),

    /// Field type does not match an existing or standard definition
    #[error("Header field '{name}' has different type: expected {expected}, got {actual}")]
    FieldTypeMismatch {
        name: String,
        expected: FieldType,
        actual: FieldType,
    },

    /// Field element count does not match an existing definition
    #[error("Header field '{name}' has different number of elements: expected {expected}, got {actual}")]
    ElementCountMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    /// Named field is not in the catalog
    #[error("Header field not found: {0}")]
    FieldNotFound(String),

    /// Attempt to delete one of the always-present system fields
    #[error("Header field '{0}' is mandatory and cannot be deleted")]
    MandatoryField(String),

    /// Input port catalogs cannot be unified without reordering
    #[error("Inconsistent header layout on input port {port}: {detail}")]
    PortConflict { port: usize, detail: String },

    /// Invalid field definition or schema argument
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Call made in a state that does not allow it
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Trace index outside the file
    #[error("Trace index {index} out of bounds (count: {count})")]
    TraceOutOfBounds { index: u64, count: u64 },

    /// Invalid reader/writer option or store configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Trace buffer could not be allocated
    #[error("Cannot allocate {bytes} bytes for trace buffer; reduce the buffered trace count")]
    Allocation { bytes: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Coarse classification of [`Error`] values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad magic, unsupported version, truncated or corrupt header.
    Format,
    /// Catalog collisions, port conflicts, mandatory field deletion.
    Schema,
    /// Programming error: call made without its prerequisites.
    Protocol,
    /// Operating system I/O failure.
    Io,
}

impl Error {
    /// Create a protocol error from a string.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a truncated header error.
    pub fn truncated(msg: impl Into<String>) -> Self {
        Self::TruncatedHeader(msg.into())
    }

    /// Create a corrupt header error.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptHeader(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMagic(_)
            | Self::UnsupportedVersion(_)
            | Self::TruncatedHeader(_)
            | Self::CorruptHeader(_)
            | Self::Utf8(_) => ErrorKind::Format,
            Self::FieldTypeMismatch { .. }
            | Self::ElementCountMismatch { .. }
            | Self::FieldNotFound(_)
            | Self::MandatoryField(_)
            | Self::PortConflict { .. }
            | Self::InvalidSchema(_) => ErrorKind::Schema,
            Self::Protocol(_)
            | Self::TraceOutOfBounds { .. }
            | Self::InvalidConfig(_) => ErrorKind::Protocol,
            Self::FileNotFound(_)
            | Self::FileExists(_)
            | Self::Allocation { .. }
            | Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Result type alias for trace store operations.
pub type Result<T> = std::result::Result<T, Error>;
