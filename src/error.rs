//! Error types for the Reliquary library.
//!
//! All fallible operations in this crate return [`ReliquaryError`] through the
//! [`Result`] alias. Decode and parse failures are never downgraded or
//! defaulted; they carry enough context (snapshot/index/shard identifiers,
//! byte offsets) to diagnose a bad repository without re-running with extra
//! instrumentation.

use std::io;

use thiserror::Error;

/// The main error type for Reliquary operations.
#[derive(Error, Debug)]
pub enum ReliquaryError {
    /// I/O errors (reading repository files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A version string could not be parsed into a known flavor + number.
    #[error("Invalid version string: {0}")]
    InvalidVersionString(String),

    /// Whole-file checksum mismatch. Fatal corruption; nothing after the
    /// checksum gate is attempted.
    #[error("Corrupt metadata in {context}: checksum mismatch (expected {expected:#010x}, actual {actual:#010x})")]
    CorruptMetadata {
        /// What was being decoded (blob path or logical identifier).
        context: String,
        /// Checksum recorded in the blob footer.
        expected: u32,
        /// Checksum computed over the blob contents.
        actual: u32,
    },

    /// Unrecognized envelope header or a format version outside the
    /// supported range.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The compression framing marker was missing after a valid header.
    #[error("Invalid framing at byte {offset}: {message}")]
    InvalidFraming {
        /// Offset of the expected marker within the blob.
        offset: usize,
        /// What was found instead.
        message: String,
    },

    /// The deflate stream could not be inflated (e.g. truncated data).
    #[error("Decompression failure: {0}")]
    DecompressionFailure(String),

    /// The parsed tree is empty/scalar, or an expected field is absent
    /// during entity construction.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// A snapshot or index name was not present in the repository catalog.
    /// Recoverable; the caller decides how to proceed.
    #[error("Name not found: {0}")]
    NameNotFound(String),

    /// No registered transformer accepts the source cluster version.
    #[error("Unsupported migration path: {0}")]
    UnsupportedMigrationPath(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with ReliquaryError.
pub type Result<T> = std::result::Result<T, ReliquaryError>;

impl ReliquaryError {
    /// Create a new invalid-version-string error.
    pub fn invalid_version<S: Into<String>>(msg: S) -> Self {
        ReliquaryError::InvalidVersionString(msg.into())
    }

    /// Create a new unsupported-format error.
    pub fn unsupported_format<S: Into<String>>(msg: S) -> Self {
        ReliquaryError::UnsupportedFormat(msg.into())
    }

    /// Create a new decompression-failure error.
    pub fn decompression<S: Into<String>>(msg: S) -> Self {
        ReliquaryError::DecompressionFailure(msg.into())
    }

    /// Create a new malformed-document error.
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        ReliquaryError::MalformedDocument(msg.into())
    }

    /// Create a new name-not-found error.
    pub fn name_not_found<S: Into<String>>(msg: S) -> Self {
        ReliquaryError::NameNotFound(msg.into())
    }

    /// Create a new unsupported-migration-path error.
    pub fn unsupported_migration<S: Into<String>>(msg: S) -> Self {
        ReliquaryError::UnsupportedMigrationPath(msg.into())
    }

    /// Prefix the error with a contextual identifier (repository location,
    /// snapshot/index/shard ids) while preserving its variant.
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        let context = context.into();
        match self {
            ReliquaryError::UnsupportedFormat(msg) => {
                ReliquaryError::UnsupportedFormat(format!("{context}: {msg}"))
            }
            ReliquaryError::DecompressionFailure(msg) => {
                ReliquaryError::DecompressionFailure(format!("{context}: {msg}"))
            }
            ReliquaryError::MalformedDocument(msg) => {
                ReliquaryError::MalformedDocument(format!("{context}: {msg}"))
            }
            ReliquaryError::InvalidFraming { offset, message } => ReliquaryError::InvalidFraming {
                offset,
                message: format!("{context}: {message}"),
            },
            ReliquaryError::CorruptMetadata {
                expected, actual, ..
            } => ReliquaryError::CorruptMetadata {
                context,
                expected,
                actual,
            },
            other => other,
        }
    }
}
