use std::io;
use thiserror::Error;

/// Error type for CSV decoding and encoding operations.
///
/// Syntax anomalies found while tokenizing are not errors; they are
/// reported as [`ParseError`](crate::ParseError) diagnostics instead.
#[derive(Error, Debug)]
pub enum CsvError {
    /// IO error while reading or seeking the source.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration option or value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The header row names the same field twice.
    #[error("Duplicate field name in header: {0}")]
    DuplicateField(String),

    /// An explicitly included field is not present in the header.
    #[error("Included field not found in header: {0}")]
    MissingField(String),

    /// A byte sequence could not be converted from the source encoding.
    #[error("Invalid {encoding} byte sequence in row {row}")]
    Transcode {
        /// Name of the source encoding.
        encoding: &'static str,
        /// 1-based physical row that failed to decode.
        row: usize,
    },

    /// Remote source could not be fetched.
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(String),
}

impl CsvError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        CsvError::InvalidConfig(msg.into())
    }
}

/// Result type alias for CSV operations.
pub type Result<T> = std::result::Result<T, CsvError>;
