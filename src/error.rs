//! Error types for the file exchange engine.

use thiserror::Error;

use crate::domain::{DocumentNumber, FileType};

/// Result type alias using the fixedwire error type.
pub type Result<T> = std::result::Result<T, FixedwireError>;

/// Main error type for the file exchange engine.
///
/// Variants map onto the four handling categories of the exchange: encoding
/// errors (record excluded, batch proceeds), structural errors (whole file
/// rejected), matching errors (line recorded, file proceeds), and
/// allocation/storage errors (operation aborted).
#[derive(Error, Debug)]
pub enum FixedwireError {
    /// A field value does not fit its fixed-width column.
    #[error("Field '{field}' value '{value}' exceeds column width {width}")]
    FieldTooWide {
        field: &'static str,
        value: String,
        width: usize,
    },

    /// A field value failed type validation (bad digits, bad date, bad code).
    #[error("Field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// A line's length does not match the schema's documented total width.
    #[error("Line length {actual} does not match expected {expected}")]
    LineLength { expected: usize, actual: usize },

    /// A record-type code does not match the schema being parsed.
    #[error("Record code '{actual}' does not match expected '{expected}'")]
    RecordCode {
        expected: &'static str,
        actual: String,
    },

    /// A feedback file's footer disagrees with its actual contents.
    #[error(
        "File '{file_name}' footer declares {declared} detail records but {actual} are present"
    )]
    FooterMismatch {
        file_name: String,
        declared: i64,
        actual: i64,
    },

    /// A feedback file's footer aggregate disagrees with a recount over the
    /// decoded detail records.
    #[error(
        "File '{file_name}' footer {field} declares {declared} but the details recount to {actual}"
    )]
    AggregateMismatch {
        file_name: String,
        field: &'static str,
        declared: i64,
        actual: i64,
    },

    /// A file body is missing its header/footer framing.
    #[error("File '{file_name}' is malformed: {reason}")]
    MalformedFile { file_name: String, reason: String },

    /// A feedback line references a document number no domain record carries.
    #[error("No domain record found for document number {0}")]
    UnknownDocument(DocumentNumber),

    /// A batch build ended with zero encodable records.
    #[error("No valid records remain for {0} batch; no file produced")]
    EmptyBatch(FileType),

    /// An inbound file name matches no known file type tag.
    #[error("File name '{0}' matches no known file type")]
    UnknownFileType(String),

    /// General error from storage, transfer, or allocation failures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FixedwireError {
    /// True for errors that reject an entire inbound file (structural guard).
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            FixedwireError::LineLength { .. }
                | FixedwireError::RecordCode { .. }
                | FixedwireError::FooterMismatch { .. }
                | FixedwireError::AggregateMismatch { .. }
                | FixedwireError::MalformedFile { .. }
        )
    }
}
