//! Error types for document operations

use thiserror::Error;

/// Errors raised while reading, mutating or writing a document
#[derive(Error, Debug)]
pub enum DocxError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Package error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("XML error in {part}: {message}")]
    XmlError { part: String, message: String },

    #[error("Missing package part: {0}")]
    MissingPart(String),

    #[error("Part '{part}' is larger than the {limit} byte limit")]
    TooLarge { part: String, limit: u64 },

    #[error("Invalid part name: {0}")]
    InvalidPartName(String),

    #[error("Unsupported or unreadable image '{0}'")]
    InvalidImage(String),

    #[error("Table '{0}' has no rows after trimming")]
    EmptyTable(String),

    #[error("Spreadsheet error: {0}")]
    SpreadsheetError(String),
}

impl DocxError {
    pub(crate) fn xml(part: &str, err: impl std::fmt::Display) -> Self {
        DocxError::XmlError {
            part: part.to_string(),
            message: err.to_string(),
        }
    }
}
