use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfToolError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Invalid page range: {0}")]
    InvalidRange(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PdfToolError {
    pub(crate) fn parse(err: impl std::fmt::Display) -> Self {
        PdfToolError::ParseError(err.to_string())
    }

    pub(crate) fn save(err: impl std::fmt::Display) -> Self {
        PdfToolError::OperationError(format!("Save failed: {}", err))
    }
}
