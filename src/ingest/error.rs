//! Ingestion error types

/// Why a raw event was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    /// A required field is absent from the payload
    MissingField(&'static str),
    /// A field is present but not a finite number (or a known status)
    InvalidField { field: &'static str, value: String },
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::MissingField(field) => write!(f, "Missing required field: {}", field),
            IngestError::InvalidField { field, value } => {
                write!(f, "Invalid value for {}: {}", field, value)
            }
        }
    }
}

impl std::error::Error for IngestError {}
