//! Error types for Imaris reader operations

use thiserror::Error;

/// Main error type for IMS operations
///
/// `Format`, `Schema` and `AttributeMissing` are soft failures: the reader
/// resolves them locally where it can (default value, zero-filled slice).
/// `Conversion` is the hard failure raised when a value crossing the C
/// boundary cannot be represented.
#[derive(Error, Debug)]
pub enum ImsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid IMS format: {0}")]
    Format(String),

    #[error("Unsupported Imaris version: {0}")]
    UnsupportedVersion(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Missing attribute {name} at {path}")]
    AttributeMissing { path: String, name: String },

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Storage backend error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ImsError {
    /// True for the failures a caller may substitute a default for.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            ImsError::AttributeMissing { .. } | ImsError::NotFound(_) | ImsError::Schema(_)
        )
    }

    pub(crate) fn attribute_missing(path: &str, name: &str) -> Self {
        ImsError::AttributeMissing {
            path: path.to_string(),
            name: name.to_string(),
        }
    }
}

/// Specialized Result type for IMS operations
pub type Result<T> = std::result::Result<T, ImsError>;

impl From<serde_json::Error> for ImsError {
    fn from(err: serde_json::Error) -> Self {
        ImsError::Serialization(err.to_string())
    }
}

#[cfg(feature = "hdf5")]
impl From<hdf5::Error> for ImsError {
    fn from(err: hdf5::Error) -> Self {
        ImsError::Storage(err.to_string())
    }
}
