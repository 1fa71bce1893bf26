//! Error types for OCT container decoding

use thiserror::Error;

/// Main error type for OCT decoding operations
#[derive(Error, Debug)]
pub enum OctError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot open OCT archive {path}: {reason}")]
    ArchiveOpen { path: String, reason: String },

    #[error("Archive read error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Malformed metadata: {0}")]
    MetadataParse(String),

    #[error("Member not found: {name} (available: {available})")]
    MemberNotFound { name: String, available: String },

    #[error(
        "Unsupported element type for {name}: Type={kind}, BytesPerPixel={bytes_per_element}, signed={signed}"
    )]
    UnsupportedElementType {
        name: String,
        kind: String,
        bytes_per_element: usize,
        signed: bool,
    },

    #[error(
        "Buffer size mismatch for {name}: expected a non-zero multiple of {expected} bytes, got {actual}"
    )]
    ShortBuffer {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid Spectral channel sequence: {0}")]
    ChannelSequence(String),

    #[error("Calibration length mismatch: chirp has {chirp_len} samples, spectra have {columns} columns")]
    CalibrationLengthMismatch { chirp_len: usize, columns: usize },

    #[error("Resample coordinate {value} outside calibration range [{min}, {max}]")]
    CalibrationRange { value: f64, min: f64, max: f64 },

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Specialized Result type for OCT operations
pub type Result<T> = std::result::Result<T, OctError>;

impl From<serde_json::Error> for OctError {
    fn from(err: serde_json::Error) -> Self {
        OctError::Serialization(err.to_string())
    }
}

impl OctError {
    /// Build a `MemberNotFound` error listing the names that do exist
    pub fn member_not_found<I, S>(name: impl Into<String>, available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let available = available
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        OctError::MemberNotFound {
            name: name.into(),
            available,
        }
    }
}
