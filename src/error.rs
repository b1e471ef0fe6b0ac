//! Error types shared across the crate.

use thiserror::Error;

/// Convenience alias for results carrying [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by volume I/O and label combination.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File does not carry a NIfTI magic number.
    #[error("invalid NIfTI magic: {0:?}")]
    InvalidMagic([u8; 4]),

    /// NIfTI datatype code this crate does not handle.
    #[error("unsupported data type code: {0}")]
    UnsupportedDataType(i16),

    /// Header dimensions or geometry fields are inconsistent.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Gzip payload could not be decoded.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// File structure is valid NIfTI but uses an unsupported feature.
    #[error("invalid file format: {0}")]
    InvalidFileFormat(String),

    /// Grouping text is neither a list of groups nor a label mapping.
    #[error("invalid group specification: {0}")]
    InvalidGroupSpec(String),

    /// Invalid option value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A label value falls outside the signed 32-bit mapping domain.
    #[error("label {0} out of range for 32-bit signed labels")]
    LabelOutOfRange(i64),

    /// Voxel array is not contiguous in memory.
    #[error("non-contiguous array: {0}")]
    NonContiguousArray(String),
}
