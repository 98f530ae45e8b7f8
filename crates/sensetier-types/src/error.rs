//! Error types for decoding stored values in sensetier-types.

use thiserror::Error;

/// Errors that can occur when decoding sensor data fields.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A stored data-type tag did not match any known [`DataType`](crate::DataType).
    #[error("Unknown data type: {0}")]
    UnknownDataType(String),

    /// A stored sort-order tag did not match any known [`SortOrder`](crate::SortOrder).
    #[error("Unknown sort order: {0}")]
    UnknownSortOrder(String),
}

/// Result type alias using sensetier-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
