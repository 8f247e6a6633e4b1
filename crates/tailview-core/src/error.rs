//! Error types for tailview.
//!
//! Only caller bugs are errors: a destination buffer that is too small, a
//! column whose value kind does not match, too many merge sources. Reading
//! rows that do not exist is never an error; those cells receive the column's
//! default value instead.

use crate::value::ValueKind;
use thiserror::Error;

/// Result type for buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Result type for log source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors raised by [`LogBuffer`](crate::buffer::LogBuffer) writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The write would extend past the end of the destination.
    #[error("buffer too small: writing {count} rows at {offset} into a buffer of {len} rows")]
    TooSmall {
        /// First destination row written.
        offset: usize,
        /// Number of rows written.
        count: usize,
        /// Length of the destination buffer.
        len: usize,
    },

    /// The destination buffer has no such column.
    #[error("column {0:?} is not part of this buffer")]
    NoSuchColumn(String),

    /// Source and destination disagree on the value kind of a column.
    #[error("column {column:?} holds {expected:?} values, got {actual:?}")]
    KindMismatch {
        /// Id of the column.
        column: String,
        /// Kind stored by the destination.
        expected: ValueKind,
        /// Kind that was supplied.
        actual: ValueKind,
    },
}

/// Errors raised by log sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A buffer contract was violated by the caller.
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// More sources were handed to a merged view than it can address.
    #[error("only up to {max} sources can be merged ({actual} were given)")]
    TooManySources {
        /// Supported maximum.
        max: usize,
        /// Number of sources given.
        actual: usize,
    },

    /// A processing hook failed; the pump logs this and moves on.
    #[error("processing failed: {message}")]
    Processing {
        /// Description of the failure.
        message: String,
    },

    /// The operation is not valid in the source's current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl SourceError {
    /// Creates a processing error.
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
