//! Error types for tensor construction and arithmetic.

use thiserror::Error;

use crate::shape::Dims;

/// Coarse error category shared by every error in the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operand or layer shapes disagree, or serialized data is malformed.
    Format,
    /// A dimension, length or index is outside its valid range.
    Range,
    /// An operation was invoked in the wrong state or order.
    InvalidOperation,
    /// The requested combination of operands or shapes is not supported.
    Unsupported,
}

/// Errors raised by tensor constructors and operators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TensorError {
    #[error("invalid dimensions {dims}: every dimension must be positive")]
    InvalidDimensions { dims: Dims },

    #[error("batch item {item} holds {actual} elements, expected {expected}")]
    LengthMismatch {
        item: usize,
        expected: usize,
        actual: usize,
    },

    #[error("buffer holds {actual} elements, expected {expected}")]
    DataLength { expected: usize, actual: usize },

    #[error("cannot build a tensor from an empty or ragged array: {0}")]
    RaggedArray(String),

    #[error("index ({batch}, {depth}, {row}, {column}) out of range for tensor {dims}")]
    IndexOutOfRange {
        batch: usize,
        depth: usize,
        row: usize,
        column: usize,
        dims: Dims,
    },

    #[error("cannot reshape {from} into {to}")]
    ReshapeMismatch { from: Dims, to: Dims },

    #[error("{op}: operand shapes {left} and {right} do not fit")]
    ShapeMismatch {
        op: &'static str,
        left: Dims,
        right: Dims,
    },

    #[error("{op}: invalid combination of batch sizes {left} and {right}")]
    IncompatibleBatch {
        op: &'static str,
        left: usize,
        right: usize,
    },

    #[error("{op}: unsupported operands {left} and {right}")]
    Unsupported {
        op: &'static str,
        left: Dims,
        right: Dims,
    },
}

impl TensorError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TensorError::InvalidDimensions { .. }
            | TensorError::LengthMismatch { .. }
            | TensorError::DataLength { .. }
            | TensorError::RaggedArray(_)
            | TensorError::IndexOutOfRange { .. }
            | TensorError::ReshapeMismatch { .. } => ErrorKind::Range,
            TensorError::ShapeMismatch { .. } => ErrorKind::Format,
            TensorError::IncompatibleBatch { .. } => ErrorKind::InvalidOperation,
            TensorError::Unsupported { .. } => ErrorKind::Unsupported,
        }
    }
}

pub type TensorResult<T> = Result<T, TensorError>;
