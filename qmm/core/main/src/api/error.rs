//! Error types for tensor operations

use crate::api::types::DType;
use thiserror::Error;

/// Result type for tensor operations
pub type TensorResult<T> = Result<T, TensorError>;

/// Errors that can occur in tensor operations
#[derive(Debug, Error)]
pub enum TensorError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("Storage requires at least {required} bytes but has only {available}")]
    StorageTooSmall { required: usize, available: usize },

    #[error("DType mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    #[error("Index {index} out of bounds for dim {dim} with size {size}")]
    IndexOutOfBounds { dim: usize, index: usize, size: usize },

    #[error("Invalid dimension {dim} for tensor with {ndim} dims")]
    InvalidDimension { dim: i64, ndim: usize },

    #[error("Matmul dimension mismatch: left inner dim {left}, right inner dim {right}")]
    MatmulDimensionMismatch { left: usize, right: usize },

    #[error("Cannot broadcast shapes {shape1:?} and {shape2:?}")]
    BroadcastError { shape1: Vec<usize>, shape2: Vec<usize> },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Conversion error: {0}")]
    ConversionError(String),

    #[error("Size overflow: {0}")]
    Overflow(String),
}
