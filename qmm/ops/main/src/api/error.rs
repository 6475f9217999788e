//! Error types for the quantized matmul kernels

use qmm_core::{DType, TensorError};
use thiserror::Error;

/// Result type for kernel operations
pub type QuantResult<T> = Result<T, QuantError>;

/// Errors raised while validating kernel inputs. All checks run before any
/// output is computed.
#[derive(Debug, Error)]
pub enum QuantError {
    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),

    #[error("DType mismatch for `{name}`: expected {expected}, got {actual}")]
    DTypeMismatch {
        name: &'static str,
        expected: String,
        actual: DType,
    },

    #[error("Shape mismatch for `{name}`: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Unsupported rank for `{name}`: expected {expected}, got {actual}")]
    UnsupportedRank {
        name: &'static str,
        expected: &'static str,
        actual: usize,
    },

    #[error("Block alignment error: {0}")]
    BlockAlignment(String),

    #[error("Inner dimension mismatch: activations have K={left}, weights have K={right}")]
    InnerDimMismatch { left: usize, right: usize },

    #[error("Size overflow: {0}")]
    Overflow(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl QuantError {
    pub(crate) fn dtype(name: &'static str, expected: &[DType], actual: DType) -> Self {
        let expected = expected
            .iter()
            .map(|d| d.name())
            .collect::<Vec<_>>()
            .join(" or ");
        QuantError::DTypeMismatch { name, expected, actual }
    }

    /// True for errors in the shape family (block layout, rank, extents).
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            QuantError::ShapeMismatch { .. }
                | QuantError::UnsupportedRank { .. }
                | QuantError::BlockAlignment(_)
                | QuantError::Tensor(TensorError::ShapeMismatch { .. })
        )
    }

    /// True for element-type errors.
    pub fn is_dtype_error(&self) -> bool {
        matches!(
            self,
            QuantError::DTypeMismatch { .. } | QuantError::Tensor(TensorError::DTypeMismatch { .. })
        )
    }
}
