//! Shape operations: reshape, flatten, select, squeeze, transpose.

use crate::api::error::{TensorError, TensorResult};
use super::tensor::{Storage, Tensor, TensorShape};
use smallvec::SmallVec;
use std::sync::Arc;

impl Tensor {
    // ==================== Reshape ====================

    /// Reshape the tensor. Zero-copy: storage is shared.
    pub fn reshape(&self, shape: &[usize]) -> TensorResult<Tensor> {
        let current_size: usize = self.shape_sv.iter().product();
        let new_size: usize = shape.iter().product();

        if current_size != new_size {
            return Err(TensorError::ShapeMismatch {
                expected: vec![current_size],
                got: vec![new_size],
            });
        }

        Self::view(self.data.clone(), SmallVec::from_slice(shape), self.dtype)
    }

    /// Collapse dims `start_dim..` into one, like `torch.flatten(start_dim)`.
    ///
    /// `[N, K_blocks, 32].flatten(1)` gives `[N, K_blocks * 32]`.
    pub fn flatten(&self, start_dim: i64) -> TensorResult<Tensor> {
        if self.ndim() == 0 {
            return self.reshape(&[1]);
        }
        let start = self.normalize_dim(start_dim)?;
        let mut new_dims: TensorShape = SmallVec::from_slice(&self.shape_sv[..start]);
        new_dims.push(self.shape_sv[start..].iter().product());
        self.reshape(&new_dims)
    }

    // ==================== Unsqueeze / Squeeze ====================

    /// Add a dimension of size 1 at the specified position.
    pub fn unsqueeze(&self, dim: i64) -> TensorResult<Tensor> {
        let ndim = self.ndim() as i64 + 1;
        let normalized = if dim < 0 { dim + ndim } else { dim };
        if normalized < 0 || normalized > self.ndim() as i64 {
            return Err(TensorError::InvalidDimension {
                dim,
                ndim: self.ndim(),
            });
        }
        let mut new_dims = self.shape_sv.to_vec();
        new_dims.insert(normalized as usize, 1);
        self.reshape(&new_dims)
    }

    /// Remove a dimension of size 1.
    pub fn squeeze(&self, dim: i64) -> TensorResult<Tensor> {
        let dim_idx = self.normalize_dim(dim)?;
        if self.shape_sv[dim_idx] != 1 {
            return Err(TensorError::InvalidOperation(format!(
                "Cannot squeeze dimension {} with size {}",
                dim, self.shape_sv[dim_idx]
            )));
        }
        let mut new_dims = self.shape_sv.to_vec();
        new_dims.remove(dim_idx);
        self.reshape(&new_dims)
    }

    // ==================== Select ====================

    /// Select a single index along a dimension (reduces dimensionality).
    ///
    /// Selecting along dim 0 is zero-copy; other dims gather into new storage.
    pub fn select(&self, dim: i64, index: usize) -> TensorResult<Tensor> {
        let dim_idx = self.normalize_dim(dim)?;
        let dim_size = self.shape_sv[dim_idx];

        if index >= dim_size {
            return Err(TensorError::IndexOutOfBounds {
                dim: dim_idx,
                index,
                size: dim_size,
            });
        }

        let mut new_shape = self.shape_sv.clone();
        new_shape.remove(dim_idx);

        let elem = self.dtype.size();
        let inner: usize = self.shape_sv[dim_idx + 1..].iter().product();
        let outer: usize = self.shape_sv[..dim_idx].iter().product();
        let row_bytes = inner * elem;

        if dim_idx == 0 {
            let storage = Storage::View {
                parent: Arc::new(self.clone()),
                offset: index * row_bytes,
                len: row_bytes,
            };
            return Self::view(Arc::new(storage), new_shape, self.dtype);
        }

        let src = self.as_raw_bytes()?;
        let mut data = Vec::with_capacity(outer * row_bytes);
        for o in 0..outer {
            let start = (o * dim_size + index) * row_bytes;
            data.extend_from_slice(&src[start..start + row_bytes]);
        }
        Ok(Tensor::new(data, new_shape, self.dtype))
    }

    // ==================== Transpose ====================

    /// Transpose a 2-D tensor into new row-major storage.
    pub fn t(&self) -> TensorResult<Tensor> {
        if self.ndim() != 2 {
            return Err(TensorError::InvalidOperation(format!(
                "t() expects a 2-D tensor, got {} dims",
                self.ndim()
            )));
        }
        let rows = self.shape_sv[0];
        let cols = self.shape_sv[1];
        let elem = self.dtype.size();
        let src = self.as_raw_bytes()?;

        let mut data = vec![0u8; rows * cols * elem];
        for r in 0..rows {
            for c in 0..cols {
                let s = (r * cols + c) * elem;
                let d = (c * rows + r) * elem;
                data[d..d + elem].copy_from_slice(&src[s..s + elem]);
            }
        }
        Ok(Tensor::new(data, vec![cols, rows], self.dtype))
    }
}
