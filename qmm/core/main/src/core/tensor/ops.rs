//! Tensor math operations: broadcast element-wise arithmetic, reductions, matmul.

use crate::api::error::{TensorError, TensorResult};
use crate::api::types::DType;
use super::tensor::{Tensor, f32_vec_to_bytes, TensorShape};
use smallvec::{smallvec, SmallVec};

/// Numpy-style broadcast of two shapes (right-aligned, size-1 dims stretch).
fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Option<TensorShape> {
    let ndim = lhs.len().max(rhs.len());
    let mut out: TensorShape = smallvec![0; ndim];
    for i in 0..ndim {
        let l = if i < ndim - lhs.len() { 1 } else { lhs[i - (ndim - lhs.len())] };
        let r = if i < ndim - rhs.len() { 1 } else { rhs[i - (ndim - rhs.len())] };
        out[i] = match (l, r) {
            (a, b) if a == b => a,
            (1, b) => b,
            (a, 1) => a,
            _ => return None,
        };
    }
    Some(out)
}

/// Strides of `shape` read through the broadcast `out` shape (0 on stretched dims).
fn broadcast_strides(shape: &[usize], out: &[usize]) -> TensorShape {
    let dense = Tensor::compute_strides_sv(shape);
    let pad = out.len() - shape.len();
    let mut strides: TensorShape = smallvec![0; out.len()];
    for i in 0..shape.len() {
        if shape[i] != 1 {
            strides[pad + i] = dense[i];
        }
    }
    strides
}

#[allow(non_snake_case)]
impl Tensor {
    // ==================== Element-wise binary ops ====================

    fn broadcast_binary(&self, other: &Tensor, op: impl Fn(f32, f32) -> f32) -> TensorResult<Tensor> {
        let lhs_data = self.as_slice_f32()?;
        let rhs_data = other.as_slice_f32()?;

        if self.shape_sv == other.shape_sv {
            let out: Vec<f32> = lhs_data.iter().zip(rhs_data).map(|(&a, &b)| op(a, b)).collect();
            return Ok(Tensor::new(f32_vec_to_bytes(out), self.shape_sv.clone(), DType::F32));
        }

        let out_shape = broadcast_shape(&self.shape_sv, &other.shape_sv).ok_or_else(|| {
            TensorError::BroadcastError {
                shape1: self.shape_sv.to_vec(),
                shape2: other.shape_sv.to_vec(),
            }
        })?;
        let lhs_strides = broadcast_strides(&self.shape_sv, &out_shape);
        let rhs_strides = broadcast_strides(&other.shape_sv, &out_shape);

        let numel: usize = out_shape.iter().product();
        let mut out = Vec::with_capacity(numel);
        let mut index: TensorShape = smallvec![0; out_shape.len()];
        let (mut l_off, mut r_off) = (0usize, 0usize);
        for _ in 0..numel {
            out.push(op(lhs_data[l_off], rhs_data[r_off]));
            // Odometer increment, keeping both offsets in step.
            for d in (0..out_shape.len()).rev() {
                index[d] += 1;
                l_off += lhs_strides[d];
                r_off += rhs_strides[d];
                if index[d] < out_shape[d] {
                    break;
                }
                l_off -= lhs_strides[d] * index[d];
                r_off -= rhs_strides[d] * index[d];
                index[d] = 0;
            }
        }

        Ok(Tensor::new(f32_vec_to_bytes(out), out_shape, DType::F32))
    }

    /// Element-wise addition with broadcasting.
    pub fn add(&self, other: &Tensor) -> TensorResult<Tensor> {
        self.broadcast_binary(other, |a, b| a + b)
    }

    /// Element-wise multiplication with broadcasting.
    pub fn mul(&self, other: &Tensor) -> TensorResult<Tensor> {
        self.broadcast_binary(other, |a, b| a * b)
    }

    // ==================== Reductions ====================

    /// Sum of all elements, accumulated in f64.
    pub fn sum_all(&self) -> TensorResult<f32> {
        let data = self.as_slice_f32()?;
        Ok(data.iter().map(|&v| v as f64).sum::<f64>() as f32)
    }

    /// Largest absolute element-wise difference between two same-shape tensors.
    pub fn max_abs_diff(&self, other: &Tensor) -> TensorResult<f32> {
        if self.shape_sv != other.shape_sv {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape_sv.to_vec(),
                got: other.shape_sv.to_vec(),
            });
        }
        let lhs = self.to_f32()?;
        let rhs = other.to_f32()?;
        Ok(lhs
            .as_slice_f32()?
            .iter()
            .zip(rhs.as_slice_f32()?)
            .fold(0.0f32, |acc, (a, b)| acc.max((a - b).abs())))
    }

    // ==================== Matrix multiplication ====================

    /// Matrix multiplication `[.., M, K] x [K, N] -> [.., M, N]` using faer.
    /// Leading batch dims of the LHS are collapsed into M.
    pub fn matmul(&self, other: &Tensor) -> TensorResult<Tensor> {
        let (M, K, out_prefix) = self.lhs_rows()?;
        if other.ndim() != 2 {
            return Err(TensorError::InvalidOperation(format!(
                "matmul RHS must be 2-D, got {} dims",
                other.ndim()
            )));
        }
        let K2 = other.shape_sv[0];
        let N = other.shape_sv[1];
        if K != K2 {
            return Err(TensorError::MatmulDimensionMismatch { left: K, right: K2 });
        }

        let lhs_data = self.as_slice_f32()?;
        let rhs_data = other.as_slice_f32()?;
        let mut out_data = vec![0.0f32; M * N];

        // C^T = B^T @ A^T using faer column-major convention
        unsafe {
            let a_t = faer::mat::from_raw_parts::<f32>(
                lhs_data.as_ptr(),
                K,
                M,
                1,
                K as isize,
            );
            let b_t = faer::mat::from_raw_parts::<f32>(
                rhs_data.as_ptr(),
                N,
                K,
                1,
                N as isize,
            );
            let mut c_t = faer::mat::from_column_major_slice_mut(out_data.as_mut_slice(), N, M);
            c_t.copy_from(b_t * a_t);
        }

        let mut out_shape = out_prefix;
        out_shape.push(N);
        Ok(Tensor::new(f32_vec_to_bytes(out_data), out_shape, DType::F32))
    }

    /// Transposed-RHS matmul `[.., M, K] x [N, K]^T -> [.., M, N]` using faer.
    ///
    /// Reads the RHS rows in place; nothing is transposed in memory.
    pub fn matmul_transposed(&self, other: &Tensor) -> TensorResult<Tensor> {
        let (M, K, out_prefix) = self.lhs_rows()?;
        if other.ndim() != 2 {
            return Err(TensorError::InvalidOperation(format!(
                "matmul_transposed RHS must be 2-D, got {} dims",
                other.ndim()
            )));
        }
        let N = other.shape_sv[0];
        let K2 = other.shape_sv[1];
        if K != K2 {
            return Err(TensorError::MatmulDimensionMismatch { left: K, right: K2 });
        }

        let lhs_data = self.as_slice_f32()?;
        let rhs_data = other.as_slice_f32()?;
        let mut out_data = vec![0.0f32; M * N];

        // C^T (N x M) = B (N x K) @ A^T (K x M)
        unsafe {
            let a_t = faer::mat::from_raw_parts::<f32>(
                lhs_data.as_ptr(),
                K,
                M,
                1,
                K as isize,
            );
            let b = faer::mat::from_raw_parts::<f32>(
                rhs_data.as_ptr(),
                N,
                K,
                K as isize,
                1,
            );
            let mut c_t = faer::mat::from_column_major_slice_mut(out_data.as_mut_slice(), N, M);
            c_t.copy_from(b * a_t);
        }

        let mut out_shape = out_prefix;
        out_shape.push(N);
        Ok(Tensor::new(f32_vec_to_bytes(out_data), out_shape, DType::F32))
    }

    /// (rows, K, output shape prefix) of a `[.., M, K]` LHS.
    fn lhs_rows(&self) -> TensorResult<(usize, usize, TensorShape)> {
        let ndim = self.ndim();
        if ndim < 2 {
            return Err(TensorError::InvalidOperation(format!(
                "matmul LHS must have at least 2 dims, got {}",
                ndim
            )));
        }
        let K = self.shape_sv[ndim - 1];
        let M: usize = self.shape_sv[..ndim - 1].iter().product();
        let prefix: TensorShape = SmallVec::from_slice(&self.shape_sv[..ndim - 1]);
        Ok((M, K, prefix))
    }
}
