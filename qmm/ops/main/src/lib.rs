//! # qmm Ops
//!
//! Transposed matmul kernels over block-quantized weights, for LLM inference
//! on CPU. Every kernel computes `A @ B^T` where `A` is an f32 activation
//! tensor `[*, M, K]` and `B` is `[N, K]`, either dense or reconstructed per
//! block from quantized storage:
//!
//! - [`mmtfp`]: dense f32 weights.
//! - [`mmt_block_scaled_q8`]: `B = d * qs`, one f16 scale per 32-element block.
//! - [`mmt_block_scaled_offset_q4_unsigned`]: `B = d * unpack4(qs) + m`, with
//!   unsigned 4-bit values packed two per byte and an f16 offset per block.
//!
//! The quantized kernels fuse dequantization into the dot product and
//! accumulate in f32; the weights are never expanded to a float matrix.
//! [`dequantize_block_scaled_q8`] and
//! [`dequantize_block_scaled_offset_q4_unsigned`] do the expansion explicitly
//! and serve as the reference path.
//!
//! ## Example
//!
//! ```rust
//! use qmm_core::Tensor;
//! use qmm_ops::mmt_block_scaled_q8;
//! use half::f16;
//!
//! let a = Tensor::rand_seeded([2, 64], 42);
//! let d = Tensor::from_f16(vec![f16::from_f32(0.5); 3 * 2], [3, 2, 1]).unwrap();
//! let qs = Tensor::from_i8(vec![1; 3 * 64], [3, 2, 32]).unwrap();
//! let out = mmt_block_scaled_q8(&a, &d, &qs).unwrap();
//! assert_eq!(out.shape(), &[2, 3]);
//! ```

pub mod api;
mod core;
mod saf;

pub use saf::*;
