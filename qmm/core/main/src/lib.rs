//! # qmm Core
//!
//! Typed tensor descriptor for the qmm quantized matmul kernels.
//!
//! This crate provides a `Tensor` type that carries its element type, rank and
//! shape, so every kernel boundary can validate its inputs explicitly:
//!
//! - Dense row-major byte storage (`F32`, `F16`, `BF16`, `I8`, `U8`)
//! - Dtype promotion to f32 (`to_f32`) and narrowing to f16 (`to_f16`)
//! - Reshape / flatten / select views
//! - Broadcast element-wise arithmetic and dense matmul (via faer)
//!
//! ## Example
//!
//! ```rust
//! use qmm_core::Tensor;
//!
//! let a = Tensor::rand_seeded([2, 3], 42);
//! let b = Tensor::rand_seeded([4, 3], 7);
//! let c = a.matmul_transposed(&b).unwrap();
//! assert_eq!(c.shape(), &[2, 4]);
//! ```

pub mod api;
mod core;
mod saf;

pub use saf::*;
