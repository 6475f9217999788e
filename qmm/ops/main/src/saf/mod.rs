//! Facade re-exports for qmm-ops

pub use crate::api::error::*;
pub use crate::api::types::*;
pub use crate::core::layout::{pack_i4_block, promote_linear_i4_block, promote_linear_i4_block_to_i8, unpack_i4_block};
pub use crate::core::dequant::{dequantize_block_scaled_offset_q4_unsigned, dequantize_block_scaled_q8};
pub use crate::core::mmt::{mmt_block_scaled_offset_q4_unsigned, mmt_block_scaled_q8, mmtfp};
pub use crate::core::simd;
pub use qmm_core::{DType, RuntimeConfig, Tensor, TensorError};
