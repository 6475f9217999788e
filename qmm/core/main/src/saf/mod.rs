//! Facade re-exports for qmm-core

pub use crate::api::types::*;
pub use crate::api::error::*;
pub use crate::core::tensor::{Tensor, Storage, f32_vec_to_bytes};
pub use crate::core::shape::Shape;
pub use crate::core::runtime::{RuntimeConfig, OptProfile, mmt_par_threshold};
