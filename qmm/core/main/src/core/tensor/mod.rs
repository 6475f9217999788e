//! Multi-dtype tensor: storage and constructors, shape views, math ops.

mod ops;
mod tensor;
mod views;

pub use tensor::{Tensor, Storage, f32_vec_to_bytes};
