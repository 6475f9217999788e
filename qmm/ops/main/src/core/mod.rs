pub mod dequant;
pub mod layout;
pub mod mmt;
pub mod simd;
