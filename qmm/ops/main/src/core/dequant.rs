//! Dequantization of block-scaled weights back to dense f32.
//!
//! These are the reference forms of the fused kernels in [`super::mmt`]:
//! `mmtfp(a, dequantize(..))` computes the same product up to f32 rounding.

use crate::api::error::{QuantError, QuantResult};
use crate::api::types::BlockLayout;
use crate::core::layout::unpack_i4_block;
use crate::core::simd;
use qmm_core::{DType, Tensor};
use rayon::prelude::*;
use std::time::Instant;

/// Per-block f16 parameters widened to f32, indexed `row * blocks_per_row + block`.
pub(crate) fn block_params(t: &Tensor) -> QuantResult<Vec<f32>> {
    match t.as_slice_f16() {
        Ok(halfs) => Ok(halfs.iter().map(|h| h.to_f32()).collect()),
        // Misaligned view: go through the byte-wise conversion.
        Err(_) => Ok(t.to_vec()?),
    }
}

/// 8-bit block values; the signedness comes from the tensor dtype.
#[derive(Clone, Copy)]
pub(crate) enum Q8Values<'a> {
    Signed(&'a [i8]),
    Unsigned(&'a [u8]),
}

impl<'a> Q8Values<'a> {
    pub(crate) fn from_tensor(qs: &'a Tensor) -> QuantResult<Self> {
        match qs.dtype() {
            DType::I8 => Ok(Q8Values::Signed(qs.as_slice_i8()?)),
            DType::U8 => Ok(Q8Values::Unsigned(qs.as_slice_u8()?)),
            other => Err(QuantError::dtype("qs", &[DType::I8, DType::U8], other)),
        }
    }

    /// Unscaled dot of `input` against the values starting at `offset`.
    #[inline]
    pub(crate) fn dot(&self, input: &[f32], offset: usize) -> f32 {
        let end = offset + input.len();
        match *self {
            Q8Values::Signed(v) => simd::dot_i8_block(input, &v[offset..end]),
            Q8Values::Unsigned(v) => simd::dot_u8_block(input, &v[offset..end]),
        }
    }

    fn expand_into(&self, offset: usize, scale: f32, out: &mut [f32]) {
        match *self {
            Q8Values::Signed(v) => {
                for (o, &q) in out.iter_mut().zip(&v[offset..]) {
                    *o = scale * q as f32;
                }
            }
            Q8Values::Unsigned(v) => {
                for (o, &q) in out.iter_mut().zip(&v[offset..]) {
                    *o = scale * q as f32;
                }
            }
        }
    }
}

fn dense_len(layout: &BlockLayout) -> QuantResult<usize> {
    layout
        .n_rows
        .checked_mul(layout.k())
        .ok_or_else(|| QuantError::Overflow(format!("{} x {} dequantized weights", layout.n_rows, layout.k())))
}

/// Expand `d * qs` to a dense `[N, K]` f32 tensor, `K = K_blocks * 32`.
///
/// `qs` is `[N, K_blocks, 32]` (I8 read as signed, U8 as unsigned) and `d`
/// holds one f16 scale per block as `[N, K_blocks, 1]`.
pub fn dequantize_block_scaled_q8(d: &Tensor, qs: &Tensor) -> QuantResult<Tensor> {
    let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };
    let layout = BlockLayout::q8(qs)?;
    layout.check_block_param("d", d)?;

    let scales = block_params(d)?;
    let values = Q8Values::from_tensor(qs)?;
    let k = layout.k();
    let mut output = vec![0.0f32; dense_len(&layout)?];

    if k > 0 {
        output.par_chunks_mut(k).enumerate().for_each(|(row, out_row)| {
            for (block, out_block) in out_row.chunks_exact_mut(layout.block_elems).enumerate() {
                let idx = row * layout.blocks_per_row + block;
                values.expand_into(idx * layout.block_bytes, scales[idx], out_block);
            }
        });
    }

    if let Some(t) = _t {
        log::trace!("[perf] qmm::dequantize_block_scaled_q8 [{}x{}] {:.3}ms",
            layout.n_rows, k, t.elapsed().as_secs_f64() * 1000.0);
    }
    Ok(Tensor::from_vec(output, vec![layout.n_rows, k])?)
}

/// Expand `d * unpack(qs) + m` to a dense `[N, K]` f32 tensor.
///
/// `qs` is `[N, K_blocks, B/2]` U8 with two unsigned nibbles per byte, so
/// `K = K_blocks * B`. `d` and `m` are f16 `[N, K_blocks, 1]`.
pub fn dequantize_block_scaled_offset_q4_unsigned(
    d: &Tensor,
    qs: &Tensor,
    m: &Tensor,
) -> QuantResult<Tensor> {
    let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };
    let layout = BlockLayout::q4(qs)?;
    layout.check_block_param("d", d)?;
    layout.check_block_param("m", m)?;

    let scales = block_params(d)?;
    let offsets = block_params(m)?;
    let packed = qs.as_slice_u8()?;
    let k = layout.k();
    let mut output = vec![0.0f32; dense_len(&layout)?];

    if k > 0 {
        output.par_chunks_mut(k).enumerate().for_each(|(row, out_row)| {
            let mut nibbles = vec![0u8; layout.block_elems];
            for (block, out_block) in out_row.chunks_exact_mut(layout.block_elems).enumerate() {
                let idx = row * layout.blocks_per_row + block;
                let start = idx * layout.block_bytes;
                unpack_i4_block(&packed[start..start + layout.block_bytes], &mut nibbles);
                let (scale, offset) = (scales[idx], offsets[idx]);
                for (o, &q) in out_block.iter_mut().zip(&nibbles) {
                    *o = scale * q as f32 + offset;
                }
            }
        });
    }

    if let Some(t) = _t {
        log::trace!("[perf] qmm::dequantize_block_scaled_offset_q4_unsigned [{}x{}] {:.3}ms",
            layout.n_rows, k, t.elapsed().as_secs_f64() * 1000.0);
    }
    Ok(Tensor::from_vec(output, vec![layout.n_rows, k])?)
}
