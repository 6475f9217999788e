//! Transposed matmul kernels: `out[.., i, j] = sum_k a[.., i, k] * w[j, k]`.
//!
//! The quantized kernels never materialize `w`; each output element is
//! accumulated block by block straight from the packed weights.

use crate::api::error::{QuantError, QuantResult};
use crate::api::types::{BlockLayout, SMALL_M, TILE_N};
use crate::core::dequant::{block_params, Q8Values};
use crate::core::simd;
use qmm_core::{DType, Tensor};
use rayon::prelude::*;
use std::time::Instant;

/// Validated `[M, K]` or `[B, M, K]` f32 activations.
struct Activations<'a> {
    data: &'a [f32],
    /// All leading dims collapsed (`B * M`).
    rows: usize,
    k: usize,
    /// Output shape with the trailing N still missing.
    out_prefix: Vec<usize>,
}

impl<'a> Activations<'a> {
    fn new(a: &'a Tensor) -> QuantResult<Self> {
        if a.dtype() != DType::F32 {
            return Err(QuantError::dtype("a", &[DType::F32], a.dtype()));
        }
        let shape = a.shape();
        if !(2..=3).contains(&shape.len()) {
            return Err(QuantError::UnsupportedRank {
                name: "a",
                expected: "2 or 3",
                actual: shape.len(),
            });
        }
        let k = shape[shape.len() - 1];
        let rows: usize = shape[..shape.len() - 1].iter().product();
        Ok(Activations {
            data: a.as_slice_f32()?,
            rows,
            k,
            out_prefix: shape[..shape.len() - 1].to_vec(),
        })
    }

    /// The reduction dimension must be a whole number of blocks matching the weights.
    fn check_blocks(&self, layout: &BlockLayout) -> QuantResult<()> {
        if self.k % layout.block_elems != 0 {
            return Err(QuantError::BlockAlignment(format!(
                "K={} is not a multiple of the block size {}",
                self.k, layout.block_elems
            )));
        }
        if self.k != layout.k() {
            return Err(QuantError::InnerDimMismatch {
                left: self.k,
                right: layout.k(),
            });
        }
        Ok(())
    }

    fn row(&self, i: usize) -> &'a [f32] {
        &self.data[i * self.k..(i + 1) * self.k]
    }
}

/// Fill an `[rows, n]` output with `dot(activation row i, weight row j)`.
///
/// Small problems run on the calling thread. Otherwise few activation rows
/// split the weight rows across threads, many rows split the activations.
fn mmt_driver<F>(acts: &Activations<'_>, n: usize, dot: F) -> QuantResult<Vec<f32>>
where
    F: Fn(&[f32], usize) -> f32 + Sync,
{
    let m = acts.rows;
    let out_len = m
        .checked_mul(n)
        .ok_or_else(|| QuantError::Overflow(format!("{} x {} output elements", m, n)))?;
    let mut output = vec![0.0f32; out_len];
    if out_len == 0 {
        return Ok(output);
    }

    if out_len < qmm_core::mmt_par_threshold() {
        for (row_idx, out_row) in output.chunks_mut(n).enumerate() {
            let input_row = acts.row(row_idx);
            for (c, out_val) in out_row.iter_mut().enumerate() {
                *out_val = dot(input_row, c);
            }
        }
    } else if m <= SMALL_M {
        let col_chunk = (n / rayon::current_num_threads()).max(TILE_N);
        for (row_idx, out_row) in output.chunks_mut(n).enumerate() {
            let input_row = acts.row(row_idx);
            out_row
                .par_chunks_mut(col_chunk)
                .enumerate()
                .for_each(|(chunk_idx, out_chunk)| {
                    let col_start = chunk_idx * col_chunk;
                    for (local_c, out_val) in out_chunk.iter_mut().enumerate() {
                        *out_val = dot(input_row, col_start + local_c);
                    }
                });
        }
    } else {
        output
            .par_chunks_mut(n)
            .enumerate()
            .for_each(|(row_idx, out_row)| {
                let input_row = acts.row(row_idx);
                let mut col_idx = 0;
                while col_idx < n {
                    let tile_end = (col_idx + TILE_N).min(n);
                    for c in col_idx..tile_end {
                        out_row[c] = dot(input_row, c);
                    }
                    col_idx = tile_end;
                }
            });
    }
    Ok(output)
}

fn finish(acts: Activations<'_>, n: usize, output: Vec<f32>) -> QuantResult<Tensor> {
    let mut shape = acts.out_prefix;
    shape.push(n);
    Ok(Tensor::from_vec(output, shape)?)
}

/// Float transposed matmul: `[M, K] x [N, K]^T -> [M, N]`, batched over a
/// leading dim of `a` when it is 3-D.
pub fn mmtfp(a: &Tensor, b: &Tensor) -> QuantResult<Tensor> {
    let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };
    let acts = Activations::new(a)?;
    if b.dtype() != DType::F32 {
        return Err(QuantError::dtype("b", &[DType::F32], b.dtype()));
    }
    let [n, kb] = match *b.shape() {
        [n, kb] => [n, kb],
        _ => {
            return Err(QuantError::UnsupportedRank {
                name: "b",
                expected: "2 ([N, K])",
                actual: b.ndim(),
            })
        }
    };
    if acts.k != kb {
        return Err(QuantError::InnerDimMismatch { left: acts.k, right: kb });
    }

    let out = a.matmul_transposed(b)?;

    if let Some(t) = _t {
        log::trace!("[perf] qmm::mmtfp [{}x{}]x[{}x{}] {:.3}ms",
            acts.rows, acts.k, n, kb, t.elapsed().as_secs_f64() * 1000.0);
    }
    Ok(out)
}

/// Transposed matmul against 8-bit block-scaled weights.
///
/// `d: [N, K/32, 1]` f16 scales, `qs: [N, K/32, 32]` values (I8 signed,
/// U8 unsigned). Computes `a @ (d * qs).reshape(N, K)^T` with f32
/// accumulation and without materializing the dequantized weights.
pub fn mmt_block_scaled_q8(a: &Tensor, d: &Tensor, qs: &Tensor) -> QuantResult<Tensor> {
    let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };
    let acts = Activations::new(a)?;
    let layout = BlockLayout::q8(qs)?;
    layout.check_block_param("d", d)?;
    acts.check_blocks(&layout)?;

    let scales = block_params(d)?;
    let values = Q8Values::from_tensor(qs)?;
    let bs = layout.block_elems;

    let output = mmt_driver(&acts, layout.n_rows, |input_row, c| {
        let mut dot = 0.0f32;
        for block_idx in 0..layout.blocks_per_row {
            let idx = c * layout.blocks_per_row + block_idx;
            let input_offset = block_idx * bs;
            dot += scales[idx]
                * values.dot(&input_row[input_offset..input_offset + bs], idx * layout.block_bytes);
        }
        dot
    })?;

    if let Some(t) = _t {
        log::trace!("[perf] qmm::mmt_block_scaled_q8 [{}x{}]x[{}x{}] {:.3}ms",
            acts.rows, acts.k, layout.n_rows, layout.k(), t.elapsed().as_secs_f64() * 1000.0);
    }
    finish(acts, layout.n_rows, output)
}

/// Transposed matmul against 4-bit block-scaled weights with a per-block offset.
///
/// `qs: [N, K/B, B/2]` U8 holds two unsigned nibbles per byte (low nibble
/// first); `d` and `m` are f16 `[N, K/B, 1]`. Each element is `d*q + m`,
/// so a block contributes `d * sum(x*q) + m * sum(x)`.
pub fn mmt_block_scaled_offset_q4_unsigned(
    a: &Tensor,
    d: &Tensor,
    qs: &Tensor,
    m: &Tensor,
) -> QuantResult<Tensor> {
    let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };
    let acts = Activations::new(a)?;
    let layout = BlockLayout::q4(qs)?;
    layout.check_block_param("d", d)?;
    layout.check_block_param("m", m)?;
    acts.check_blocks(&layout)?;

    let scales = block_params(d)?;
    let offsets = block_params(m)?;
    let packed = qs.as_slice_u8()?;
    let bs = layout.block_elems;

    let output = mmt_driver(&acts, layout.n_rows, |input_row, c| {
        let mut dot = 0.0f32;
        for block_idx in 0..layout.blocks_per_row {
            let idx = c * layout.blocks_per_row + block_idx;
            let byte_offset = idx * layout.block_bytes;
            let input_offset = block_idx * bs;
            let (qx, sum_x) = simd::dot_u4_block(
                &input_row[input_offset..input_offset + bs],
                &packed[byte_offset..byte_offset + layout.block_bytes],
            );
            dot += scales[idx] * qx + offsets[idx] * sum_x;
        }
        dot
    })?;

    if let Some(t) = _t {
        log::trace!("[perf] qmm::mmt_block_scaled_offset_q4_unsigned [{}x{}]x[{}x{}] {:.3}ms",
            acts.rows, acts.k, layout.n_rows, layout.k(), t.elapsed().as_secs_f64() * 1000.0);
    }
    finish(acts, layout.n_rows, output)
}
