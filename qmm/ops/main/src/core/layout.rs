//! Sub-byte layout: 4-bit packing and block-shape metadata.
//!
//! Packed 4-bit storage keeps two unsigned values per byte along the last
//! dimension: the low nibble holds the even index, the high nibble the odd one.

use crate::api::error::{QuantError, QuantResult};
use crate::api::types::{BlockLayout, Q8_BLOCK_SIZE, U4_MAX};
use qmm_core::{DType, Tensor};

/// Unpack `packed` nibbles into `out`, one value (0..=15) per byte.
///
/// `out` must hold exactly `2 * packed.len()` bytes.
pub fn unpack_i4_block(packed: &[u8], out: &mut [u8]) {
    debug_assert_eq!(out.len(), packed.len() * 2);
    for (pair, &byte) in out.chunks_exact_mut(2).zip(packed) {
        pair[0] = byte & U4_MAX;
        pair[1] = byte >> 4;
    }
}

/// Pack unsigned 4-bit values two per byte. Inverse of [`unpack_i4_block`].
pub fn pack_i4_block(values: &[u8]) -> QuantResult<Vec<u8>> {
    if values.len() % 2 != 0 {
        return Err(QuantError::BlockAlignment(format!(
            "cannot pack an odd number of 4-bit values ({})",
            values.len()
        )));
    }
    if let Some(&v) = values.iter().find(|&&v| v > U4_MAX) {
        return Err(QuantError::InvalidData(format!(
            "value {} does not fit in 4 bits",
            v
        )));
    }
    Ok(values
        .chunks_exact(2)
        .map(|pair| (pair[1] << 4) | pair[0])
        .collect())
}

/// Widen packed unsigned 4-bit values to one byte each.
///
/// `[..., L]` packed bytes become `[..., 2L]` U8 values in `0..=15`; all
/// leading dimensions are preserved.
pub fn promote_linear_i4_block_to_i8(qs: &Tensor) -> QuantResult<Tensor> {
    let packed_len = match qs.shape().last() {
        Some(&l) => l,
        None => {
            return Err(QuantError::UnsupportedRank {
                name: "qs",
                expected: ">= 1",
                actual: 0,
            })
        }
    };
    let block_elems = packed_len
        .checked_mul(2)
        .ok_or_else(|| QuantError::Overflow(format!("{} packed bytes per block", packed_len)))?;
    promote_linear_i4_block(qs, block_elems)
}

/// [`promote_linear_i4_block_to_i8`] with a declared block size: fails unless
/// the packed last dimension expands to exactly `block_elems` values.
pub fn promote_linear_i4_block(qs: &Tensor, block_elems: usize) -> QuantResult<Tensor> {
    if !matches!(qs.dtype(), DType::U8 | DType::I8) {
        return Err(QuantError::dtype("qs", &[DType::U8, DType::I8], qs.dtype()));
    }
    let packed_len = *qs.shape().last().ok_or(QuantError::UnsupportedRank {
        name: "qs",
        expected: ">= 1",
        actual: 0,
    })?;
    if packed_len == 0 || block_elems % 2 != 0 || packed_len.checked_mul(2) != Some(block_elems) {
        return Err(QuantError::BlockAlignment(format!(
            "{} packed bytes cannot hold a block of {} 4-bit values",
            packed_len, block_elems
        )));
    }

    // Exactly the bytes the shape covers; trailing storage is ignored.
    let packed = qs.as_raw_bytes()?;
    let out_len = packed
        .len()
        .checked_mul(2)
        .ok_or_else(|| QuantError::Overflow(format!("unpacking {} bytes", packed.len())))?;
    let mut out = vec![0u8; out_len];
    unpack_i4_block(packed, &mut out);

    let mut shape = qs.shape().to_vec();
    if let Some(last) = shape.last_mut() {
        *last = block_elems;
    }
    Ok(Tensor::from_u8(out, shape)?)
}

fn expect_rank3(name: &'static str, t: &Tensor) -> QuantResult<[usize; 3]> {
    match *t.shape() {
        [a, b, c] => Ok([a, b, c]),
        _ => Err(QuantError::UnsupportedRank {
            name,
            expected: "3 ([N, K_blocks, block])",
            actual: t.ndim(),
        }),
    }
}

fn checked_layout(n_rows: usize, blocks_per_row: usize, block_elems: usize, block_bytes: usize) -> QuantResult<BlockLayout> {
    n_rows
        .checked_mul(blocks_per_row)
        .and_then(|blocks| blocks.checked_mul(block_elems))
        .ok_or_else(|| {
            QuantError::Overflow(format!(
                "{} rows x {} blocks x {} elements",
                n_rows, blocks_per_row, block_elems
            ))
        })?;
    Ok(BlockLayout {
        n_rows,
        blocks_per_row,
        block_elems,
        block_bytes,
    })
}

impl BlockLayout {
    /// Layout of 8-bit block values `qs: [N, K_blocks, 32]` (I8 or U8).
    pub fn q8(qs: &Tensor) -> QuantResult<Self> {
        if !matches!(qs.dtype(), DType::I8 | DType::U8) {
            return Err(QuantError::dtype("qs", &[DType::I8, DType::U8], qs.dtype()));
        }
        let [n, kb, bs] = expect_rank3("qs", qs)?;
        if bs != Q8_BLOCK_SIZE {
            return Err(QuantError::BlockAlignment(format!(
                "q8 blocks hold {} values, got {}",
                Q8_BLOCK_SIZE, bs
            )));
        }
        checked_layout(n, kb, bs, bs)
    }

    /// Layout of packed 4-bit block values `qs: [N, K_blocks, block_bytes]` (U8).
    pub fn q4(qs: &Tensor) -> QuantResult<Self> {
        if qs.dtype() != DType::U8 {
            return Err(QuantError::dtype("qs", &[DType::U8], qs.dtype()));
        }
        let [n, kb, bytes] = expect_rank3("qs", qs)?;
        if bytes == 0 {
            return Err(QuantError::BlockAlignment("q4 blocks must not be empty".into()));
        }
        let elems = bytes
            .checked_mul(2)
            .ok_or_else(|| QuantError::Overflow(format!("{} packed bytes per block", bytes)))?;
        checked_layout(n, kb, elems, bytes)
    }

    /// Check a per-block parameter tensor (scale or offset): F16, `[N, K_blocks, 1]`.
    pub fn check_block_param(&self, name: &'static str, t: &Tensor) -> QuantResult<()> {
        if t.dtype() != DType::F16 {
            return Err(QuantError::dtype(name, &[DType::F16], t.dtype()));
        }
        let expected = self.param_shape();
        if t.shape() != expected {
            return Err(QuantError::ShapeMismatch {
                name,
                expected: expected.to_vec(),
                actual: t.shape().to_vec(),
            });
        }
        Ok(())
    }
}
