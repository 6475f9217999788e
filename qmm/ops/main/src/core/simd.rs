/// SIMD-accelerated dot products over one quantized block.
///
/// Uses `std::arch` target-specific intrinsics with scalar fallbacks.
/// Every kernel returns the *unscaled* sum `sum(x[i] * q[i])`; the caller
/// applies the block scale (and offset) once per block.
///
/// Dispatch hierarchy:
/// - x86_64: AVX2 (8 f32 lanes) -> scalar
/// - aarch64: NEON (4 f32 lanes, two accumulators) -> scalar
/// - Other: scalar fallback

fn dot_i8_block_scalar(input: &[f32], quantized: &[i8]) -> f32 {
    let mut sum = 0.0f32;
    for (&x, &q) in input.iter().zip(quantized) {
        sum += x * q as f32;
    }
    sum
}

fn dot_u8_block_scalar(input: &[f32], quantized: &[u8]) -> f32 {
    let mut sum = 0.0f32;
    for (&x, &q) in input.iter().zip(quantized) {
        sum += x * q as f32;
    }
    sum
}

/// Returns `(sum(x * q), sum(x))` over packed unsigned nibbles.
fn dot_u4_block_scalar(input: &[f32], packed: &[u8]) -> (f32, f32) {
    let mut dot = 0.0f32;
    let mut sum_x = 0.0f32;
    for (pair, &byte) in input.chunks_exact(2).zip(packed) {
        let lo = (byte & 0x0F) as f32;
        let hi = (byte >> 4) as f32;
        dot += pair[0] * lo + pair[1] * hi;
        sum_x += pair[0] + pair[1];
    }
    (dot, sum_x)
}

// --- x86_64 SIMD implementations ---

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    #[target_feature(enable = "avx2")]
    unsafe fn hsum256(v: __m256) -> f32 {
        let hi = _mm256_extractf128_ps(v, 1);
        let lo = _mm256_castps256_ps128(v);
        let sum128 = _mm_add_ps(lo, hi);
        let shuf = _mm_movehdup_ps(sum128);
        let sums = _mm_add_ps(sum128, shuf);
        let shuf2 = _mm_movehl_ps(sums, sums);
        _mm_cvtss_f32(_mm_add_ss(sums, shuf2))
    }

    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn dot_i8_block_avx2(input: &[f32], quantized: &[i8]) -> f32 {
        let n = input.len().min(quantized.len());
        let chunks = n / 8;
        let mut acc = _mm256_setzero_ps();

        for chunk in 0..chunks {
            let base = chunk * 8;
            let inp = _mm256_loadu_ps(input.as_ptr().add(base));
            let raw = _mm_loadl_epi64(quantized.as_ptr().add(base) as *const __m128i);
            let q_vec = _mm256_cvtepi32_ps(_mm256_cvtepi8_epi32(raw));
            acc = _mm256_add_ps(acc, _mm256_mul_ps(inp, q_vec));
        }

        let mut sum = hsum256(acc);
        for i in chunks * 8..n {
            sum += input[i] * quantized[i] as f32;
        }
        sum
    }

    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn dot_u8_block_avx2(input: &[f32], quantized: &[u8]) -> f32 {
        let n = input.len().min(quantized.len());
        let chunks = n / 8;
        let mut acc = _mm256_setzero_ps();

        for chunk in 0..chunks {
            let base = chunk * 8;
            let inp = _mm256_loadu_ps(input.as_ptr().add(base));
            let raw = _mm_loadl_epi64(quantized.as_ptr().add(base) as *const __m128i);
            let q_vec = _mm256_cvtepi32_ps(_mm256_cvtepu8_epi32(raw));
            acc = _mm256_add_ps(acc, _mm256_mul_ps(inp, q_vec));
        }

        let mut sum = hsum256(acc);
        for i in chunks * 8..n {
            sum += input[i] * quantized[i] as f32;
        }
        sum
    }

    /// Four packed bytes (eight nibbles) per step.
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn dot_u4_block_avx2(input: &[f32], packed: &[u8]) -> (f32, f32) {
        let n_bytes = packed.len().min(input.len() / 2);
        let chunks = n_bytes / 4;
        let mask_0f = _mm_set1_epi8(0x0F);
        let mut acc = _mm256_setzero_ps();
        let mut acc_x = _mm256_setzero_ps();

        for chunk in 0..chunks {
            let word = std::ptr::read_unaligned(packed.as_ptr().add(chunk * 4) as *const i32);
            let bytes = _mm_cvtsi32_si128(word);
            let lo = _mm_and_si128(bytes, mask_0f);
            let hi = _mm_and_si128(_mm_srli_epi16(bytes, 4), mask_0f);
            // lo0 hi0 lo1 hi1 ...: matches even/odd element order
            let interleaved = _mm_unpacklo_epi8(lo, hi);
            let q_vec = _mm256_cvtepi32_ps(_mm256_cvtepu8_epi32(interleaved));

            let inp = _mm256_loadu_ps(input.as_ptr().add(chunk * 8));
            acc = _mm256_add_ps(acc, _mm256_mul_ps(inp, q_vec));
            acc_x = _mm256_add_ps(acc_x, inp);
        }

        let mut dot = hsum256(acc);
        let mut sum_x = hsum256(acc_x);
        for j in chunks * 4..n_bytes {
            let byte = packed[j];
            let (x0, x1) = (input[2 * j], input[2 * j + 1]);
            dot += x0 * (byte & 0x0F) as f32 + x1 * (byte >> 4) as f32;
            sum_x += x0 + x1;
        }
        (dot, sum_x)
    }
}

// --- aarch64 SIMD implementations ---

#[cfg(target_arch = "aarch64")]
mod arm {
    use std::arch::aarch64::*;

    pub(super) unsafe fn dot_i8_block_neon(input: &[f32], quantized: &[i8]) -> f32 {
        let n = input.len().min(quantized.len());
        let chunks = n / 8;
        let mut acc0 = vdupq_n_f32(0.0);
        let mut acc1 = vdupq_n_f32(0.0);

        for chunk in 0..chunks {
            let base = chunk * 8;
            let q16 = vmovl_s8(vld1_s8(quantized.as_ptr().add(base)));
            let q_lo = vcvtq_f32_s32(vmovl_s16(vget_low_s16(q16)));
            let q_hi = vcvtq_f32_s32(vmovl_s16(vget_high_s16(q16)));
            acc0 = vfmaq_f32(acc0, vld1q_f32(input.as_ptr().add(base)), q_lo);
            acc1 = vfmaq_f32(acc1, vld1q_f32(input.as_ptr().add(base + 4)), q_hi);
        }

        let mut sum = vaddvq_f32(vaddq_f32(acc0, acc1));
        for i in chunks * 8..n {
            sum += input[i] * quantized[i] as f32;
        }
        sum
    }

    pub(super) unsafe fn dot_u8_block_neon(input: &[f32], quantized: &[u8]) -> f32 {
        let n = input.len().min(quantized.len());
        let chunks = n / 8;
        let mut acc0 = vdupq_n_f32(0.0);
        let mut acc1 = vdupq_n_f32(0.0);

        for chunk in 0..chunks {
            let base = chunk * 8;
            let q16 = vmovl_u8(vld1_u8(quantized.as_ptr().add(base)));
            let q_lo = vcvtq_f32_u32(vmovl_u16(vget_low_u16(q16)));
            let q_hi = vcvtq_f32_u32(vmovl_u16(vget_high_u16(q16)));
            acc0 = vfmaq_f32(acc0, vld1q_f32(input.as_ptr().add(base)), q_lo);
            acc1 = vfmaq_f32(acc1, vld1q_f32(input.as_ptr().add(base + 4)), q_hi);
        }

        let mut sum = vaddvq_f32(vaddq_f32(acc0, acc1));
        for i in chunks * 8..n {
            sum += input[i] * quantized[i] as f32;
        }
        sum
    }

    pub(super) unsafe fn dot_u4_block_neon(input: &[f32], packed: &[u8]) -> (f32, f32) {
        let n_bytes = packed.len().min(input.len() / 2);
        let chunks = n_bytes / 4;
        let mut acc0 = vdupq_n_f32(0.0);
        let mut acc1 = vdupq_n_f32(0.0);
        let mut acc_x = vdupq_n_f32(0.0);

        for chunk in 0..chunks {
            let mut unpacked = [0u8; 8];
            for j in 0..4 {
                let byte = packed[chunk * 4 + j];
                unpacked[2 * j] = byte & 0x0F;
                unpacked[2 * j + 1] = byte >> 4;
            }
            let q16 = vmovl_u8(vld1_u8(unpacked.as_ptr()));
            let q_lo = vcvtq_f32_u32(vmovl_u16(vget_low_u16(q16)));
            let q_hi = vcvtq_f32_u32(vmovl_u16(vget_high_u16(q16)));
            let x_lo = vld1q_f32(input.as_ptr().add(chunk * 8));
            let x_hi = vld1q_f32(input.as_ptr().add(chunk * 8 + 4));
            acc0 = vfmaq_f32(acc0, x_lo, q_lo);
            acc1 = vfmaq_f32(acc1, x_hi, q_hi);
            acc_x = vaddq_f32(acc_x, vaddq_f32(x_lo, x_hi));
        }

        let mut dot = vaddvq_f32(vaddq_f32(acc0, acc1));
        let mut sum_x = vaddvq_f32(acc_x);
        for j in chunks * 4..n_bytes {
            let byte = packed[j];
            let (x0, x1) = (input[2 * j], input[2 * j + 1]);
            dot += x0 * (byte & 0x0F) as f32 + x1 * (byte >> 4) as f32;
            sum_x += x0 + x1;
        }
        (dot, sum_x)
    }
}

// --- Public dispatch functions ---

/// Runtime-dispatched `sum(input[i] * quantized[i])` over signed bytes.
pub fn dot_i8_block(input: &[f32], quantized: &[i8]) -> f32 {
    debug_assert_eq!(input.len(), quantized.len());

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return unsafe { x86::dot_i8_block_avx2(input, quantized) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { arm::dot_i8_block_neon(input, quantized) };
    }

    #[allow(unreachable_code)]
    dot_i8_block_scalar(input, quantized)
}

/// Runtime-dispatched `sum(input[i] * quantized[i])` over unsigned bytes.
pub fn dot_u8_block(input: &[f32], quantized: &[u8]) -> f32 {
    debug_assert_eq!(input.len(), quantized.len());

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return unsafe { x86::dot_u8_block_avx2(input, quantized) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { arm::dot_u8_block_neon(input, quantized) };
    }

    #[allow(unreachable_code)]
    dot_u8_block_scalar(input, quantized)
}

/// Runtime-dispatched dot product over packed unsigned nibbles.
///
/// Returns `(sum(x * q), sum(x))`; the second term carries the block offset.
pub fn dot_u4_block(input: &[f32], packed: &[u8]) -> (f32, f32) {
    debug_assert_eq!(input.len(), packed.len() * 2);

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return unsafe { x86::dot_u4_block_avx2(input, packed) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { arm::dot_u4_block_neon(input, packed) };
    }

    #[allow(unreachable_code)]
    dot_u4_block_scalar(input, packed)
}

/// Scalar-only signed dot product (for testing).
pub fn dot_i8_block_scalar_ref(input: &[f32], quantized: &[i8]) -> f32 {
    dot_i8_block_scalar(input, quantized)
}

/// Scalar-only unsigned dot product (for testing).
pub fn dot_u8_block_scalar_ref(input: &[f32], quantized: &[u8]) -> f32 {
    dot_u8_block_scalar(input, quantized)
}

/// Scalar-only nibble dot product (for testing).
pub fn dot_u4_block_scalar_ref(input: &[f32], packed: &[u8]) -> (f32, f32) {
    dot_u4_block_scalar(input, packed)
}
