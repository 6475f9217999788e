#![allow(dead_code)]

use half::f16;
use qmm_ops::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SEED: u64 = 42;

pub fn seeded_rng() -> StdRng {
    StdRng::seed_from_u64(SEED)
}

/// Uniform [0, 1) f32 activations.
pub fn rand_f32(shape: &[usize], rng: &mut StdRng) -> Tensor {
    Tensor::rand_with(shape, rng)
}

/// Uniform [0, 1) values stored as f16.
pub fn rand_f16(shape: &[usize], rng: &mut StdRng) -> Tensor {
    let n: usize = shape.iter().product();
    let data = (0..n).map(|_| f16::from_f32(rng.r#gen::<f32>())).collect();
    Tensor::from_f16(data, shape).unwrap()
}

/// `floor(rand * 32)` as I8: values in 0..=31.
pub fn rand_q8_i8(shape: &[usize], rng: &mut StdRng) -> Tensor {
    let n: usize = shape.iter().product();
    let data = (0..n).map(|_| (rng.r#gen::<f32>() * 32.0) as i8).collect();
    Tensor::from_i8(data, shape).unwrap()
}

/// Uniformly random bytes: every nibble value occurs.
pub fn rand_u8(shape: &[usize], rng: &mut StdRng) -> Tensor {
    let n: usize = shape.iter().product();
    let data = (0..n).map(|_| rng.r#gen::<u8>()).collect();
    Tensor::from_u8(data, shape).unwrap()
}

/// Elementwise `|got - want| <= atol + rtol * |want|`, with the worst offender in the message.
pub fn assert_close(got: &Tensor, want: &Tensor, atol: f32, rtol: f32) {
    assert_eq!(got.shape(), want.shape(), "shape mismatch");
    let g = got.to_vec().unwrap();
    let w = want.to_vec().unwrap();
    let mut worst = (0usize, 0.0f32);
    for (i, (&a, &b)) in g.iter().zip(&w).enumerate() {
        let excess = (a - b).abs() - (atol + rtol * b.abs());
        if excess > worst.1 {
            worst = (i, excess);
        }
    }
    let (i, excess) = worst;
    assert!(
        excess <= 0.0,
        "element {i}: got {}, want {} (atol={atol}, rtol={rtol})",
        g[i],
        w[i]
    );
}

/// `(d * qs).flatten(1)` built from broadcast tensor ops: `[N, K]` f32.
pub fn reference_q8_weights(d: &Tensor, qs: &Tensor) -> Tensor {
    let scaled = d.to_f32().unwrap().mul(&qs.to_f32().unwrap()).unwrap();
    scaled.flatten(1).unwrap()
}

/// `(d * promote(qs) + m).flatten(1)`: `[N, K]` f32.
pub fn reference_q4_weights(d: &Tensor, qs: &Tensor, m: &Tensor) -> Tensor {
    let wide = promote_linear_i4_block_to_i8(qs).unwrap().to_f32().unwrap();
    let scaled = d.to_f32().unwrap().mul(&wide).unwrap();
    scaled.add(&m.to_f32().unwrap()).unwrap().flatten(1).unwrap()
}
