mod common;

use common::*;
use qmm_ops::*;

fn naive_mmt(a: &[f32], b: &[f32], m: usize, n: usize, k: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0f64;
            for p in 0..k {
                acc += a[i * k + p] as f64 * b[j * k + p] as f64;
            }
            out[i * n + j] = acc as f32;
        }
    }
    out
}

#[test]
fn test_mmtfp_2d() {
    let mut rng = seeded_rng();
    let a = rand_f32(&[128, 32], &mut rng);
    let b = rand_f32(&[256, 32], &mut rng);

    let out = mmtfp(&a, &b).unwrap();
    assert_eq!(out.shape(), &[128, 256]);

    let want = naive_mmt(&a.to_vec().unwrap(), &b.to_vec().unwrap(), 128, 256, 32);
    let want = Tensor::from_vec(want, vec![128, 256]).unwrap();
    assert_close(&out, &want, 1e-4, 1e-5);
}

#[test]
fn test_mmtfp_3d_matches_per_batch() {
    let mut rng = seeded_rng();
    let a = rand_f32(&[4, 128, 32], &mut rng);
    let b = rand_f32(&[256, 32], &mut rng);

    let out = mmtfp(&a, &b).unwrap();
    assert_eq!(out.shape(), &[4, 128, 256]);

    for batch in 0..4 {
        let single = mmtfp(&a.select(0, batch).unwrap(), &b).unwrap();
        assert_close(&out.select(0, batch).unwrap(), &single, 1e-5, 1e-6);
    }
}

#[test]
fn test_mmtfp_single_row() {
    let mut rng = seeded_rng();
    let a = rand_f32(&[1, 32], &mut rng);
    let b = rand_f32(&[5, 32], &mut rng);
    let out = mmtfp(&a, &b).unwrap();

    let want = naive_mmt(&a.to_vec().unwrap(), &b.to_vec().unwrap(), 1, 5, 32);
    assert_close(&out, &Tensor::from_vec(want, vec![1, 5]).unwrap(), 1e-5, 1e-5);
}

#[test]
fn test_q8_matches_dequantized_reference() {
    let mut rng = seeded_rng();
    let a = rand_f32(&[4, 16, 3200], &mut rng);
    let d = rand_f16(&[3200, 100, 1], &mut rng);
    let qs = rand_q8_i8(&[3200, 100, 32], &mut rng);

    let out = mmt_block_scaled_q8(&a, &d, &qs).unwrap();
    assert_eq!(out.shape(), &[4, 16, 3200]);

    let weights = reference_q8_weights(&d, &qs);
    assert_eq!(weights.shape(), &[3200, 3200]);
    let want = mmtfp(&a, &weights).unwrap();
    assert_close(&out, &want, 1e-1, 1e-5);
}

#[test]
fn test_q8_column_parallel_path() {
    // two activation rows against many weight rows
    let mut rng = seeded_rng();
    let a = rand_f32(&[2, 64], &mut rng);
    let d = rand_f16(&[8192, 2, 1], &mut rng);
    let qs = rand_q8_i8(&[8192, 2, 32], &mut rng);

    let out = mmt_block_scaled_q8(&a, &d, &qs).unwrap();
    let want = mmtfp(&a, &dequantize_block_scaled_q8(&d, &qs).unwrap()).unwrap();
    assert_close(&out, &want, 1e-3, 1e-5);
}

#[test]
fn test_q8_unsigned_storage() {
    let mut rng = seeded_rng();
    let a = rand_f32(&[3, 96], &mut rng);
    let d = rand_f16(&[10, 3, 1], &mut rng);
    let qs = rand_u8(&[10, 3, 32], &mut rng);

    let out = mmt_block_scaled_q8(&a, &d, &qs).unwrap();
    let want = mmtfp(&a, &reference_q8_weights(&d, &qs)).unwrap();
    assert_close(&out, &want, 1e-2, 1e-5);

    // reading the same bytes as signed changes the result
    let signed_bytes: Vec<i8> = qs.as_slice_u8().unwrap().iter().map(|&b| b as i8).collect();
    let signed = Tensor::from_i8(signed_bytes, vec![10, 3, 32]).unwrap();
    let out_signed = mmt_block_scaled_q8(&a, &d, &signed).unwrap();
    assert!(out.max_abs_diff(&out_signed).unwrap() > 1.0);
}

#[test]
fn test_q8_batch_rows_are_independent() {
    let mut rng = seeded_rng();
    let a = rand_f32(&[3, 7, 64], &mut rng);
    let d = rand_f16(&[12, 2, 1], &mut rng);
    let qs = rand_q8_i8(&[12, 2, 32], &mut rng);

    let out = mmt_block_scaled_q8(&a, &d, &qs).unwrap();
    for batch in 0..3 {
        let single = mmt_block_scaled_q8(&a.select(0, batch).unwrap(), &d, &qs).unwrap();
        assert_eq!(out.select(0, batch).unwrap().to_vec().unwrap(), single.to_vec().unwrap());
    }
}

#[test]
fn test_q4_matches_dequantized_reference() {
    let mut rng = seeded_rng();
    let a = rand_f32(&[4, 16, 3200], &mut rng);
    let d = rand_f16(&[3200, 100, 1], &mut rng);
    let qs = rand_u8(&[3200, 100, 16], &mut rng);
    let m = rand_f16(&[3200, 100, 1], &mut rng);

    let out = mmt_block_scaled_offset_q4_unsigned(&a, &d, &qs, &m).unwrap();
    assert_eq!(out.shape(), &[4, 16, 3200]);

    let weights = reference_q4_weights(&d, &qs, &m);
    let want = mmtfp(&a, &weights).unwrap();
    assert_close(&out, &want, 1e-1, 1e-5);
}

#[test]
fn test_q4_agrees_with_dequantize() {
    let mut rng = seeded_rng();
    let a = rand_f32(&[1, 5, 128], &mut rng);
    let d = rand_f16(&[6000, 2, 1], &mut rng);
    let qs = rand_u8(&[6000, 2, 32], &mut rng);
    let m = rand_f16(&[6000, 2, 1], &mut rng);

    let out = mmt_block_scaled_offset_q4_unsigned(&a, &d, &qs, &m).unwrap();
    let dense = dequantize_block_scaled_offset_q4_unsigned(&d, &qs, &m).unwrap();
    assert_eq!(dense.shape(), &[6000, 128]);
    assert_close(&out, &mmtfp(&a, &dense).unwrap(), 1e-3, 1e-5);
}

#[test]
fn test_q4_dequantize_matches_broadcast_reference() {
    let mut rng = seeded_rng();
    let d = rand_f16(&[4, 3, 1], &mut rng);
    let qs = rand_u8(&[4, 3, 16], &mut rng);
    let m = rand_f16(&[4, 3, 1], &mut rng);

    let dense = dequantize_block_scaled_offset_q4_unsigned(&d, &qs, &m).unwrap();
    assert_close(&dense, &reference_q4_weights(&d, &qs, &m), 1e-6, 1e-6);
}
