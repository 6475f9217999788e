mod common;

use common::*;
use half::f16;
use qmm_ops::*;

fn f16_ones(shape: &[usize]) -> Tensor {
    let n: usize = shape.iter().product();
    Tensor::from_f16(vec![f16::ONE; n], shape).unwrap()
}

#[test]
fn test_mmtfp_inner_dim_mismatch() {
    let mut rng = seeded_rng();
    let a = rand_f32(&[8, 32], &mut rng);
    let b = rand_f32(&[4, 16], &mut rng);
    let err = mmtfp(&a, &b).unwrap_err();
    assert!(matches!(err, QuantError::InnerDimMismatch { left: 32, right: 16 }));
    assert!(err.to_string().contains("K=32"));
}

#[test]
fn test_mmtfp_rejects_unpromoted_integers() {
    let a = Tensor::zeros(vec![2, 32]);
    let b = Tensor::from_i8(vec![1; 4 * 32], vec![4, 32]).unwrap();
    assert!(mmtfp(&a, &b).unwrap_err().is_dtype_error());

    let a_half = a.to_f16().unwrap();
    let b = Tensor::zeros(vec![4, 32]);
    assert!(mmtfp(&a_half, &b).unwrap_err().is_dtype_error());

    // promoting first makes it valid
    let b_wide = Tensor::from_i8(vec![1; 4 * 32], vec![4, 32]).unwrap().to_f32().unwrap();
    assert!(mmtfp(&a, &b_wide).is_ok());
}

#[test]
fn test_mmtfp_rank_errors() {
    let a = Tensor::zeros(vec![2, 2, 2, 8]);
    let b = Tensor::zeros(vec![3, 8]);
    assert!(mmtfp(&a, &b).unwrap_err().is_shape_error());

    let a = Tensor::zeros(vec![2, 8]);
    let b = Tensor::zeros(vec![1, 3, 8]);
    assert!(matches!(mmtfp(&a, &b), Err(QuantError::UnsupportedRank { name: "b", .. })));
}

#[test]
fn test_q8_block_must_divide_k() {
    let a = Tensor::zeros(vec![2, 100]);
    let d = f16_ones(&[4, 3, 1]);
    let qs = Tensor::from_i8(vec![0; 4 * 3 * 32], vec![4, 3, 32]).unwrap();
    let err = mmt_block_scaled_q8(&a, &d, &qs).unwrap_err();
    assert!(matches!(err, QuantError::BlockAlignment(_)));
    assert!(err.is_shape_error());
}

#[test]
fn test_q8_scale_shape_and_dtype() {
    let a = Tensor::zeros(vec![2, 64]);
    let qs = Tensor::from_i8(vec![0; 4 * 2 * 32], vec![4, 2, 32]).unwrap();

    let d_wrong = f16_ones(&[4, 2, 2]);
    assert!(matches!(
        mmt_block_scaled_q8(&a, &d_wrong, &qs),
        Err(QuantError::ShapeMismatch { name: "d", .. })
    ));

    let d_f32 = Tensor::full(vec![4, 2, 1], 1.0);
    assert!(mmt_block_scaled_q8(&a, &d_f32, &qs).unwrap_err().is_dtype_error());
}

#[test]
fn test_q8_rejects_float_values() {
    let a = Tensor::zeros(vec![2, 32]);
    let d = f16_ones(&[4, 1, 1]);
    let qs = Tensor::zeros(vec![4, 1, 32]);
    let err = mmt_block_scaled_q8(&a, &d, &qs).unwrap_err();
    assert!(err.is_dtype_error());
    assert!(err.to_string().contains("int8 or uint8"));
}

#[test]
fn test_q4_inner_dim_mismatch() {
    // blocks of 32 elements, weights cover K=64
    let a = Tensor::zeros(vec![1, 96]);
    let d = f16_ones(&[2, 2, 1]);
    let m = f16_ones(&[2, 2, 1]);
    let qs = Tensor::from_u8(vec![0; 2 * 2 * 16], vec![2, 2, 16]).unwrap();
    assert!(matches!(
        mmt_block_scaled_offset_q4_unsigned(&a, &d, &qs, &m),
        Err(QuantError::InnerDimMismatch { left: 96, right: 64 })
    ));
}

#[test]
fn test_q4_offset_shape() {
    let a = Tensor::zeros(vec![1, 64]);
    let d = f16_ones(&[2, 2, 1]);
    let m = f16_ones(&[2, 1, 1]);
    let qs = Tensor::from_u8(vec![0; 2 * 2 * 16], vec![2, 2, 16]).unwrap();
    assert!(matches!(
        mmt_block_scaled_offset_q4_unsigned(&a, &d, &qs, &m),
        Err(QuantError::ShapeMismatch { name: "m", .. })
    ));
}

#[test]
fn test_errors_leave_no_partial_output() {
    // the first failing check wins; nothing is computed
    let a = Tensor::from_i8(vec![0; 64], vec![2, 32]).unwrap();
    let d = f16_ones(&[4, 1, 1]);
    let qs = Tensor::from_i8(vec![0; 4 * 32], vec![4, 1, 32]).unwrap();
    assert!(matches!(
        mmt_block_scaled_q8(&a, &d, &qs),
        Err(QuantError::DTypeMismatch { name: "a", .. })
    ));
}

#[test]
fn test_storage_too_small() {
    let err = Tensor::try_new(vec![0u8; 10], vec![2, 3], DType::F32).unwrap_err();
    assert!(matches!(err, TensorError::StorageTooSmall { required: 24, available: 10 }));
    let wrapped: QuantError = err.into();
    assert!(wrapped.to_string().contains("24"));
}

fn is_storage_error(err: &QuantError) -> bool {
    matches!(err, QuantError::Tensor(TensorError::StorageTooSmall { .. }))
}

#[test]
fn test_mmtfp_rejects_short_storage() {
    let short = Tensor::new(vec![0u8; 4], vec![64, 4096], DType::F32);
    let full = Tensor::zeros(vec![64, 4096]);
    assert!(is_storage_error(&mmtfp(&short, &full).unwrap_err()));
    assert!(is_storage_error(&mmtfp(&full, &short).unwrap_err()));
}

#[test]
fn test_quantized_kernels_reject_short_storage() {
    let a_short = Tensor::new(vec![0u8; 4], vec![2, 32], DType::F32);
    let a = Tensor::zeros(vec![2, 32]);
    let d = f16_ones(&[4, 1, 1]);
    let qs = Tensor::from_i8(vec![0; 4 * 32], vec![4, 1, 32]).unwrap();
    assert!(is_storage_error(&mmt_block_scaled_q8(&a_short, &d, &qs).unwrap_err()));

    let qs_short = Tensor::new(vec![0u8; 10], vec![4, 1, 32], DType::I8);
    assert!(is_storage_error(&mmt_block_scaled_q8(&a, &d, &qs_short).unwrap_err()));

    let d_short = Tensor::new(vec![0u8; 2], vec![4, 1, 1], DType::F16);
    assert!(is_storage_error(&mmt_block_scaled_q8(&a, &d_short, &qs).unwrap_err()));

    let q4 = Tensor::from_u8(vec![0; 4 * 16], vec![4, 1, 16]).unwrap();
    let q4_short = Tensor::new(vec![0u8; 16], vec![4, 1, 16], DType::U8);
    assert!(is_storage_error(
        &mmt_block_scaled_offset_q4_unsigned(&a, &d, &q4_short, &d).unwrap_err()
    ));
    assert!(is_storage_error(
        &mmt_block_scaled_offset_q4_unsigned(&a, &d, &q4, &d_short).unwrap_err()
    ));
}
