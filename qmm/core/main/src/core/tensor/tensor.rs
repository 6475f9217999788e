//! Multi-dtype Tensor with Arc<Storage> backend.

use crate::api::error::{TensorError, TensorResult};
use crate::api::types::{DType, Device};
use crate::core::shape::Shape;
use half::{bf16, f16};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Safely convert a Vec<f32> into a Vec<u8> without unsafe code.
pub fn f32_vec_to_bytes(v: Vec<f32>) -> Vec<u8> {
    match bytemuck::try_cast_vec::<f32, u8>(v) {
        Ok(bytes) => bytes,
        Err((_, original)) => bytemuck::cast_slice::<f32, u8>(&original).to_vec(),
    }
}

/// Underlying storage for tensor data.
pub enum Storage {
    Owned(Vec<u8>),
    /// Byte range of another tensor's storage (leading-dim selections).
    View {
        parent: Arc<Tensor>,
        offset: usize,
        len: usize,
    },
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Storage::Owned(v) => write!(f, "Owned({} bytes)", v.len()),
            Storage::View { offset, len, .. } => {
                write!(f, "View(offset={}, len={})", offset, len)
            }
        }
    }
}

fn storage_byte_len(s: &Storage) -> usize {
    match s {
        Storage::Owned(v) => v.len(),
        Storage::View { len, .. } => *len,
    }
}

/// Internal shape type: stack-allocated for <=4 dims.
pub(crate) type TensorShape = SmallVec<[usize; 4]>;

/// A dense, row-major, multi-dimensional array supporting multiple data types.
///
/// Cloning is cheap: the storage is shared and never mutated.
#[derive(Clone)]
pub struct Tensor {
    pub(crate) data: Arc<Storage>,
    pub(crate) shape_sv: TensorShape,
    pub(crate) dtype: DType,
    pub(crate) device: Device,
}

impl Tensor {
    // ==================== Low-level constructors ====================

    /// Create a tensor from raw bytes with the given shape and dtype.
    ///
    /// The byte length is not checked; use [`Tensor::try_new`] for untrusted input.
    pub fn new(data: Vec<u8>, shape: impl Into<Shape>, dtype: DType) -> Self {
        let shape: Shape = shape.into();
        Self {
            data: Arc::new(Storage::Owned(data)),
            shape_sv: SmallVec::from_slice(shape.dims()),
            dtype,
            device: Device::Cpu,
        }
    }

    /// Create a tensor from raw bytes, checking that the storage covers the shape.
    pub fn try_new(data: Vec<u8>, shape: impl Into<Shape>, dtype: DType) -> TensorResult<Self> {
        let shape: Shape = shape.into();
        let required = Self::dense_byte_size(&shape, dtype)?;
        if data.len() < required {
            return Err(TensorError::StorageTooSmall {
                required,
                available: data.len(),
            });
        }
        Ok(Self::new(data, shape, dtype))
    }

    /// Bytes needed for a dense array of `shape` elements of `dtype`.
    pub fn dense_byte_size(shape: &Shape, dtype: DType) -> TensorResult<usize> {
        shape
            .checked_numel()
            .and_then(|n| n.checked_mul(dtype.size()))
            .ok_or_else(|| {
                TensorError::Overflow(format!("{} x {} does not fit in memory", shape, dtype))
            })
    }

    /// Create a view over a byte range of existing data.
    pub(crate) fn view(
        data: Arc<Storage>,
        shape: TensorShape,
        dtype: DType,
    ) -> TensorResult<Self> {
        let required: usize = shape.iter().product::<usize>() * dtype.size();
        let available = storage_byte_len(&data);
        if required > available {
            return Err(TensorError::StorageTooSmall { required, available });
        }
        Ok(Self {
            data,
            shape_sv: shape,
            dtype,
            device: Device::Cpu,
        })
    }

    fn check_len(len: usize, shape: &Shape) -> TensorResult<()> {
        if len != shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                got: vec![len],
            });
        }
        Ok(())
    }

    // ==================== Typed constructors ====================

    /// Create an F32 tensor from an f32 vector with the given shape.
    pub fn from_vec(data: Vec<f32>, shape: impl Into<Shape>) -> TensorResult<Self> {
        let shape = shape.into();
        Self::check_len(data.len(), &shape)?;
        Ok(Self::new(f32_vec_to_bytes(data), shape, DType::F32))
    }

    /// Create an F16 tensor.
    pub fn from_f16(data: Vec<f16>, shape: impl Into<Shape>) -> TensorResult<Self> {
        let shape = shape.into();
        Self::check_len(data.len(), &shape)?;
        let bytes = bytemuck::cast_slice::<f16, u8>(&data).to_vec();
        Ok(Self::new(bytes, shape, DType::F16))
    }

    /// Create an I8 tensor.
    pub fn from_i8(data: Vec<i8>, shape: impl Into<Shape>) -> TensorResult<Self> {
        let shape = shape.into();
        Self::check_len(data.len(), &shape)?;
        let bytes = bytemuck::cast_slice::<i8, u8>(&data).to_vec();
        Ok(Self::new(bytes, shape, DType::I8))
    }

    /// Create a U8 tensor.
    pub fn from_u8(data: Vec<u8>, shape: impl Into<Shape>) -> TensorResult<Self> {
        let shape = shape.into();
        Self::check_len(data.len(), &shape)?;
        Ok(Self::new(data, shape, DType::U8))
    }

    /// Create an F32 tensor filled with zeros.
    pub fn zeros(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let bytes = vec![0u8; shape.numel() * 4];
        Self::new(bytes, shape, DType::F32)
    }

    /// Create an F32 tensor filled with a specific value.
    pub fn full(shape: impl Into<Shape>, value: f32) -> Self {
        let shape = shape.into();
        let data = vec![value; shape.numel()];
        Self::new(f32_vec_to_bytes(data), shape, DType::F32)
    }

    /// Uniform [0, 1) values drawn from a caller-provided generator.
    pub fn rand_with<R: Rng + ?Sized>(shape: impl Into<Shape>, rng: &mut R) -> Self {
        let shape = shape.into();
        let data: Vec<f32> = (0..shape.numel()).map(|_| rng.r#gen()).collect();
        Self::new(f32_vec_to_bytes(data), shape, DType::F32)
    }

    /// Uniform [0, 1) values from a `StdRng` seeded with `seed`. Reproducible.
    pub fn rand_seeded(shape: impl Into<Shape>, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::rand_with(shape, &mut rng)
    }

    // ==================== Properties ====================

    /// Get the shape as a slice.
    pub fn shape(&self) -> &[usize] {
        &self.shape_sv
    }

    /// Get the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape_sv.len()
    }

    /// Get the total number of elements.
    pub fn numel(&self) -> usize {
        self.shape_sv.iter().product()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Fail with `DTypeMismatch` unless this tensor has dtype `expected`.
    pub fn expect_dtype(&self, expected: DType) -> TensorResult<()> {
        if self.dtype != expected {
            return Err(TensorError::DTypeMismatch {
                expected,
                got: self.dtype,
            });
        }
        Ok(())
    }

    /// Returns exactly the `numel * dtype.size()` bytes the shape covers.
    ///
    /// Fails with `StorageTooSmall` when the storage is shorter than that;
    /// trailing bytes beyond the shape are never exposed.
    pub fn as_raw_bytes(&self) -> TensorResult<&[u8]> {
        let stored = match self.data.as_ref() {
            Storage::Owned(v) => v.as_slice(),
            Storage::View { parent, offset, len } => {
                let parent_bytes = parent.as_raw_bytes()?;
                let end = offset.saturating_add(*len);
                parent_bytes.get(*offset..end).ok_or(TensorError::StorageTooSmall {
                    required: end,
                    available: parent_bytes.len(),
                })?
            }
        };
        let required = Self::dense_byte_size(&Shape::from(&self.shape_sv[..]), self.dtype)?;
        stored.get(..required).ok_or(TensorError::StorageTooSmall {
            required,
            available: stored.len(),
        })
    }

    /// Get the underlying f32 data as a slice.
    pub fn as_slice_f32(&self) -> TensorResult<&[f32]> {
        self.expect_dtype(DType::F32)?;
        let bytes = self.as_raw_bytes()?;
        bytemuck::try_cast_slice(bytes).map_err(|_| {
            TensorError::ConversionError(
                "as_slice_f32: data not 4-byte aligned; call to_f32() first".into(),
            )
        })
    }

    /// Get the underlying f16 data as a slice.
    pub fn as_slice_f16(&self) -> TensorResult<&[f16]> {
        self.expect_dtype(DType::F16)?;
        let bytes = self.as_raw_bytes()?;
        bytemuck::try_cast_slice(bytes).map_err(|_| {
            TensorError::ConversionError("as_slice_f16: data not 2-byte aligned".into())
        })
    }

    /// Get the underlying data as signed bytes.
    pub fn as_slice_i8(&self) -> TensorResult<&[i8]> {
        self.expect_dtype(DType::I8)?;
        Ok(bytemuck::cast_slice(self.as_raw_bytes()?))
    }

    /// Get the underlying data as unsigned bytes.
    pub fn as_slice_u8(&self) -> TensorResult<&[u8]> {
        self.expect_dtype(DType::U8)?;
        self.as_raw_bytes()
    }

    /// Convert to a Vec<f32>, promoting the element type if needed.
    pub fn to_vec(&self) -> TensorResult<Vec<f32>> {
        let promoted = self.to_f32()?;
        Ok(promoted.as_slice_f32()?.to_vec())
    }

    // ==================== Dtype conversion ====================

    /// Promote to F32. I8 is sign-extended, U8 zero-extended.
    pub fn to_f32(&self) -> TensorResult<Tensor> {
        let bytes = self.as_raw_bytes()?;
        let data_f32: Vec<f32> = match self.dtype {
            DType::F32 => {
                if bytemuck::try_cast_slice::<u8, f32>(bytes).is_ok() {
                    return Ok(self.clone());
                }
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                    .collect()
            }
            DType::F16 => match bytemuck::try_cast_slice::<u8, f16>(bytes) {
                Ok(slice) => slice.iter().map(|x| x.to_f32()).collect(),
                Err(_) => bytes
                    .chunks_exact(2)
                    .map(|c| f16::from_ne_bytes([c[0], c[1]]).to_f32())
                    .collect(),
            },
            DType::BF16 => match bytemuck::try_cast_slice::<u8, bf16>(bytes) {
                Ok(slice) => slice.iter().map(|x| x.to_f32()).collect(),
                Err(_) => bytes
                    .chunks_exact(2)
                    .map(|c| bf16::from_ne_bytes([c[0], c[1]]).to_f32())
                    .collect(),
            },
            DType::I8 => bytes.iter().map(|&b| b as i8 as f32).collect(),
            DType::U8 => bytes.iter().map(|&b| b as f32).collect(),
        };
        Ok(Tensor::new(
            f32_vec_to_bytes(data_f32),
            self.shape_sv.clone(),
            DType::F32,
        ))
    }

    /// Narrow an F32 tensor to F16 (round to nearest even).
    pub fn to_f16(&self) -> TensorResult<Tensor> {
        if self.dtype == DType::F16 {
            return Ok(self.clone());
        }
        let src = self.to_f32()?;
        let data: Vec<f16> = src.as_slice_f32()?.iter().map(|&v| f16::from_f32(v)).collect();
        let bytes = bytemuck::cast_slice::<f16, u8>(&data).to_vec();
        Ok(Tensor::new(bytes, self.shape_sv.clone(), DType::F16))
    }

    // ==================== Indexing ====================

    /// Get a single element by indices, promoted to f32.
    pub fn get(&self, indices: &[usize]) -> TensorResult<f32> {
        if indices.len() != self.ndim() {
            return Err(TensorError::InvalidOperation(format!(
                "Expected {} indices, got {}",
                self.ndim(),
                indices.len()
            )));
        }
        let strides = Self::compute_strides_sv(&self.shape_sv);
        let mut offset = 0usize;
        for (i, &idx) in indices.iter().enumerate() {
            if idx >= self.shape_sv[i] {
                return Err(TensorError::IndexOutOfBounds {
                    dim: i,
                    index: idx,
                    size: self.shape_sv[i],
                });
            }
            offset += idx * strides[i];
        }
        let size = self.dtype.size();
        let bytes = self.as_raw_bytes()?;
        let b = bytes.get(offset * size..(offset + 1) * size).ok_or(
            TensorError::IndexOutOfBounds {
                dim: 0,
                index: offset * size,
                size: bytes.len(),
            },
        )?;
        Ok(match self.dtype {
            DType::F32 => f32::from_ne_bytes([b[0], b[1], b[2], b[3]]),
            DType::F16 => f16::from_ne_bytes([b[0], b[1]]).to_f32(),
            DType::BF16 => bf16::from_ne_bytes([b[0], b[1]]).to_f32(),
            DType::I8 => b[0] as i8 as f32,
            DType::U8 => b[0] as f32,
        })
    }

    // ==================== Internal helpers ====================

    pub(crate) fn compute_strides_sv(shape: &[usize]) -> TensorShape {
        if shape.is_empty() {
            return SmallVec::new();
        }
        let mut strides = smallvec::smallvec![1usize; shape.len()];
        for i in (0..shape.len() - 1).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    pub(crate) fn normalize_dim(&self, dim: i64) -> TensorResult<usize> {
        let ndim = self.ndim() as i64;
        let normalized = if dim < 0 { dim + ndim } else { dim };
        if normalized >= 0 && normalized < ndim {
            Ok(normalized as usize)
        } else {
            Err(TensorError::InvalidDimension {
                dim,
                ndim: self.ndim(),
            })
        }
    }
}

// ==================== Display ====================

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor(shape={:?}, dtype={:?}, device={:?})",
            self.shape_sv.as_slice(),
            self.dtype,
            self.device
        )
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = Shape::from(self.shape_sv.clone());
        let values = match self.to_vec() {
            Ok(v) => v,
            Err(_) => return write!(f, "Tensor({}, {}, <unreadable>)", shape, self.dtype),
        };
        if values.len() <= 100 {
            write!(f, "Tensor({}, {}, {:?})", shape, self.dtype, values)
        } else {
            let n = values.len();
            write!(
                f,
                "Tensor({}, {}, [{:.4}, {:.4}, ..., {:.4}, {:.4}])",
                shape,
                self.dtype,
                values[0],
                values[1],
                values[n - 2],
                values[n - 1],
            )
        }
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_creation() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.numel(), 4);
        assert_eq!(t.dtype(), DType::F32);
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        let err = Tensor::from_vec(vec![1.0, 2.0, 3.0], vec![2, 2]).unwrap_err();
        assert!(matches!(err, TensorError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_try_new_rejects_short_storage() {
        let err = Tensor::try_new(vec![0u8; 12], vec![2, 2], DType::F32).unwrap_err();
        match err {
            TensorError::StorageTooSmall { required, available } => {
                assert_eq!(required, 16);
                assert_eq!(available, 12);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(Tensor::try_new(vec![0u8; 16], vec![2, 2], DType::F32).is_ok());
    }

    #[test]
    fn test_try_new_overflow() {
        let err = Tensor::try_new(vec![], vec![usize::MAX / 2, 4], DType::F16).unwrap_err();
        assert!(matches!(err, TensorError::Overflow(_)));
    }

    #[test]
    fn test_to_f32_integer_promotion() {
        let i = Tensor::from_i8(vec![-3, 0, 127], vec![3]).unwrap();
        assert_eq!(i.to_vec().unwrap(), vec![-3.0, 0.0, 127.0]);

        let u = Tensor::from_u8(vec![0, 15, 255], vec![3]).unwrap();
        assert_eq!(u.to_vec().unwrap(), vec![0.0, 15.0, 255.0]);
    }

    #[test]
    fn test_f16_roundtrip() {
        let t = Tensor::from_vec(vec![0.5, 1.0, -2.25], vec![3]).unwrap();
        let h = t.to_f16().unwrap();
        assert_eq!(h.dtype(), DType::F16);
        assert_eq!(h.as_raw_bytes().unwrap().len(), 6);
        assert_eq!(h.to_vec().unwrap(), vec![0.5, 1.0, -2.25]);
    }

    #[test]
    fn test_rand_seeded_is_reproducible() {
        let a = Tensor::rand_seeded(vec![8, 8], 42);
        let b = Tensor::rand_seeded(vec![8, 8], 42);
        assert_eq!(a.to_vec().unwrap(), b.to_vec().unwrap());
        assert!(a.to_vec().unwrap().iter().all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn test_get() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        assert_eq!(t.get(&[0, 1]).unwrap(), 2.0);
        assert_eq!(t.get(&[1, 0]).unwrap(), 3.0);
        assert!(t.get(&[2, 0]).is_err());

        let u = Tensor::from_u8(vec![1, 2, 3, 200], vec![2, 2]).unwrap();
        assert_eq!(u.get(&[1, 1]).unwrap(), 200.0);
    }

    #[test]
    fn test_display_small() {
        let t = Tensor::from_vec(vec![1.0, 2.0], vec![2]).unwrap();
        assert_eq!(t.to_string(), "Tensor([2], float32, [1.0, 2.0])");
    }
}
