//! Tensor type shared by the encoders, the inference adapter and the decoders
//!
//! A [`Tensor`] owns a contiguous, row-major buffer together with its shape and
//! element type. Buffers are backed by [`ndarray::ArrayD`], so the element count
//! always equals the product of the shape dimensions.

use std::collections::HashMap;
use std::fmt;

use ndarray::{ArrayD, IxDyn};

use crate::error::{OcrError, OcrResult};

/// Named tensors, as consumed and produced by an inference call
pub type TensorMap = HashMap<String, Tensor>;

/// Tensor element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// 32-bit float
    F32,
    /// 64-bit signed integer
    I64,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::F32 => write!(f, "float32"),
            ElementType::I64 => write!(f, "int64"),
        }
    }
}

/// Tensor storage
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(ArrayD<f32>),
    I64(ArrayD<i64>),
}

/// Shaped numeric buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: TensorData,
}

impl Tensor {
    /// Create a float tensor from a shape and a row-major buffer
    pub fn from_f32(shape: &[usize], data: Vec<f32>) -> OcrResult<Self> {
        let len = data.len();
        let array = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| {
            OcrError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![len],
            }
        })?;
        Ok(Self::from(array))
    }

    /// Create an integer tensor from a shape and a row-major buffer
    pub fn from_i64(shape: &[usize], data: Vec<i64>) -> OcrResult<Self> {
        let len = data.len();
        let array = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| {
            OcrError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![len],
            }
        })?;
        Ok(Self::from(array))
    }

    /// Zero-filled float tensor
    pub fn zeros_f32(shape: &[usize]) -> Self {
        Self::from(ArrayD::<f32>::zeros(IxDyn(shape)))
    }

    /// Tensor shape
    pub fn shape(&self) -> &[usize] {
        match &self.data {
            TensorData::F32(a) => a.shape(),
            TensorData::I64(a) => a.shape(),
        }
    }

    /// Element type
    pub fn element_type(&self) -> ElementType {
        match &self.data {
            TensorData::F32(_) => ElementType::F32,
            TensorData::I64(_) => ElementType::I64,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match &self.data {
            TensorData::F32(a) => a.len(),
            TensorData::I64(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Underlying storage
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Borrow as a float array, failing on any other element type
    pub fn as_f32(&self) -> OcrResult<&ArrayD<f32>> {
        match &self.data {
            TensorData::F32(a) => Ok(a),
            TensorData::I64(_) => Err(self.dtype_mismatch(ElementType::F32)),
        }
    }

    /// Borrow as an integer array, failing on any other element type
    pub fn as_i64(&self) -> OcrResult<&ArrayD<i64>> {
        match &self.data {
            TensorData::I64(a) => Ok(a),
            TensorData::F32(_) => Err(self.dtype_mismatch(ElementType::I64)),
        }
    }

    /// Flat row-major float buffer
    pub fn as_f32_slice(&self) -> OcrResult<&[f32]> {
        let array = self.as_f32()?;
        array.as_slice().ok_or_else(|| {
            OcrError::PostprocessError("float tensor is not contiguous".to_string())
        })
    }

    /// Flat row-major integer buffer
    pub fn as_i64_slice(&self) -> OcrResult<&[i64]> {
        let array = self.as_i64()?;
        array.as_slice().ok_or_else(|| {
            OcrError::PostprocessError("integer tensor is not contiguous".to_string())
        })
    }

    /// Split into shape and owned row-major buffer
    pub fn into_f32_parts(self) -> OcrResult<(Vec<usize>, Vec<f32>)> {
        match self.data {
            TensorData::F32(a) => {
                let shape = a.shape().to_vec();
                let a = if a.is_standard_layout() {
                    a
                } else {
                    a.as_standard_layout().into_owned()
                };
                let (data, _offset) = a.into_raw_vec_and_offset();
                Ok((shape, data))
            }
            TensorData::I64(_) => Err(OcrError::DtypeMismatch {
                expected: ElementType::F32,
                got: ElementType::I64,
            }),
        }
    }

    /// Split into shape and owned row-major buffer
    pub fn into_i64_parts(self) -> OcrResult<(Vec<usize>, Vec<i64>)> {
        match self.data {
            TensorData::I64(a) => {
                let shape = a.shape().to_vec();
                let a = if a.is_standard_layout() {
                    a
                } else {
                    a.as_standard_layout().into_owned()
                };
                let (data, _offset) = a.into_raw_vec_and_offset();
                Ok((shape, data))
            }
            TensorData::F32(_) => Err(OcrError::DtypeMismatch {
                expected: ElementType::I64,
                got: ElementType::F32,
            }),
        }
    }

    /// Size of the last dimension, if the tensor has any
    pub fn last_dim(&self) -> Option<usize> {
        self.shape().last().copied()
    }

    fn dtype_mismatch(&self, expected: ElementType) -> OcrError {
        OcrError::DtypeMismatch {
            expected,
            got: self.element_type(),
        }
    }
}

impl From<ArrayD<f32>> for Tensor {
    fn from(array: ArrayD<f32>) -> Self {
        Self {
            data: TensorData::F32(array),
        }
    }
}

impl From<ArrayD<i64>> for Tensor {
    fn from(array: ArrayD<i64>) -> Self {
        Self {
            data: TensorData::I64(array),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_f32_shape_and_len() {
        let t = Tensor::from_f32(&[1, 2, 3], vec![0.0; 6]).unwrap();
        assert_eq!(t.shape(), &[1, 2, 3]);
        assert_eq!(t.len(), 6);
        assert_eq!(t.element_type(), ElementType::F32);
        assert_eq!(t.last_dim(), Some(3));
    }

    #[test]
    fn test_from_f32_rejects_wrong_length() {
        let err = Tensor::from_f32(&[2, 2], vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, OcrError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_from_i64_rejects_wrong_length() {
        assert!(Tensor::from_i64(&[4], vec![1, 2]).is_err());
    }

    #[test]
    fn test_dtype_checked_accessors() {
        let t = Tensor::from_i64(&[3], vec![1, 2, 3]).unwrap();
        assert_eq!(t.as_i64_slice().unwrap(), &[1, 2, 3]);

        let err = t.as_f32().unwrap_err();
        assert!(matches!(
            err,
            OcrError::DtypeMismatch {
                expected: ElementType::F32,
                got: ElementType::I64
            }
        ));
    }

    #[test]
    fn test_zeros() {
        let t = Tensor::zeros_f32(&[1, 3, 4, 4]);
        assert_eq!(t.len(), 48);
        assert!(t.as_f32_slice().unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_into_parts_round_trip() {
        let t = Tensor::from_f32(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let (shape, data) = t.into_f32_parts().unwrap();
        assert_eq!(shape, vec![2, 2]);
        assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_empty_tensor() {
        let t = Tensor::from_f32(&[1, 0, 6], vec![]).unwrap();
        assert!(t.is_empty());
    }
}
