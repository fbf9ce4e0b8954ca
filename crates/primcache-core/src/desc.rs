use std::fmt;

use crate::dtype::DType;
use crate::error::Result;
use crate::layout::Layout;
use crate::shape::Shape;

/// Memory descriptor of a tensor: element type plus layout.
///
/// This is everything a backend needs to plan a primitive over a tensor,
/// and everything the signature builder fingerprints. Descriptors are
/// small and cloned freely into plans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorDesc {
    dtype: DType,
    layout: Layout,
}

impl TensorDesc {
    pub fn new(dtype: DType, layout: Layout) -> Self {
        TensorDesc { dtype, layout }
    }

    /// Descriptor of a row-major tensor.
    pub fn contiguous(shape: impl Into<Shape>, dtype: DType) -> Self {
        TensorDesc {
            dtype,
            layout: Layout::contiguous(shape.into()),
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn shape(&self) -> &Shape {
        self.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.layout.dims()
    }

    pub fn strides(&self) -> &[usize] {
        self.layout.strides()
    }

    pub fn rank(&self) -> usize {
        self.layout.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.layout.elem_count()
    }

    /// Same logical tensor (shape and dtype), regardless of strides.
    pub fn same_logical(&self, other: &TensorDesc) -> bool {
        self.dtype == other.dtype && self.shape() == other.shape()
    }

    /// Descriptor viewed with a size-1 dimension inserted before `axis`.
    pub fn with_unit_dim(&self, axis: usize) -> Result<TensorDesc> {
        Ok(TensorDesc {
            dtype: self.dtype,
            layout: self.layout.with_unit_dim(axis)?,
        })
    }

    /// Row-major descriptor with this one's shape and dtype.
    pub fn to_contiguous(&self) -> TensorDesc {
        TensorDesc::contiguous(self.shape().clone(), self.dtype)
    }
}

impl fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape())?;
        if !self.layout.is_contiguous() {
            write!(f, " strides={:?}", self.strides())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let d = TensorDesc::contiguous((2, 3), DType::F32);
        assert_eq!(d.to_string(), "f32[2, 3]");
        let t = TensorDesc::new(DType::F32, d.layout().transpose(0, 1).unwrap());
        assert_eq!(t.to_string(), "f32[3, 2] strides=[1, 3]");
    }

    #[test]
    fn test_same_logical_ignores_strides() {
        let a = TensorDesc::contiguous((2, 2), DType::F32);
        let b = TensorDesc::new(DType::F32, a.layout().transpose(0, 1).unwrap());
        assert!(a.same_logical(&b));
        assert_ne!(a, b);
        assert!(!a.same_logical(&TensorDesc::contiguous((2, 2), DType::F64)));
    }
}
