use crate::error::{Error, Result};
use crate::shape::Shape;

// Layout — shape plus the stride pattern that maps it onto a flat buffer
//
// The layout is the "memory format" half of a tensor descriptor. Two tensors
// with the same shape but different strides (e.g. a transposed view) need
// different plans, so strides take part in every cache signature.
//
// The starting offset inside the buffer is deliberately NOT part of the
// layout: it belongs to the binding of one call (see `binding.rs`), so a
// plan built for one view can run against another view with the same
// strides at a different position in the same buffer.

/// Shape + strides (in elements).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    shape: Shape,
    strides: Vec<usize>,
}

impl Layout {
    /// Row-major layout for `shape`.
    pub fn contiguous(shape: Shape) -> Self {
        let strides = shape.stride_contiguous();
        Layout { shape, strides }
    }

    /// Layout with explicit strides. The stride count must match the rank.
    pub fn new(shape: Shape, strides: Vec<usize>) -> Result<Self> {
        if strides.len() != shape.rank() {
            return Err(Error::RankMismatch {
                expected: shape.rank(),
                got: strides.len(),
            });
        }
        Ok(Layout { shape, strides })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    pub fn is_contiguous(&self) -> bool {
        self.strides == self.shape.stride_contiguous()
    }

    /// Number of buffer elements a view with this layout touches, counted
    /// from its first element: `1 + sum((dim - 1) * stride)`.
    pub fn span(&self) -> usize {
        if self.elem_count() == 0 {
            return 0;
        }
        1 + self
            .dims()
            .iter()
            .zip(self.strides.iter())
            .map(|(&d, &s)| (d - 1) * s)
            .sum::<usize>()
    }

    /// Swap two dimensions (and their strides). No data moves.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Layout> {
        let rank = self.rank();
        if dim0 >= rank || dim1 >= rank {
            return Err(Error::DimOutOfRange {
                dim: dim0.max(dim1),
                rank,
            });
        }
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        dims.swap(dim0, dim1);
        strides.swap(dim0, dim1);
        Ok(Layout {
            shape: Shape::new(dims),
            strides,
        })
    }

    /// View the same memory with a size-1 dimension inserted before `axis`.
    ///
    /// The new dimension gets the stride it would have in a contiguous
    /// tensor of the grown shape, so contiguous inputs stay contiguous.
    pub fn with_unit_dim(&self, axis: usize) -> Result<Layout> {
        let shape = self.shape.with_unit_dim(axis)?;
        let stride = if axis < self.rank() {
            self.strides[axis] * self.dims()[axis]
        } else {
            1
        };
        let mut strides = self.strides.clone();
        strides.insert(axis, stride);
        Ok(Layout { shape, strides })
    }

    /// Flat position of a multi-dimensional index, relative to `offset`.
    pub fn flat_index(&self, offset: usize, index: &[usize]) -> usize {
        offset
            + index
                .iter()
                .zip(self.strides.iter())
                .map(|(&i, &s)| i * s)
                .sum::<usize>()
    }

    /// Flat positions of every element, in logical (row-major) order.
    pub fn strided_indices(&self, offset: usize) -> StridedIter {
        StridedIter::new(self, offset)
    }
}

// StridedIter — walks a layout in logical order, yielding buffer positions
//
// Kernels gather an axis' worth of values through this iterator and scatter
// results back the same way, which is what lets them accept transposed or
// otherwise non-contiguous views without a copy.

/// Iterator over the buffer positions of a layout.
pub struct StridedIter {
    current: Vec<usize>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    position: usize,
    remaining: usize,
    started: bool,
}

impl StridedIter {
    fn new(layout: &Layout, offset: usize) -> Self {
        StridedIter {
            current: vec![0; layout.rank()],
            dims: layout.dims().to_vec(),
            strides: layout.strides().to_vec(),
            position: offset,
            remaining: layout.elem_count(),
            started: false,
        }
    }

    // Odometer step on the rightmost dimension, keeping `position` in sync.
    fn advance(&mut self) {
        for i in (0..self.dims.len()).rev() {
            self.current[i] += 1;
            self.position += self.strides[i];
            if self.current[i] < self.dims[i] {
                return;
            }
            self.position -= self.current[i] * self.strides[i];
            self.current[i] = 0;
        }
    }
}

impl Iterator for StridedIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        if self.started {
            self.advance();
        }
        self.started = true;
        self.remaining -= 1;
        Some(self.position)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_indices() {
        let layout = Layout::contiguous(Shape::from((2, 3)));
        assert!(layout.is_contiguous());
        let idx: Vec<usize> = layout.strided_indices(0).collect();
        assert_eq!(idx, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_transposed_indices_with_offset() {
        let layout = Layout::contiguous(Shape::from((2, 3)))
            .transpose(0, 1)
            .unwrap();
        assert!(!layout.is_contiguous());
        assert_eq!(layout.dims(), &[3, 2]);
        let idx: Vec<usize> = layout.strided_indices(10).collect();
        assert_eq!(idx, vec![10, 13, 11, 14, 12, 15]);
    }

    #[test]
    fn test_span() {
        assert_eq!(Layout::contiguous(Shape::from((2, 3))).span(), 6);
        let t = Layout::contiguous(Shape::from((2, 3))).transpose(0, 1).unwrap();
        assert_eq!(t.span(), 6);
        let padded = Layout::new(Shape::from((2, 3)), vec![8, 1]).unwrap();
        assert_eq!(padded.span(), 11);
        assert_eq!(Layout::contiguous(Shape::from((0, 3))).span(), 0);
    }

    #[test]
    fn test_with_unit_dim_keeps_contiguity() {
        let layout = Layout::contiguous(Shape::from((2, 3)));
        for axis in 0..=2 {
            let grown = layout.with_unit_dim(axis).unwrap();
            assert!(grown.is_contiguous(), "axis {axis}: {:?}", grown);
            assert_eq!(grown.elem_count(), 6);
        }
    }

    #[test]
    fn test_new_rejects_stride_rank_mismatch() {
        assert!(Layout::new(Shape::from((2, 3)), vec![1]).is_err());
    }

    #[test]
    fn test_flat_index() {
        let layout = Layout::contiguous(Shape::from((2, 3, 4)));
        assert_eq!(layout.flat_index(0, &[1, 2, 3]), 23);
        assert_eq!(layout.flat_index(5, &[0, 0, 0]), 5);
    }
}
