// CPU storage — typed host buffers
//
// CpuStorage is an enum over Vec<T> for every dtype a descriptor can name.
// The reference kernels compute in f64: they gather a view's elements into
// a Vec<f64> in logical order (following the bound layout and offset),
// compute, and scatter the results back through the output's layout. That
// single path handles every dtype and every stride pattern.

use half::{bf16, f16};

use primcache_core::backend::BackendStorage;
use primcache_core::binding::{TensorMut, TensorRef};
use primcache_core::desc::TensorDesc;
use primcache_core::dtype::{DType, WithDType};
use primcache_core::error::{Error, Result};
use primcache_core::layout::Layout;
use primcache_core::shape::Shape;

/// Host buffer for the CPU backend.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    F16(Vec<f16>),
    BF16(Vec<bf16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    U32(Vec<u32>),
    I64(Vec<i64>),
}

macro_rules! with_typed {
    ($storage:expr, $v:ident => $body:expr) => {
        match $storage {
            CpuStorage::F16($v) => $body,
            CpuStorage::BF16($v) => $body,
            CpuStorage::F32($v) => $body,
            CpuStorage::F64($v) => $body,
            CpuStorage::U8($v) => $body,
            CpuStorage::U32($v) => $body,
            CpuStorage::I64($v) => $body,
        }
    };
}

fn convert<T: WithDType>(data: &[f64]) -> Vec<T> {
    data.iter().map(|&x| T::from_f64(x)).collect()
}

fn gather_typed<T: WithDType>(data: &[T], layout: &Layout, offset: usize) -> Vec<f64> {
    layout
        .strided_indices(offset)
        .map(|i| data[i].to_f64())
        .collect()
}

fn scatter_typed<T: WithDType>(data: &mut [T], layout: &Layout, offset: usize, values: &[f64]) {
    for (i, &v) in layout.strided_indices(offset).zip(values.iter()) {
        data[i] = T::from_f64(v);
    }
}

impl CpuStorage {
    /// Zero-filled buffer of `len` elements.
    pub fn zeros(len: usize, dtype: DType) -> Self {
        Self::from_f64_slice(&vec![0.0; len], dtype)
    }

    /// Buffer holding `data`, rounded to `dtype`.
    pub fn from_f64_slice(data: &[f64], dtype: DType) -> Self {
        match dtype {
            DType::F16 => CpuStorage::F16(convert(data)),
            DType::BF16 => CpuStorage::BF16(convert(data)),
            DType::F32 => CpuStorage::F32(convert(data)),
            DType::F64 => CpuStorage::F64(data.to_vec()),
            DType::U8 => CpuStorage::U8(convert(data)),
            DType::U32 => CpuStorage::U32(convert(data)),
            DType::I64 => CpuStorage::I64(convert(data)),
        }
    }

    /// Whole buffer as f64, in storage order.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        with_typed!(self, v => v.iter().map(|&x| WithDType::to_f64(x)).collect())
    }

    /// Elements of the view `(layout, offset)` in logical order.
    ///
    /// The caller guarantees the view fits (see `ExecArgs::validate`).
    pub fn gather(&self, layout: &Layout, offset: usize) -> Vec<f64> {
        with_typed!(self, v => gather_typed(v, layout, offset))
    }

    /// Write `values` (logical order) through the view `(layout, offset)`.
    pub fn scatter(&mut self, layout: &Layout, offset: usize, values: &[f64]) {
        with_typed!(self, v => scatter_typed(v, layout, offset, values))
    }
}

impl BackendStorage for CpuStorage {
    fn dtype(&self) -> DType {
        match self {
            CpuStorage::F16(_) => DType::F16,
            CpuStorage::BF16(_) => DType::BF16,
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
            CpuStorage::U8(_) => DType::U8,
            CpuStorage::U32(_) => DType::U32,
            CpuStorage::I64(_) => DType::I64,
        }
    }

    fn len(&self) -> usize {
        with_typed!(self, v => v.len())
    }
}

// CpuTensor — host-side tensor used to drive the cache
//
// The core does not own a tensor type; the host framework does. CpuTensor is
// the minimal stand-in: a buffer, a descriptor and an offset, with helpers
// to bind it for one call.

/// A buffer with a descriptor and a view offset.
#[derive(Debug, Clone)]
pub struct CpuTensor {
    storage: CpuStorage,
    desc: TensorDesc,
    offset: usize,
}

impl CpuTensor {
    /// Contiguous tensor from row-major data.
    pub fn from_f64_slice(data: &[f64], shape: impl Into<Shape>, dtype: DType) -> Result<Self> {
        let shape = shape.into();
        if shape.elem_count() != data.len() {
            return Err(Error::msg(format!(
                "shape {shape} needs {} elements, got {}",
                shape.elem_count(),
                data.len()
            )));
        }
        Ok(CpuTensor {
            storage: CpuStorage::from_f64_slice(data, dtype),
            desc: TensorDesc::contiguous(shape, dtype),
            offset: 0,
        })
    }

    pub fn zeros(shape: impl Into<Shape>, dtype: DType) -> Self {
        Self::full(shape, 0.0, dtype)
    }

    pub fn full(shape: impl Into<Shape>, value: f64, dtype: DType) -> Self {
        let desc = TensorDesc::contiguous(shape, dtype);
        CpuTensor {
            storage: CpuStorage::from_f64_slice(&vec![value; desc.elem_count()], dtype),
            desc,
            offset: 0,
        }
    }

    /// Wrap an existing buffer as a view.
    pub fn from_parts(storage: CpuStorage, desc: TensorDesc, offset: usize) -> Self {
        CpuTensor {
            storage,
            desc,
            offset,
        }
    }

    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    pub fn dims(&self) -> &[usize] {
        self.desc.dims()
    }

    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Same buffer, two dimensions swapped in the view.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Self> {
        let layout = self.desc.layout().transpose(dim0, dim1)?;
        Ok(CpuTensor {
            storage: self.storage.clone(),
            desc: TensorDesc::new(self.desc.dtype(), layout),
            offset: self.offset,
        })
    }

    /// Same data, copied into a row-major buffer.
    pub fn contiguous(&self) -> Self {
        let data = self.to_f64_vec();
        CpuTensor {
            storage: CpuStorage::from_f64_slice(&data, self.desc.dtype()),
            desc: self.desc.to_contiguous(),
            offset: 0,
        }
    }

    /// Values in logical (row-major) order.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.storage.gather(self.desc.layout(), self.offset)
    }

    pub fn view(&self) -> TensorRef<'_, CpuStorage> {
        TensorRef::new(&self.storage, &self.desc).with_offset(self.offset)
    }

    pub fn view_mut(&mut self) -> TensorMut<'_, CpuStorage> {
        TensorMut::new(&mut self.storage, &self.desc).with_offset(self.offset)
    }
}
