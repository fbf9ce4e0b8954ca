use std::fmt;

// DType — Element types a tensor descriptor can carry
//
// Softmax and concat primitives are planned for floating-point data only,
// but descriptors still need to name integer types: the host framework hands
// us whatever it has, and rejecting an unsupported dtype is the backend's
// job (a planning error), not the descriptor's.
//
//   F16 / BF16 — half-precision storage, computed in f32 or wider
//   F32        — the common case
//   F64        — reference precision, used heavily by tests
//   U8 / U32 / I64 — masks and indices; never plannable here

/// Element data type of a tensor descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
    U8,
    U32,
    I64,
}

impl DType {
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }

    /// Whether this is a half-precision type (F16 or BF16).
    pub fn is_half(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16)
    }

    /// Stable numeric tag, used when a dtype is folded into a cache signature.
    pub fn tag(&self) -> u64 {
        match self {
            DType::F16 => 1,
            DType::BF16 => 2,
            DType::F32 => 3,
            DType::F64 => 4,
            DType::U8 => 5,
            DType::U32 => 6,
            DType::I64 => 7,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::U8 => "u8",
            DType::U32 => "u32",
            DType::I64 => "i64",
        };
        write!(f, "{}", s)
    }
}

// WithDType — maps a Rust element type to its DType
//
// Backends keep typed buffers (Vec<f32>, Vec<bf16>, ...) and run their
// reference arithmetic in f64. This trait is the bridge in both directions.

/// Rust element types that can back a tensor buffer.
pub trait WithDType: Copy + Send + Sync + 'static + fmt::Debug {
    const DTYPE: DType;

    fn to_f64(self) -> f64;

    fn from_f64(v: f64) -> Self;
}

impl WithDType for f32 {
    const DTYPE: DType = DType::F32;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl WithDType for f64 {
    const DTYPE: DType = DType::F64;
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
}

impl WithDType for half::f16 {
    const DTYPE: DType = DType::F16;
    fn to_f64(self) -> f64 {
        self.to_f64()
    }
    fn from_f64(v: f64) -> Self {
        half::f16::from_f64(v)
    }
}

impl WithDType for half::bf16 {
    const DTYPE: DType = DType::BF16;
    fn to_f64(self) -> f64 {
        self.to_f64()
    }
    fn from_f64(v: f64) -> Self {
        half::bf16::from_f64(v)
    }
}

impl WithDType for u8 {
    const DTYPE: DType = DType::U8;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as u8
    }
}

impl WithDType for u32 {
    const DTYPE: DType = DType::U32;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as u32
    }
}

impl WithDType for i64 {
    const DTYPE: DType = DType::I64;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_classification() {
        assert!(DType::F32.is_float());
        assert!(DType::BF16.is_float());
        assert!(!DType::U8.is_float());
        assert!(!DType::I64.is_float());
        assert!(DType::F16.is_half());
        assert!(!DType::F64.is_half());
    }

    #[test]
    fn test_tags_are_distinct() {
        let all = [
            DType::F16,
            DType::BF16,
            DType::F32,
            DType::F64,
            DType::U8,
            DType::U32,
            DType::I64,
        ];
        let mut tags: Vec<u64> = all.iter().map(|d| d.tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), all.len());
    }

    #[test]
    fn test_bf16_conversion() {
        let v = half::bf16::from_f64(1.5);
        assert_eq!(WithDType::to_f64(v), 1.5);
        assert_eq!(<half::bf16 as WithDType>::DTYPE, DType::BF16);
    }
}
