// Signatures — canonical cache keys for primitive invocations
//
// A signature is a flat sequence of u64 words. Every operator appends, in a
// fixed order, its configuration fields and a fingerprint of each tensor
// descriptor it plans against:
//
//   tensor  → dtype tag, rank, dims[0..rank], strides[0..rank]
//   slice   → length, then each element
//   f32     → exact bit pattern
//
// Everything variable-length carries its length in front, so two different
// invocations can never flatten to the same word sequence. Equality and
// hashing are over the words; `fingerprint` is a short hash for log lines.

use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use smallvec::SmallVec;

use primcache_core::{DType, PropKind, TensorDesc};

/// A value that can be appended to an [`OpSignature`].
pub trait AddSign {
    fn add_to(&self, sig: &mut OpSignature);
}

/// Canonical, hashable key for one primitive invocation.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct OpSignature {
    words: SmallVec<[u64; 32]>,
}

impl OpSignature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one field.
    pub fn add_sign<T: AddSign + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.add_to(self);
        self
    }

    fn push(&mut self, word: u64) {
        self.words.push(word);
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Short hash of the signature, for logging.
    pub fn fingerprint(&self) -> u64 {
        let mut h = FxHasher::default();
        self.words.hash(&mut h);
        h.finish()
    }
}

impl fmt::Debug for OpSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpSignature({:016x}, {} words)", self.fingerprint(), self.len())
    }
}

impl AddSign for u64 {
    fn add_to(&self, sig: &mut OpSignature) {
        sig.push(*self);
    }
}

impl AddSign for usize {
    fn add_to(&self, sig: &mut OpSignature) {
        sig.push(*self as u64);
    }
}

impl AddSign for i64 {
    fn add_to(&self, sig: &mut OpSignature) {
        sig.push(*self as u64);
    }
}

impl AddSign for bool {
    fn add_to(&self, sig: &mut OpSignature) {
        sig.push(*self as u64);
    }
}

// Bit pattern, not value: 1.0 and 1.0000001 must stay apart.
impl AddSign for f32 {
    fn add_to(&self, sig: &mut OpSignature) {
        sig.push(self.to_bits() as u64);
    }
}

impl AddSign for DType {
    fn add_to(&self, sig: &mut OpSignature) {
        sig.push(self.tag());
    }
}

impl AddSign for PropKind {
    fn add_to(&self, sig: &mut OpSignature) {
        let tag = match self {
            PropKind::ForwardTraining => 1,
            PropKind::ForwardInference => 2,
        };
        sig.push(tag);
    }
}

impl AddSign for TensorDesc {
    fn add_to(&self, sig: &mut OpSignature) {
        sig.add_sign(&self.dtype());
        sig.add_sign(&self.rank());
        for &d in self.dims() {
            sig.push(d as u64);
        }
        for &s in self.strides() {
            sig.push(s as u64);
        }
    }
}

impl<T: AddSign> AddSign for [T] {
    fn add_to(&self, sig: &mut OpSignature) {
        sig.add_sign(&self.len());
        for item in self {
            item.add_to(sig);
        }
    }
}

impl<T: AddSign> AddSign for Vec<T> {
    fn add_to(&self, sig: &mut OpSignature) {
        self.as_slice().add_to(sig);
    }
}

impl<T: AddSign + ?Sized> AddSign for &T {
    fn add_to(&self, sig: &mut OpSignature) {
        (**self).add_to(sig);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primcache_core::{Layout, Shape};

    fn sig_of(desc: &TensorDesc) -> OpSignature {
        let mut sig = OpSignature::new();
        sig.add_sign(desc);
        sig
    }

    #[test]
    fn test_deterministic() {
        let d = TensorDesc::contiguous((2, 3), DType::F32);
        assert_eq!(sig_of(&d), sig_of(&d.clone()));
        assert_eq!(sig_of(&d).fingerprint(), sig_of(&d).fingerprint());
    }

    #[test]
    fn test_dtype_shape_and_strides_distinguish() {
        let base = TensorDesc::contiguous((2, 3), DType::F32);
        let other_dtype = TensorDesc::contiguous((2, 3), DType::F16);
        let other_shape = TensorDesc::contiguous((3, 2), DType::F32);
        let strided = TensorDesc::new(
            DType::F32,
            Layout::new(Shape::from((2, 3)), vec![1, 2]).unwrap(),
        );
        assert_ne!(sig_of(&base), sig_of(&other_dtype));
        assert_ne!(sig_of(&base), sig_of(&other_shape));
        assert_ne!(sig_of(&base), sig_of(&strided));
    }

    #[test]
    fn test_length_prefix_keeps_lists_apart() {
        // [2] ++ [3, 4] vs [2, 3] ++ [4]
        let mut a = OpSignature::new();
        a.add_sign(&vec![2usize]).add_sign(&vec![3usize, 4]);
        let mut b = OpSignature::new();
        b.add_sign(&vec![2usize, 3]).add_sign(&vec![4usize]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_float_bits() {
        let mut a = OpSignature::new();
        a.add_sign(&1.0f32);
        let mut b = OpSignature::new();
        b.add_sign(&1.000_000_1f32);
        assert_ne!(a, b);
    }
}
