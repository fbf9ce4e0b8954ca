// Support predicates — should a host route this call through the cache?
//
// The backend decides what it can plan; these predicates give hosts a cheap
// answer up front, so unsupported calls go to a fallback implementation
// instead of failing at planning time.

use primcache_core::{DType, Error, Result, TensorDesc};

/// Highest rank the predicates accept.
pub const MAX_SUPPORTED_RANK: usize = 6;

fn supported_desc(desc: &TensorDesc) -> bool {
    matches!(
        desc.dtype(),
        DType::F32 | DType::BF16 | DType::F16 | DType::F64
    ) && (1..=MAX_SUPPORTED_RANK).contains(&desc.rank())
        && desc.elem_count() > 0
}

/// True if softmax from `data` into `out` can be served by this crate.
pub fn supports_softmax(data: &TensorDesc, out: &TensorDesc) -> bool {
    supported_desc(data) && data.same_logical(out)
}

/// True if concatenating or stacking `inputs` can be served by this crate.
pub fn supports_concat(inputs: &[TensorDesc]) -> bool {
    !inputs.is_empty() && inputs.iter().all(supported_desc)
}

/// Configuration check: `got` must have the dtype and shape of `expected`.
pub(crate) fn ensure_same_logical(expected: &TensorDesc, got: &TensorDesc) -> Result<()> {
    if expected.dtype() != got.dtype() {
        return Err(Error::DTypeMismatch {
            expected: expected.dtype(),
            got: got.dtype(),
        });
    }
    if expected.shape() != got.shape() {
        return Err(Error::ShapeMismatch {
            expected: expected.shape().clone(),
            got: got.shape().clone(),
        });
    }
    Ok(())
}
