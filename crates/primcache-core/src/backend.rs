use std::fmt;

use crate::binding::ExecArgs;
use crate::desc::TensorDesc;
use crate::dtype::DType;
use crate::error::Result;
use crate::plan::{OpDesc, Plan};

// Backend — the primitive-planning collaborator
//
// The cache never computes anything itself. It asks a backend three things:
//
//   plan         OpDesc → Plan         expensive, may refuse (planning error)
//   instantiate  Plan   → Primitive    cheap, done once per cache entry
//   execute      Primitive + bindings  per call, submitted to a stream
//
// plus `alloc` for the scratch buffers a multi-stage chain needs between
// stages.
//
// WHY A TRAIT?
//
// Backends are separate crates (the reference CPU backend lives in
// primcache-cpu) with their own buffer and primitive types. Associated types
// keep those concrete, so cache entries hold `B::Primitive` directly and
// nothing is boxed on the execution path.

/// An ordered execution queue. Primitives submitted to the same stream run
/// in submission order; `wait` blocks until all of them have finished.
pub trait BackendStream: fmt::Debug {
    /// A human-readable name for this stream (e.g. "cpu:0").
    fn name(&self) -> String;

    fn wait(&mut self) -> Result<()>;
}

/// A buffer that holds tensor data for a backend.
pub trait BackendStorage: fmt::Debug + Send + Sync + 'static {
    fn dtype(&self) -> DType;

    /// Number of elements in the buffer.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A primitive-planning backend.
pub trait Backend: Clone + fmt::Debug + 'static {
    type Storage: BackendStorage;
    type Stream: BackendStream;
    /// Executable primitive, stateless with respect to data.
    type Primitive: fmt::Debug + Send + Sync;

    fn name(&self) -> String;

    /// Produce an immutable plan, or a planning error if this backend cannot
    /// compute the request for these descriptors.
    fn plan(&self, op: &OpDesc<'_>) -> Result<Plan>;

    /// Build an executable primitive from a plan this backend produced.
    fn instantiate(&self, plan: &Plan) -> Result<Self::Primitive>;

    /// Allocate a buffer able to hold a tensor with descriptor `desc`.
    /// Contents are unspecified.
    fn alloc(&self, desc: &TensorDesc) -> Result<Self::Storage>;

    /// Run `primitive` with `args` bound to its slots, ordered on `stream`.
    fn execute(
        &self,
        primitive: &Self::Primitive,
        args: ExecArgs<'_, Self::Storage>,
        stream: &mut Self::Stream,
    ) -> Result<()>;
}
