//! # primcache
//!
//! Cached, pre-planned backend primitives for softmax (with optional
//! temperature) and concat/stack.
//!
//! Planning a backend primitive is expensive compared to running it. This
//! crate turns an operator call (parameters + tensor descriptors) into a
//! canonical [`OpSignature`], keeps one built entry per signature in a
//! per-worker [`PrimitiveContext`], and binds that entry to the call's
//! buffers every time it runs.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use primcache::prelude::*;
//! use primcache_cpu::{CpuBackend, CpuStream, CpuTensor};
//!
//! let mut ctx = PrimitiveContext::new(CpuBackend::new(), CpuStream::new(0));
//! let x = CpuTensor::from_f64_slice(&[1.0, 2.0, 3.0], 3, DType::F32)?;
//! let mut y = CpuTensor::zeros(3, DType::F32);
//! softmax_forward(
//!     &mut ctx,
//!     &SoftmaxParam::new(-1),
//!     SoftmaxFwdTensors::new(x.view(), y.view_mut()),
//!     false,
//! )?;
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `primcache-core` | TensorDesc, Layout, DType, Plan/OpDesc, bindings, Backend trait, Error |
//! | `primcache-cpu` | Reference CPU backend with counters |
//! | `primcache` | Signatures, caches, context, softmax and concat operators |
//!
//! ## Modules
//!
//! - [`signature`] — canonical cache keys
//! - [`cache`] — signature → entry memoization
//! - [`context`] — per-worker owner of backend, stream and caches
//! - [`config`] — cache and validation switches
//! - [`softmax`] — forward/backward softmax with temperature
//! - [`concat`] — concat and stack
//! - [`support`] — routing predicates for hosts

/// Re-export core types.
pub use primcache_core::{
    normalize_axis, ArgKind, Backend, BackendStorage, BackendStream, DType, Error, ErrorKind,
    ExecArgs, Layout, Plan, PrimitiveKind, PropKind, Result, Shape, TensorDesc, TensorMut,
    TensorRef,
};

/// Signature builder — canonical keys for cache lookups.
pub mod signature;

/// Primitive cache — one memoization table per operator.
pub mod cache;

/// Context configuration.
pub mod config;

/// Execution context — backend, stream and caches of one worker.
pub mod context;

/// Softmax — forward and backward, optionally temperature scaled.
pub mod softmax;

/// Concat and stack — one fused N-input primitive.
pub mod concat;

/// Support predicates for host dispatch.
pub mod support;

pub use cache::{CacheStats, PrimitiveCache};
pub use concat::{concat_forward, stack_forward, ConcatForward, ConcatMode, ConcatParam};
pub use config::ContextConfig;
pub use context::{ContextStats, PrimitiveContext, Stage};
pub use signature::{AddSign, OpSignature};
pub use softmax::{
    softmax_backward, softmax_forward, SoftmaxBackward, SoftmaxBwdTensors, SoftmaxChain,
    SoftmaxForward, SoftmaxFwdTensors, SoftmaxParam, WriteReq,
};
pub use support::{supports_concat, supports_softmax};

/// Everything a host needs to drive the cache.
pub mod prelude {
    pub use crate::{
        concat_forward, softmax_backward, softmax_forward, stack_forward, supports_concat,
        supports_softmax, Backend, ConcatForward, ConcatParam, ContextConfig, DType,
        PrimitiveContext, SoftmaxBackward, SoftmaxBwdTensors, SoftmaxForward, SoftmaxFwdTensors,
        SoftmaxParam, TensorDesc, TensorMut, TensorRef, WriteReq,
    };
}
