//! # primcache-core
//!
//! Descriptor types, plans, bindings and the backend trait shared by the
//! primitive cache and its backends.
//!
//! - [`TensorDesc`] — dtype + [`Layout`] (shape and strides) of a tensor
//! - [`OpDesc`] / [`Plan`] — primitive requests and the backend's resolved answer
//! - [`TensorRef`] / [`TensorMut`] / [`ExecArgs`] — per-call buffer bindings
//! - [`Backend`] trait — plan, instantiate, allocate, execute
//! - [`Error`] / [`ErrorKind`] — configuration, planning and execution failures

pub mod backend;
pub mod binding;
pub mod desc;
pub mod dtype;
pub mod error;
pub mod layout;
pub mod plan;
pub mod shape;

pub use backend::{Backend, BackendStorage, BackendStream};
pub use binding::{ExecArgs, TensorMut, TensorRef};
pub use desc::TensorDesc;
pub use dtype::{DType, WithDType};
pub use error::{Error, ErrorKind, Result};
pub use layout::Layout;
pub use plan::{ArgKind, EltwiseAlg, OpDesc, Plan, PrimitiveKind, PropKind};
pub use shape::{normalize_axis, Shape};
