use std::borrow::Cow;

use crate::backend::BackendStorage;
use crate::desc::TensorDesc;
use crate::error::{Error, Result};
use crate::plan::{ArgKind, Plan};

// Bindings — live buffers attached to a plan for a single call
//
// A binding pairs a backend buffer with the descriptor it is read or written
// through and the element offset where the view starts. Bindings are the
// only per-call state in the execution path: plans and primitives are
// reused, bindings are built, consumed and dropped on every invocation.
//
// The descriptor is a `Cow` because stacking binds each input through a
// synthesized descriptor (the input's own layout grown by a unit dim).

/// Read-only view of a buffer for one call.
#[derive(Debug)]
pub struct TensorRef<'a, S> {
    pub storage: &'a S,
    pub desc: Cow<'a, TensorDesc>,
    pub offset: usize,
}

/// Writable view of a buffer for one call.
#[derive(Debug)]
pub struct TensorMut<'a, S> {
    pub storage: &'a mut S,
    pub desc: Cow<'a, TensorDesc>,
    pub offset: usize,
}

// Manual impls: derive would require `S: Clone`.
impl<S> Clone for TensorRef<'_, S> {
    fn clone(&self) -> Self {
        TensorRef {
            storage: self.storage,
            desc: self.desc.clone(),
            offset: self.offset,
        }
    }
}

impl<'a, S> TensorRef<'a, S> {
    pub fn new(storage: &'a S, desc: &'a TensorDesc) -> Self {
        TensorRef {
            storage,
            desc: Cow::Borrowed(desc),
            offset: 0,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Rebind the same buffer under another descriptor.
    pub fn with_desc(&self, desc: TensorDesc) -> TensorRef<'a, S> {
        TensorRef {
            storage: self.storage,
            desc: Cow::Owned(desc),
            offset: self.offset,
        }
    }
}

impl<'a, S> TensorMut<'a, S> {
    pub fn new(storage: &'a mut S, desc: &'a TensorDesc) -> Self {
        TensorMut {
            storage,
            desc: Cow::Borrowed(desc),
            offset: 0,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Reborrow for a shorter call without giving the binding away.
    pub fn reborrow(&mut self) -> TensorMut<'_, S> {
        TensorMut {
            storage: &mut *self.storage,
            desc: Cow::Borrowed(&*self.desc),
            offset: self.offset,
        }
    }
}

/// All bindings of one primitive execution: any number of inputs and the
/// single written argument.
#[derive(Debug)]
pub struct ExecArgs<'a, S> {
    pub srcs: Vec<(ArgKind, TensorRef<'a, S>)>,
    pub dst: (ArgKind, TensorMut<'a, S>),
}

impl<'a, S> ExecArgs<'a, S> {
    pub fn new(dst_kind: ArgKind, dst: TensorMut<'a, S>) -> Self {
        ExecArgs {
            srcs: Vec::new(),
            dst: (dst_kind, dst),
        }
    }

    pub fn with_src(mut self, kind: ArgKind, src: TensorRef<'a, S>) -> Self {
        self.srcs.push((kind, src));
        self
    }

    /// Input bound to `kind`.
    pub fn src(&self, kind: ArgKind) -> Result<&TensorRef<'a, S>> {
        self.srcs
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, t)| t)
            .ok_or_else(|| Error::binding(kind, "argument not bound"))
    }
}

impl<S: BackendStorage> TensorRef<'_, S> {
    /// Check this binding against the descriptor planned for slot `kind`.
    pub fn check(&self, kind: ArgKind, planned: &TensorDesc) -> Result<()> {
        check_binding(kind, planned, &self.desc, self.offset, self.storage)
    }
}

impl<S: BackendStorage> TensorMut<'_, S> {
    /// Check this binding against the descriptor planned for slot `kind`.
    pub fn check(&self, kind: ArgKind, planned: &TensorDesc) -> Result<()> {
        check_binding(kind, planned, &self.desc, self.offset, &*self.storage)
    }
}

impl<S: BackendStorage> ExecArgs<'_, S> {
    /// Check every bound tensor against the plan's slots.
    ///
    /// A bound tensor must have the planned shape and dtype, and its view
    /// must fit inside its buffer. Strides are free to differ from the plan
    /// for outputs (they are not part of any signature), and backends read
    /// through the bound layout.
    pub fn validate(&self, plan: &Plan) -> Result<()> {
        for (kind, desc) in plan.input_args() {
            self.src(kind)?.check(kind, desc)?;
        }
        let (kind, dst) = &self.dst;
        if *kind != plan.output_arg() {
            return Err(Error::binding(
                kind,
                format!("{} writes {}", plan.kind(), plan.output_arg()),
            ));
        }
        dst.check(*kind, plan.output_desc())
    }
}

fn check_binding<S: BackendStorage>(
    kind: ArgKind,
    planned: &TensorDesc,
    bound: &TensorDesc,
    offset: usize,
    storage: &S,
) -> Result<()> {
    if !planned.same_logical(bound) {
        return Err(Error::binding(
            kind,
            format!("planned for {planned}, bound to {bound}"),
        ));
    }
    if storage.dtype() != bound.dtype() {
        return Err(Error::binding(
            kind,
            format!(
                "buffer holds {} but descriptor says {}",
                storage.dtype(),
                bound.dtype()
            ),
        ));
    }
    let span = bound.layout().span();
    let needed = offset.checked_add(span).ok_or_else(|| {
        Error::binding(kind, format!("offset {offset} + span {span} overflows"))
    })?;
    if needed > storage.len() {
        return Err(Error::binding(
            kind,
            format!("view needs {needed} elements, buffer has {}", storage.len()),
        ));
    }
    Ok(())
}
