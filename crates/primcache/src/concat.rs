// Concat / Stack — one fused N-input primitive
//
// Concat joins inputs along an existing axis; every other dim must agree.
// Stack joins identically shaped inputs along a new axis. Both plan a single
// backend concat: for stack, each input is described with a size-1 dim
// inserted at the stack axis, so
//
//   stack([a, b], axis) == concat([a.unsqueeze(axis), b.unsqueeze(axis)], axis)
//
// and the same descriptors are used again when binding the inputs at
// execute time.
//
// Shape problems are configuration errors, reported before the backend is
// asked for anything.

use std::sync::Arc;

use primcache_core::{
    normalize_axis, ArgKind, Backend, Error, ExecArgs, OpDesc, Result, TensorDesc, TensorMut,
    TensorRef,
};

use crate::context::{PrimitiveContext, Stage};
use crate::signature::{AddSign, OpSignature};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcatMode {
    /// Join along an existing axis.
    Concat,
    /// Join along a new axis.
    Stack,
}

impl ConcatMode {
    fn name(&self) -> &'static str {
        match self {
            ConcatMode::Concat => "concat",
            ConcatMode::Stack => "stack",
        }
    }
}

impl AddSign for ConcatMode {
    fn add_to(&self, sig: &mut OpSignature) {
        let tag: u64 = match self {
            ConcatMode::Concat => 1,
            ConcatMode::Stack => 2,
        };
        sig.add_sign(&tag);
    }
}

/// Concat/stack operator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcatParam {
    /// Signed axis. For stack it indexes the output, so it ranges over
    /// `[-(rank + 1), rank]` of the inputs.
    pub axis: i64,
    pub mode: ConcatMode,
}

impl ConcatParam {
    pub fn concat(axis: i64) -> Self {
        ConcatParam {
            axis,
            mode: ConcatMode::Concat,
        }
    }

    pub fn stack(axis: i64) -> Self {
        ConcatParam {
            axis,
            mode: ConcatMode::Stack,
        }
    }
}

/// Validate `inputs` for `param` and return the normalized axis.
fn resolve_axis(param: &ConcatParam, inputs: &[&TensorDesc]) -> Result<usize> {
    let first = match inputs.first() {
        Some(first) => *first,
        None => {
            return Err(Error::EmptyInputs {
                op: param.mode.name(),
            })
        }
    };
    let rank = first.rank();
    let axis = match param.mode {
        ConcatMode::Concat => normalize_axis(param.axis, rank)?,
        ConcatMode::Stack => normalize_axis(param.axis, rank + 1)?,
    };

    for (j, desc) in inputs.iter().enumerate().skip(1) {
        if desc.rank() != rank {
            return Err(Error::RankMismatch {
                expected: rank,
                got: desc.rank(),
            });
        }
        if desc.dtype() != first.dtype() {
            return Err(Error::DTypeMismatch {
                expected: first.dtype(),
                got: desc.dtype(),
            });
        }
        match param.mode {
            ConcatMode::Concat => {
                let mismatch = first
                    .dims()
                    .iter()
                    .zip(desc.dims())
                    .enumerate()
                    .find(|&(d, (a, b))| d != axis && a != b);
                if let Some((dim, (&expected, &got))) = mismatch {
                    return Err(Error::ConcatDimMismatch {
                        input: j,
                        dim,
                        expected,
                        got,
                    });
                }
            }
            ConcatMode::Stack => {
                if desc.shape() != first.shape() {
                    return Err(Error::ShapeMismatch {
                        expected: first.shape().clone(),
                        got: desc.shape().clone(),
                    });
                }
            }
        }
    }
    Ok(axis)
}

/// Cached concat or stack over a fixed list of input descriptors.
#[derive(Debug)]
pub struct ConcatForward<B: Backend> {
    mode: ConcatMode,
    axis: usize,
    /// Descriptors the primitive was planned with (unit dim inserted for stack).
    srcs: Vec<TensorDesc>,
    stage: Stage<B>,
}

impl<B: Backend> ConcatForward<B> {
    /// Return the cached entry for these inputs, planning it on first use.
    pub fn get_cached(
        ctx: &mut PrimitiveContext<B>,
        param: &ConcatParam,
        inputs: &[TensorRef<'_, B::Storage>],
    ) -> Result<Arc<Self>> {
        let descs: Vec<&TensorDesc> = inputs.iter().map(|t| &*t.desc).collect();
        let axis = resolve_axis(param, &descs)?;

        let mut sig = OpSignature::new();
        sig.add_sign(&param.mode).add_sign(&axis).add_sign(&descs);

        ctx.cached(
            |c| &mut c.concat,
            sig,
            |backend| Self::build(backend, param.mode, axis, &descs),
        )
    }

    fn build(backend: &B, mode: ConcatMode, axis: usize, inputs: &[&TensorDesc]) -> Result<Self> {
        let srcs = match mode {
            ConcatMode::Concat => inputs.iter().map(|d| (*d).clone()).collect(),
            ConcatMode::Stack => inputs
                .iter()
                .map(|d| d.with_unit_dim(axis))
                .collect::<Result<Vec<_>>>()?,
        };
        let stage = Stage::build(backend, &OpDesc::Concat { srcs: &srcs, axis })?;
        Ok(ConcatForward {
            mode,
            axis,
            srcs,
            stage,
        })
    }

    pub fn mode(&self) -> ConcatMode {
        self.mode
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn num_inputs(&self) -> usize {
        self.srcs.len()
    }

    /// Descriptor of the joined output.
    pub fn output_desc(&self) -> &TensorDesc {
        self.stage.plan().output_desc()
    }

    /// Join `inputs` into `out`.
    pub fn execute(
        &self,
        ctx: &mut PrimitiveContext<B>,
        inputs: &[TensorRef<'_, B::Storage>],
        out: TensorMut<'_, B::Storage>,
    ) -> Result<()> {
        if inputs.len() != self.srcs.len() {
            return Err(Error::binding(
                ArgKind::MultipleSrc(inputs.len().min(self.srcs.len())),
                format!("planned for {} inputs, got {}", self.srcs.len(), inputs.len()),
            ));
        }
        let bound = match self.mode {
            ConcatMode::Concat => inputs.to_vec(),
            ConcatMode::Stack => inputs
                .iter()
                .enumerate()
                .map(|(j, t)| {
                    let desc = t
                        .desc
                        .with_unit_dim(self.axis)
                        .map_err(|e| Error::binding(ArgKind::MultipleSrc(j), e.to_string()))?;
                    Ok(t.with_desc(desc))
                })
                .collect::<Result<Vec<_>>>()?,
        };

        if ctx.validate_bindings() {
            for (j, (t, planned)) in bound.iter().zip(&self.srcs).enumerate() {
                t.check(ArgKind::MultipleSrc(j), planned)?;
            }
            out.check(ArgKind::Dst, self.output_desc())?;
        }

        let mut args = ExecArgs::new(ArgKind::Dst, out);
        for (j, t) in bound.into_iter().enumerate() {
            args = args.with_src(ArgKind::MultipleSrc(j), t);
        }
        ctx.submit(&self.stage, args)
    }
}

/// Plan (or fetch) and run a concatenation along `axis`.
pub fn concat_forward<B: Backend>(
    ctx: &mut PrimitiveContext<B>,
    axis: i64,
    inputs: &[TensorRef<'_, B::Storage>],
    out: TensorMut<'_, B::Storage>,
) -> Result<()> {
    let fwd = ConcatForward::get_cached(ctx, &ConcatParam::concat(axis), inputs)?;
    fwd.execute(ctx, inputs, out)
}

/// Plan (or fetch) and run a stack along the new axis `axis`.
pub fn stack_forward<B: Backend>(
    ctx: &mut PrimitiveContext<B>,
    axis: i64,
    inputs: &[TensorRef<'_, B::Storage>],
    out: TensorMut<'_, B::Storage>,
) -> Result<()> {
    let fwd = ConcatForward::get_cached(ctx, &ConcatParam::stack(axis), inputs)?;
    fwd.execute(ctx, inputs, out)
}
