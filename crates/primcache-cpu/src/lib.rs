// CPU Backend — reference implementation of the primitive-planning backend
//
// This crate implements primcache-core's Backend trait on host memory. It is
// the backend the cache is tested against and the one hosts fall back to
// when no accelerator backend is linked in.
//
// ARCHITECTURE:
// - CpuBackend validates requests in `plan` the way a vendor library would:
//   float dtypes only, rank 1..=MAX_RANK, no empty tensors, a training-mode
//   forward hint for softmax backward. Refusals are planning errors.
// - CpuPrimitive is the plan plus the precomputed axis geometry, so
//   execution does no shape arithmetic beyond gathering the bound views.
// - CpuStream runs primitives eagerly, in submission order, and counts them.
//   It can be given a submission budget to simulate an exhausted stream.
// - All arithmetic happens in f64 (see kernels.rs); results are rounded to
//   the output dtype on scatter.
//
// USAGE:
//   let backend = CpuBackend::new();
//   let mut stream = CpuStream::new(0);
//   let plan = backend.plan(&OpDesc::SoftmaxForward { src: &desc, axis: 1, prop })?;
//   let prim = backend.instantiate(&plan)?;
//   backend.execute(&prim, args, &mut stream)?;

pub mod kernels;
mod stats;
mod storage;

use std::fmt;
use std::sync::Arc;

use primcache_core::backend::{Backend, BackendStream};
use primcache_core::binding::ExecArgs;
use primcache_core::desc::TensorDesc;
use primcache_core::error::{Error, Result};
use primcache_core::plan::{ArgKind, EltwiseAlg, OpDesc, Plan, PrimitiveKind, PropKind};
use primcache_core::shape::Shape;

use kernels::AxisGeometry;
pub use stats::BackendStats;
pub use storage::{CpuStorage, CpuTensor};

/// Highest tensor rank the CPU backend will plan for.
pub const MAX_RANK: usize = 12;

// CpuStream

/// In-order host "stream". Submissions run immediately.
#[derive(Debug, Clone)]
pub struct CpuStream {
    ordinal: usize,
    submitted: u64,
    budget: Option<u64>,
}

impl CpuStream {
    pub fn new(ordinal: usize) -> Self {
        CpuStream {
            ordinal,
            submitted: 0,
            budget: None,
        }
    }

    /// Stream that accepts `budget` more submissions before reporting
    /// exhaustion.
    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Replace the remaining submission budget (`None` = unlimited).
    pub fn set_budget(&mut self, budget: Option<u64>) {
        self.budget = budget;
    }

    /// Primitives successfully submitted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    fn admit(&mut self, kind: PrimitiveKind) -> Result<()> {
        if self.budget == Some(0) {
            return Err(Error::execution(
                kind,
                format!("stream {} exhausted its submission budget", self.name()),
            ));
        }
        if let Some(left) = self.budget.as_mut() {
            *left -= 1;
        }
        Ok(())
    }
}

impl Default for CpuStream {
    fn default() -> Self {
        Self::new(0)
    }
}

impl BackendStream for CpuStream {
    fn name(&self) -> String {
        format!("cpu:{}", self.ordinal)
    }

    fn wait(&mut self) -> Result<()> {
        Ok(())
    }
}

// CpuPrimitive

#[derive(Debug, Clone)]
enum CpuOp {
    SoftmaxForward(AxisGeometry),
    SoftmaxBackward(AxisGeometry),
    Linear { alpha: f64, beta: f64 },
    Concat {
        outer: usize,
        inner: usize,
        axis_lens: Vec<usize>,
    },
    Sum,
}

/// Executable primitive: a plan plus its precomputed geometry.
#[derive(Debug, Clone)]
pub struct CpuPrimitive {
    plan: Plan,
    op: CpuOp,
}

impl CpuPrimitive {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }
}

// CpuBackend

/// The reference CPU backend. Clones share their call counters.
#[derive(Clone, Default)]
pub struct CpuBackend {
    counters: Arc<stats::Counters>,
}

impl fmt::Debug for CpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuBackend")
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> BackendStats {
        self.counters.snapshot()
    }

    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    fn check_desc(kind: PrimitiveKind, desc: &TensorDesc) -> Result<()> {
        if !desc.dtype().is_float() {
            return Err(Error::planning(
                kind,
                format!("dtype {} is not supported", desc.dtype()),
            ));
        }
        if desc.rank() == 0 || desc.rank() > MAX_RANK {
            return Err(Error::planning(
                kind,
                format!("rank {} outside 1..={MAX_RANK}", desc.rank()),
            ));
        }
        if desc.elem_count() == 0 {
            return Err(Error::planning(kind, format!("{desc} has no elements")));
        }
        Ok(())
    }

    fn check_axis(kind: PrimitiveKind, desc: &TensorDesc, axis: usize) -> Result<()> {
        if axis >= desc.rank() {
            return Err(Error::planning(
                kind,
                format!("axis {axis} out of range for {desc}"),
            ));
        }
        Ok(())
    }

    fn plan_inner(&self, op: &OpDesc<'_>) -> Result<Plan> {
        let kind = op.kind();
        match *op {
            OpDesc::SoftmaxForward { src, axis, prop } => {
                Self::check_desc(kind, src)?;
                Self::check_axis(kind, src, axis)?;
                Ok(Plan::SoftmaxForward {
                    src: src.clone(),
                    dst: src.clone(),
                    axis,
                    prop,
                })
            }
            OpDesc::SoftmaxBackward {
                diff_dst,
                dst,
                axis,
                hint,
            } => {
                Self::check_desc(kind, dst)?;
                Self::check_axis(kind, dst, axis)?;
                if !diff_dst.same_logical(dst) {
                    return Err(Error::planning(
                        kind,
                        format!("diff_dst {diff_dst} does not match dst {dst}"),
                    ));
                }
                match hint {
                    Plan::SoftmaxForward {
                        src,
                        axis: hint_axis,
                        prop: PropKind::ForwardTraining,
                        ..
                    } if *hint_axis == axis && src.same_logical(dst) => {}
                    other => {
                        return Err(Error::planning(
                            kind,
                            format!(
                                "hint is not a training softmax over {dst} axis {axis}: {other:?}"
                            ),
                        ))
                    }
                }
                Ok(Plan::SoftmaxBackward {
                    diff_dst: diff_dst.clone(),
                    dst: dst.clone(),
                    diff_src: diff_dst.to_contiguous(),
                    axis,
                })
            }
            OpDesc::Eltwise { src, alg, prop } => {
                Self::check_desc(kind, src)?;
                let EltwiseAlg::Linear { alpha, beta } = alg;
                if !alpha.is_finite() || !beta.is_finite() {
                    return Err(Error::planning(
                        kind,
                        format!("linear coefficients must be finite (alpha={alpha}, beta={beta})"),
                    ));
                }
                Ok(Plan::Eltwise {
                    src: src.clone(),
                    dst: src.clone(),
                    alg,
                    prop,
                })
            }
            OpDesc::Concat { srcs, axis } => {
                let first = srcs
                    .first()
                    .ok_or_else(|| Error::planning(kind, "no inputs"))?;
                Self::check_axis(kind, first, axis)?;
                let mut dims = first.dims().to_vec();
                dims[axis] = 0;
                for (j, src) in srcs.iter().enumerate() {
                    Self::check_desc(kind, src)?;
                    let compatible = src.dtype() == first.dtype()
                        && src.rank() == first.rank()
                        && src
                            .dims()
                            .iter()
                            .zip(first.dims())
                            .enumerate()
                            .all(|(d, (a, b))| d == axis || a == b);
                    if !compatible {
                        return Err(Error::planning(
                            kind,
                            format!(
                                "input {j} ({src}) cannot be joined with {first} on axis {axis}"
                            ),
                        ));
                    }
                    dims[axis] += src.dims()[axis];
                }
                Ok(Plan::Concat {
                    srcs: srcs.to_vec(),
                    dst: TensorDesc::contiguous(Shape::new(dims), first.dtype()),
                    axis,
                })
            }
            OpDesc::Sum { dst, src } => {
                Self::check_desc(kind, dst)?;
                if !dst.same_logical(src) {
                    return Err(Error::planning(
                        kind,
                        format!("cannot accumulate {src} into {dst}"),
                    ));
                }
                Ok(Plan::Sum {
                    dst: dst.clone(),
                    src: src.clone(),
                })
            }
        }
    }

    fn run(&self, primitive: &CpuPrimitive, args: ExecArgs<'_, CpuStorage>) -> Result<()> {
        let ExecArgs { srcs, dst } = args;
        let (_, mut dst) = dst;
        let read = |kind: ArgKind| -> Result<Vec<f64>> {
            let (_, t) = srcs
                .iter()
                .find(|(k, _)| *k == kind)
                .ok_or_else(|| Error::binding(kind, "argument not bound"))?;
            Ok(t.storage.gather(t.desc.layout(), t.offset))
        };

        let out = match &primitive.op {
            CpuOp::SoftmaxForward(g) => kernels::softmax_forward(&read(ArgKind::Src)?, *g),
            CpuOp::SoftmaxBackward(g) => kernels::softmax_backward(
                &read(ArgKind::DiffDst)?,
                &read(ArgKind::Dst)?,
                *g,
            ),
            CpuOp::Linear { alpha, beta } => kernels::linear(&read(ArgKind::Src)?, *alpha, *beta),
            CpuOp::Concat {
                outer,
                inner,
                axis_lens,
            } => {
                let inputs = (0..axis_lens.len())
                    .map(|j| read(ArgKind::MultipleSrc(j)))
                    .collect::<Result<Vec<_>>>()?;
                kernels::concat(&inputs, axis_lens, *outer, *inner)
            }
            CpuOp::Sum => {
                let current = dst.storage.gather(dst.desc.layout(), dst.offset);
                kernels::accumulate(&current, &read(ArgKind::Src)?)
            }
        };
        dst.storage.scatter(dst.desc.layout(), dst.offset, &out);
        Ok(())
    }
}

impl Backend for CpuBackend {
    type Storage = CpuStorage;
    type Stream = CpuStream;
    type Primitive = CpuPrimitive;

    fn name(&self) -> String {
        "cpu".to_string()
    }

    fn plan(&self, op: &OpDesc<'_>) -> Result<Plan> {
        self.counters.plan_called();
        let plan = self.plan_inner(op);
        if plan.is_err() {
            self.counters.plan_failed();
        }
        plan
    }

    fn instantiate(&self, plan: &Plan) -> Result<CpuPrimitive> {
        let op = match plan {
            Plan::SoftmaxForward { src, axis, .. } => {
                CpuOp::SoftmaxForward(AxisGeometry::new(src.dims(), *axis))
            }
            Plan::SoftmaxBackward { dst, axis, .. } => {
                CpuOp::SoftmaxBackward(AxisGeometry::new(dst.dims(), *axis))
            }
            Plan::Eltwise {
                alg: EltwiseAlg::Linear { alpha, beta },
                ..
            } => CpuOp::Linear {
                alpha: *alpha as f64,
                beta: *beta as f64,
            },
            Plan::Concat { srcs, dst, axis } => {
                let g = AxisGeometry::new(dst.dims(), *axis);
                CpuOp::Concat {
                    outer: g.outer,
                    inner: g.inner,
                    axis_lens: srcs.iter().map(|s| s.dims()[*axis]).collect(),
                }
            }
            Plan::Sum { .. } => CpuOp::Sum,
        };
        self.counters.instantiated();
        Ok(CpuPrimitive {
            plan: plan.clone(),
            op,
        })
    }

    fn alloc(&self, desc: &TensorDesc) -> Result<CpuStorage> {
        self.counters.allocated();
        Ok(CpuStorage::zeros(desc.layout().span(), desc.dtype()))
    }

    fn execute(
        &self,
        primitive: &CpuPrimitive,
        args: ExecArgs<'_, CpuStorage>,
        stream: &mut CpuStream,
    ) -> Result<()> {
        args.validate(&primitive.plan)?;
        stream.admit(primitive.plan.kind())?;
        self.run(primitive, args)?;
        stream.submitted += 1;
        self.counters.executed();
        Ok(())
    }
}
