use std::fmt;

use crate::desc::TensorDesc;

// Plans — what a backend agreed to compute
//
// Planning is a two-step conversation with a backend:
//
//   OpDesc  — the request: "softmax over this descriptor along axis 2"
//   Plan    — the backend's answer, with every descriptor resolved
//
// A plan is immutable and cheap to keep around; instantiating an executable
// primitive from it is the backend's business. Execution later binds live
// buffers to the plan's argument slots (`ArgKind`).

/// Forward propagation flavour; training keeps what a backward pass needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropKind {
    ForwardTraining,
    ForwardInference,
}

/// Elementwise algorithm of an eltwise primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EltwiseAlg {
    /// `dst = alpha * src + beta`
    Linear { alpha: f32, beta: f32 },
}

/// Argument slot of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Src,
    Dst,
    DiffDst,
    DiffSrc,
    /// i-th input of an N-ary primitive (concat).
    MultipleSrc(usize),
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Src => f.write_str("src"),
            ArgKind::Dst => f.write_str("dst"),
            ArgKind::DiffDst => f.write_str("diff_dst"),
            ArgKind::DiffSrc => f.write_str("diff_src"),
            ArgKind::MultipleSrc(i) => write!(f, "src[{i}]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    SoftmaxForward,
    SoftmaxBackward,
    Eltwise,
    Concat,
    Sum,
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveKind::SoftmaxForward => "softmax_forward",
            PrimitiveKind::SoftmaxBackward => "softmax_backward",
            PrimitiveKind::Eltwise => "eltwise",
            PrimitiveKind::Concat => "concat",
            PrimitiveKind::Sum => "sum",
        };
        f.write_str(s)
    }
}

/// A primitive request handed to [`Backend::plan`](crate::Backend::plan).
#[derive(Debug, Clone, Copy)]
pub enum OpDesc<'a> {
    SoftmaxForward {
        src: &'a TensorDesc,
        axis: usize,
        prop: PropKind,
    },
    /// `hint` must be a training-mode forward plan over `dst` and `axis`;
    /// backends take structural decisions from it instead of re-deriving
    /// them.
    SoftmaxBackward {
        diff_dst: &'a TensorDesc,
        dst: &'a TensorDesc,
        axis: usize,
        hint: &'a Plan,
    },
    Eltwise {
        src: &'a TensorDesc,
        alg: EltwiseAlg,
        prop: PropKind,
    },
    /// One fused N-input concatenation along `axis`.
    Concat {
        srcs: &'a [TensorDesc],
        axis: usize,
    },
    /// In-place accumulation: `dst += src`.
    Sum {
        dst: &'a TensorDesc,
        src: &'a TensorDesc,
    },
}

impl OpDesc<'_> {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            OpDesc::SoftmaxForward { .. } => PrimitiveKind::SoftmaxForward,
            OpDesc::SoftmaxBackward { .. } => PrimitiveKind::SoftmaxBackward,
            OpDesc::Eltwise { .. } => PrimitiveKind::Eltwise,
            OpDesc::Concat { .. } => PrimitiveKind::Concat,
            OpDesc::Sum { .. } => PrimitiveKind::Sum,
        }
    }
}

/// A resolved, immutable primitive description produced by a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    SoftmaxForward {
        src: TensorDesc,
        dst: TensorDesc,
        axis: usize,
        prop: PropKind,
    },
    SoftmaxBackward {
        diff_dst: TensorDesc,
        dst: TensorDesc,
        diff_src: TensorDesc,
        axis: usize,
    },
    Eltwise {
        src: TensorDesc,
        dst: TensorDesc,
        alg: EltwiseAlg,
        prop: PropKind,
    },
    Concat {
        srcs: Vec<TensorDesc>,
        dst: TensorDesc,
        axis: usize,
    },
    Sum {
        dst: TensorDesc,
        src: TensorDesc,
    },
}

impl Plan {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Plan::SoftmaxForward { .. } => PrimitiveKind::SoftmaxForward,
            Plan::SoftmaxBackward { .. } => PrimitiveKind::SoftmaxBackward,
            Plan::Eltwise { .. } => PrimitiveKind::Eltwise,
            Plan::Concat { .. } => PrimitiveKind::Concat,
            Plan::Sum { .. } => PrimitiveKind::Sum,
        }
    }

    /// The slot this primitive writes.
    pub fn output_arg(&self) -> ArgKind {
        match self {
            Plan::SoftmaxBackward { .. } => ArgKind::DiffSrc,
            _ => ArgKind::Dst,
        }
    }

    /// Descriptors of the slots this primitive reads, in binding order.
    pub fn input_args(&self) -> Vec<(ArgKind, &TensorDesc)> {
        match self {
            Plan::SoftmaxForward { src, .. } | Plan::Eltwise { src, .. } => {
                vec![(ArgKind::Src, src)]
            }
            Plan::SoftmaxBackward { diff_dst, dst, .. } => {
                vec![(ArgKind::DiffDst, diff_dst), (ArgKind::Dst, dst)]
            }
            Plan::Concat { srcs, .. } => srcs
                .iter()
                .enumerate()
                .map(|(i, d)| (ArgKind::MultipleSrc(i), d))
                .collect(),
            Plan::Sum { src, .. } => vec![(ArgKind::Src, src)],
        }
    }

    /// Descriptor of the written slot.
    pub fn output_desc(&self) -> &TensorDesc {
        match self {
            Plan::SoftmaxForward { dst, .. }
            | Plan::Eltwise { dst, .. }
            | Plan::Concat { dst, .. }
            | Plan::Sum { dst, .. } => dst,
            Plan::SoftmaxBackward { diff_src, .. } => diff_src,
        }
    }
}
