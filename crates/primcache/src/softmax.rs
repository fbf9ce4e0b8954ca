// Softmax — cached forward and backward primitives, with temperature
//
// Forward computes `softmax(x / T)` along one axis. With no temperature (or
// exactly 1.0) that is a single backend primitive; otherwise a linear
// eltwise pass with alpha = 1/T runs first into a scratch buffer:
//
//   Plain:   data ──softmax──▶ out
//   Scaled:  data ──linear(1/T)──▶ scratch ──softmax──▶ out
//
// Backward takes (out_grad, out) and produces data_grad. The backend plans
// it from a training-mode forward plan (the hint) over `out`. With a
// temperature the gradient is scaled by 1/T after the softmax backward pass.
// A sum primitive is always planned so AddTo requests can accumulate.
//
// Cache keys hold the normalized axis, the bit pattern of the effective
// temperature (None and Some(1.0) are the same key), the training flag for
// forward, and every bound tensor's descriptor.

use std::sync::Arc;

use primcache_core::{
    normalize_axis, ArgKind, Backend, EltwiseAlg, Error, ExecArgs, OpDesc, Plan, PropKind,
    Result, TensorDesc, TensorMut, TensorRef,
};

use crate::context::{PrimitiveContext, Stage};
use crate::signature::OpSignature;
use crate::support::ensure_same_logical;

/// Softmax operator configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftmaxParam {
    /// Signed axis; negative values count from the end.
    pub axis: i64,
    /// Divisor applied to the input before normalization.
    pub temperature: Option<f32>,
}

impl Default for SoftmaxParam {
    fn default() -> Self {
        SoftmaxParam {
            axis: -1,
            temperature: None,
        }
    }
}

impl SoftmaxParam {
    pub fn new(axis: i64) -> Self {
        SoftmaxParam {
            axis,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// The temperature actually applied: 1.0 when unset.
    ///
    /// A temperature must be finite with a finite reciprocal, so zero,
    /// non-finite and subnormal-small values are configuration errors.
    pub fn effective_temperature(&self) -> Result<f32> {
        match self.temperature {
            None => Ok(1.0),
            Some(t) if !t.is_finite() || !(1.0 / t).is_finite() => {
                Err(Error::UnsupportedTemperature(t))
            }
            Some(t) => Ok(t),
        }
    }
}

/// What a backward call does with `data_grad`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteReq {
    /// Skip: nothing runs, `data_grad` is left as is.
    Null,
    /// Overwrite `data_grad` with the gradient.
    WriteTo,
    /// Add the gradient to the current contents of `data_grad`.
    AddTo,
}

/// Tensors of one forward call.
#[derive(Debug)]
pub struct SoftmaxFwdTensors<'a, S> {
    pub data: TensorRef<'a, S>,
    pub out: TensorMut<'a, S>,
}

impl<'a, S> SoftmaxFwdTensors<'a, S> {
    pub fn new(data: TensorRef<'a, S>, out: TensorMut<'a, S>) -> Self {
        SoftmaxFwdTensors { data, out }
    }

    /// From operator argument lists: `inputs = [data]`, `outputs = [out]`.
    pub fn from_io(inputs: &[TensorRef<'a, S>], outputs: Vec<TensorMut<'a, S>>) -> Result<Self> {
        let data = match inputs {
            [data] => data.clone(),
            _ => primcache_core::bail!("softmax forward takes 1 input, got {}", inputs.len()),
        };
        let [out]: [TensorMut<'a, S>; 1] = outputs.try_into().map_err(|o: Vec<_>| {
            Error::msg(format!("softmax forward takes 1 output, got {}", o.len()))
        })?;
        Ok(SoftmaxFwdTensors { data, out })
    }
}

/// Tensors of one backward call.
#[derive(Debug)]
pub struct SoftmaxBwdTensors<'a, S> {
    /// Gradient of the loss with respect to the forward output.
    pub out_grad: TensorRef<'a, S>,
    /// Forward output.
    pub out: TensorRef<'a, S>,
    /// Gradient with respect to the forward input; written per `WriteReq`.
    pub data_grad: TensorMut<'a, S>,
}

impl<'a, S> SoftmaxBwdTensors<'a, S> {
    pub fn new(
        out_grad: TensorRef<'a, S>,
        out: TensorRef<'a, S>,
        data_grad: TensorMut<'a, S>,
    ) -> Self {
        SoftmaxBwdTensors {
            out_grad,
            out,
            data_grad,
        }
    }

    /// From operator argument lists: `inputs = [out_grad, out]`,
    /// `outputs = [data_grad]`.
    pub fn from_io(inputs: &[TensorRef<'a, S>], outputs: Vec<TensorMut<'a, S>>) -> Result<Self> {
        let (out_grad, out) = match inputs {
            [out_grad, out] => (out_grad.clone(), out.clone()),
            _ => primcache_core::bail!("softmax backward takes 2 inputs, got {}", inputs.len()),
        };
        let [data_grad]: [TensorMut<'a, S>; 1] = outputs.try_into().map_err(|o: Vec<_>| {
            Error::msg(format!("softmax backward takes 1 output, got {}", o.len()))
        })?;
        Ok(SoftmaxBwdTensors {
            out_grad,
            out,
            data_grad,
        })
    }
}

// Forward

/// Primitive chain of a forward entry, chosen when the entry is built.
#[derive(Debug)]
pub enum SoftmaxChain<B: Backend> {
    Plain(Stage<B>),
    /// `(scale, softmax)`, run in that order.
    Scaled(Stage<B>, Stage<B>),
}

/// Cached forward softmax: one or two planned primitives.
#[derive(Debug)]
pub struct SoftmaxForward<B: Backend> {
    axis: usize,
    temperature: f32,
    prop: PropKind,
    src: TensorDesc,
    chain: SoftmaxChain<B>,
}

impl<B: Backend> SoftmaxForward<B> {
    /// Return the cached entry for this call, planning it on first use.
    pub fn get_cached(
        ctx: &mut PrimitiveContext<B>,
        param: &SoftmaxParam,
        tensors: &SoftmaxFwdTensors<'_, B::Storage>,
        is_train: bool,
    ) -> Result<Arc<Self>> {
        let data = &*tensors.data.desc;
        let out = &*tensors.out.desc;
        let axis = normalize_axis(param.axis, data.rank())?;
        let temperature = param.effective_temperature()?;
        ensure_same_logical(data, out)?;

        let mut sig = OpSignature::new();
        sig.add_sign(&axis)
            .add_sign(&temperature)
            .add_sign(&is_train)
            .add_sign(data)
            .add_sign(out);

        ctx.cached(
            |c| &mut c.softmax_fwd,
            sig,
            |backend| Self::build(backend, data, axis, temperature, is_train),
        )
    }

    fn build(
        backend: &B,
        data: &TensorDesc,
        axis: usize,
        temperature: f32,
        is_train: bool,
    ) -> Result<Self> {
        let prop = if is_train {
            PropKind::ForwardTraining
        } else {
            PropKind::ForwardInference
        };
        let softmax = Stage::from_plan(backend, Self::plan_forward(backend, data, axis, prop)?)?;
        let chain = if temperature != 1.0 {
            let scale = Stage::from_plan(
                backend,
                Self::plan_temperature(backend, data, temperature, prop)?,
            )?;
            SoftmaxChain::Scaled(scale, softmax)
        } else {
            SoftmaxChain::Plain(softmax)
        };
        Ok(SoftmaxForward {
            axis,
            temperature,
            prop,
            src: data.clone(),
            chain,
        })
    }

    /// Plan a softmax forward primitive over `data` along a normalized axis.
    pub fn plan_forward(
        backend: &B,
        data: &TensorDesc,
        axis: usize,
        prop: PropKind,
    ) -> Result<Plan> {
        backend.plan(&OpDesc::SoftmaxForward {
            src: data,
            axis,
            prop,
        })
    }

    /// Plan the `x / temperature` pass as a linear eltwise primitive.
    pub fn plan_temperature(
        backend: &B,
        desc: &TensorDesc,
        temperature: f32,
        prop: PropKind,
    ) -> Result<Plan> {
        backend.plan(&OpDesc::Eltwise {
            src: desc,
            alg: EltwiseAlg::Linear {
                alpha: 1.0 / temperature,
                beta: 0.0,
            },
            prop,
        })
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn prop(&self) -> PropKind {
        self.prop
    }

    pub fn chain(&self) -> &SoftmaxChain<B> {
        &self.chain
    }

    pub fn is_scaled(&self) -> bool {
        matches!(self.chain, SoftmaxChain::Scaled(..))
    }

    fn softmax_stage(&self) -> &Stage<B> {
        match &self.chain {
            SoftmaxChain::Plain(softmax) | SoftmaxChain::Scaled(_, softmax) => softmax,
        }
    }

    /// Run the chain on this call's tensors.
    pub fn execute(
        &self,
        ctx: &mut PrimitiveContext<B>,
        tensors: &mut SoftmaxFwdTensors<'_, B::Storage>,
    ) -> Result<()> {
        if ctx.validate_bindings() {
            tensors.data.check(ArgKind::Src, &self.src)?;
            tensors
                .out
                .check(ArgKind::Dst, self.softmax_stage().plan().output_desc())?;
        }
        match &self.chain {
            SoftmaxChain::Plain(softmax) => ctx.submit(
                softmax,
                ExecArgs::new(ArgKind::Dst, tensors.out.reborrow())
                    .with_src(ArgKind::Src, tensors.data.clone()),
            ),
            SoftmaxChain::Scaled(scale, softmax) => {
                let desc = self.src.to_contiguous();
                let mut scratch = ctx.alloc(&desc)?;
                ctx.submit(
                    scale,
                    ExecArgs::new(ArgKind::Dst, TensorMut::new(&mut scratch, &desc))
                        .with_src(ArgKind::Src, tensors.data.clone()),
                )?;
                ctx.submit(
                    softmax,
                    ExecArgs::new(ArgKind::Dst, tensors.out.reborrow())
                        .with_src(ArgKind::Src, TensorRef::new(&scratch, &desc)),
                )
            }
        }
    }
}

// Backward

/// Cached backward softmax.
#[derive(Debug)]
pub struct SoftmaxBackward<B: Backend> {
    axis: usize,
    temperature: f32,
    softmax: Stage<B>,
    scale: Option<Stage<B>>,
    sum: Stage<B>,
    /// Row-major descriptor of the gradient, used for scratch buffers.
    grad: TensorDesc,
}

impl<B: Backend> SoftmaxBackward<B> {
    /// Return the cached entry for this call, planning it on first use.
    pub fn get_cached(
        ctx: &mut PrimitiveContext<B>,
        param: &SoftmaxParam,
        tensors: &SoftmaxBwdTensors<'_, B::Storage>,
    ) -> Result<Arc<Self>> {
        let out_grad = &*tensors.out_grad.desc;
        let out = &*tensors.out.desc;
        let data_grad = &*tensors.data_grad.desc;
        let axis = normalize_axis(param.axis, out.rank())?;
        let temperature = param.effective_temperature()?;
        ensure_same_logical(out, out_grad)?;
        ensure_same_logical(out, data_grad)?;

        let mut sig = OpSignature::new();
        sig.add_sign(&axis)
            .add_sign(&temperature)
            .add_sign(out_grad)
            .add_sign(out)
            .add_sign(data_grad);

        ctx.cached(
            |c| &mut c.softmax_bwd,
            sig,
            |backend| Self::build(backend, out_grad, out, data_grad, axis, temperature),
        )
    }

    fn build(
        backend: &B,
        out_grad: &TensorDesc,
        out: &TensorDesc,
        data_grad: &TensorDesc,
        axis: usize,
        temperature: f32,
    ) -> Result<Self> {
        let hint = SoftmaxForward::plan_forward(backend, out, axis, PropKind::ForwardTraining)?;
        let softmax = Stage::build(
            backend,
            &OpDesc::SoftmaxBackward {
                diff_dst: out_grad,
                dst: out,
                axis,
                hint: &hint,
            },
        )?;
        let scale = if temperature != 1.0 {
            let plan = SoftmaxForward::plan_temperature(
                backend,
                out,
                temperature,
                PropKind::ForwardTraining,
            )?;
            Some(Stage::from_plan(backend, plan)?)
        } else {
            None
        };
        let grad = data_grad.to_contiguous();
        let sum = Stage::build(
            backend,
            &OpDesc::Sum {
                dst: data_grad,
                src: &grad,
            },
        )?;
        Ok(SoftmaxBackward {
            axis,
            temperature,
            softmax,
            scale,
            sum,
            grad,
        })
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn is_scaled(&self) -> bool {
        self.scale.is_some()
    }

    /// Compute the input gradient for this call, honoring `req`.
    pub fn execute(
        &self,
        ctx: &mut PrimitiveContext<B>,
        tensors: &mut SoftmaxBwdTensors<'_, B::Storage>,
        req: WriteReq,
    ) -> Result<()> {
        if req == WriteReq::Null {
            return Ok(());
        }
        if ctx.validate_bindings() {
            for (kind, desc) in self.softmax.plan().input_args() {
                let bound = match kind {
                    ArgKind::DiffDst => &tensors.out_grad,
                    _ => &tensors.out,
                };
                bound.check(kind, desc)?;
            }
            tensors
                .data_grad
                .check(ArgKind::DiffSrc, self.sum.plan().output_desc())?;
        }

        let out_grad = tensors.out_grad.clone();
        let out = tensors.out.clone();
        match req {
            WriteReq::Null => Ok(()),
            WriteReq::WriteTo => {
                self.gradient_into(ctx, out_grad, out, tensors.data_grad.reborrow())
            }
            WriteReq::AddTo => {
                let mut scratch = ctx.alloc(&self.grad)?;
                self.gradient_into(ctx, out_grad, out, TensorMut::new(&mut scratch, &self.grad))?;
                ctx.submit(
                    &self.sum,
                    ExecArgs::new(ArgKind::Dst, tensors.data_grad.reborrow())
                        .with_src(ArgKind::Src, TensorRef::new(&scratch, &self.grad)),
                )
            }
        }
    }

    fn gradient_into<'a>(
        &self,
        ctx: &mut PrimitiveContext<B>,
        out_grad: TensorRef<'a, B::Storage>,
        out: TensorRef<'a, B::Storage>,
        dst: TensorMut<'a, B::Storage>,
    ) -> Result<()> {
        match &self.scale {
            None => ctx.submit(
                &self.softmax,
                ExecArgs::new(ArgKind::DiffSrc, dst)
                    .with_src(ArgKind::DiffDst, out_grad)
                    .with_src(ArgKind::Dst, out),
            ),
            Some(scale) => {
                let mut scratch = ctx.alloc(&self.grad)?;
                ctx.submit(
                    &self.softmax,
                    ExecArgs::new(ArgKind::DiffSrc, TensorMut::new(&mut scratch, &self.grad))
                        .with_src(ArgKind::DiffDst, out_grad)
                        .with_src(ArgKind::Dst, out),
                )?;
                ctx.submit(
                    scale,
                    ExecArgs::new(ArgKind::Dst, dst)
                        .with_src(ArgKind::Src, TensorRef::new(&scratch, &self.grad)),
                )
            }
        }
    }
}

// One-shot entry points

/// Plan (or fetch) and run a forward softmax.
pub fn softmax_forward<B: Backend>(
    ctx: &mut PrimitiveContext<B>,
    param: &SoftmaxParam,
    mut tensors: SoftmaxFwdTensors<'_, B::Storage>,
    is_train: bool,
) -> Result<()> {
    let fwd = SoftmaxForward::get_cached(ctx, param, &tensors, is_train)?;
    fwd.execute(ctx, &mut tensors)
}

/// Plan (or fetch) and run a backward softmax. `WriteReq::Null` returns
/// before anything is planned.
pub fn softmax_backward<B: Backend>(
    ctx: &mut PrimitiveContext<B>,
    param: &SoftmaxParam,
    mut tensors: SoftmaxBwdTensors<'_, B::Storage>,
    req: WriteReq,
) -> Result<()> {
    if req == WriteReq::Null {
        return Ok(());
    }
    let bwd = SoftmaxBackward::get_cached(ctx, param, &tensors)?;
    bwd.execute(ctx, &mut tensors, req)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_temperature() {
        assert_eq!(SoftmaxParam::new(1).effective_temperature().unwrap(), 1.0);
        assert_eq!(
            SoftmaxParam::new(1)
                .with_temperature(2.5)
                .effective_temperature()
                .unwrap(),
            2.5
        );
        for bad in [0.0, -0.0, 1e-39, -1e-39, f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let err = SoftmaxParam::new(0)
                .with_temperature(bad)
                .effective_temperature()
                .unwrap_err();
            assert!(err.is_configuration(), "{bad}: {err}");
        }
    }

    #[test]
    fn test_default_axis_is_last() {
        assert_eq!(SoftmaxParam::default().axis, -1);
        assert_eq!(SoftmaxParam::default().temperature, None);
    }
}
