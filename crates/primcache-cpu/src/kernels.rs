// Reference kernels
//
// Every kernel works on dense, row-major f64 slices that the backend has
// gathered from the bound views. An axis of a row-major tensor splits the
// flat index space into (outer, axis, inner) blocks:
//
//   flat = (o * axis_len + k) * inner + i
//
// so softmax reduces over k for each (o, i) pair, and concat copies
// `axis_len_j * inner` contiguous runs from each input per outer index.

/// `(outer, axis_len, inner)` split of `dims` around `axis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisGeometry {
    pub outer: usize,
    pub axis_len: usize,
    pub inner: usize,
}

impl AxisGeometry {
    pub fn new(dims: &[usize], axis: usize) -> Self {
        AxisGeometry {
            outer: dims[..axis].iter().product(),
            axis_len: dims[axis],
            inner: dims[axis + 1..].iter().product(),
        }
    }

    fn index(&self, o: usize, k: usize, i: usize) -> usize {
        (o * self.axis_len + k) * self.inner + i
    }
}

/// Numerically stable softmax along the geometry's axis.
pub fn softmax_forward(src: &[f64], g: AxisGeometry) -> Vec<f64> {
    let mut dst = vec![0.0; src.len()];
    for o in 0..g.outer {
        for i in 0..g.inner {
            let max = (0..g.axis_len)
                .map(|k| src[g.index(o, k, i)])
                .fold(f64::NEG_INFINITY, f64::max);
            let mut sum = 0.0;
            for k in 0..g.axis_len {
                let idx = g.index(o, k, i);
                let e = (src[idx] - max).exp();
                dst[idx] = e;
                sum += e;
            }
            for k in 0..g.axis_len {
                dst[g.index(o, k, i)] /= sum;
            }
        }
    }
    dst
}

/// Gradient of softmax given its output `dst` and the incoming gradient
/// `diff_dst`: `diff_src = dst * (diff_dst - sum(diff_dst * dst))`.
pub fn softmax_backward(diff_dst: &[f64], dst: &[f64], g: AxisGeometry) -> Vec<f64> {
    let mut diff_src = vec![0.0; dst.len()];
    for o in 0..g.outer {
        for i in 0..g.inner {
            let dot: f64 = (0..g.axis_len)
                .map(|k| {
                    let idx = g.index(o, k, i);
                    diff_dst[idx] * dst[idx]
                })
                .sum();
            for k in 0..g.axis_len {
                let idx = g.index(o, k, i);
                diff_src[idx] = dst[idx] * (diff_dst[idx] - dot);
            }
        }
    }
    diff_src
}

/// `alpha * x + beta`, elementwise.
pub fn linear(src: &[f64], alpha: f64, beta: f64) -> Vec<f64> {
    src.iter().map(|&x| alpha * x + beta).collect()
}

/// Concatenate row-major inputs along an axis. `axis_lens[j]` is input j's
/// extent on the axis; `outer`/`inner` are shared by all inputs.
pub fn concat(srcs: &[Vec<f64>], axis_lens: &[usize], outer: usize, inner: usize) -> Vec<f64> {
    let total: usize = axis_lens.iter().sum();
    let mut dst = Vec::with_capacity(outer * total * inner);
    for o in 0..outer {
        for (src, &len) in srcs.iter().zip(axis_lens.iter()) {
            let run = len * inner;
            dst.extend_from_slice(&src[o * run..(o + 1) * run]);
        }
    }
    dst
}

/// `dst + src`, elementwise.
pub fn accumulate(dst: &[f64], src: &[f64]) -> Vec<f64> {
    dst.iter().zip(src.iter()).map(|(a, b)| a + b).collect()
}
