// CPU Backend Tests — planning and execution through the Backend trait
//
// Run with: `cargo test -p primcache-cpu`
//
// These drive CpuBackend the way the cache does: plan, instantiate, bind,
// execute. Numerical reference values are computed inline.

#[cfg(test)]
mod tests {
    use primcache_core::{
        ArgKind, Backend, BackendStorage, DType, EltwiseAlg, ExecArgs, Layout, OpDesc, PropKind,
        Shape, TensorDesc, TensorMut, TensorRef,
    };
    use primcache_cpu::{CpuBackend, CpuStorage, CpuStream, CpuTensor};

    fn approx(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    fn assert_approx_vec(actual: &[f64], expected: &[f64], tol: f64) {
        assert_eq!(
            actual.len(),
            expected.len(),
            "length mismatch: {} vs {}",
            actual.len(),
            expected.len()
        );
        for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
            assert!(approx(*a, *e, tol), "index {i}: {a} != {e} (tol={tol})");
        }
    }

    fn softmax_ref(row: &[f64]) -> Vec<f64> {
        let m = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let e: Vec<f64> = row.iter().map(|x| (x - m).exp()).collect();
        let s: f64 = e.iter().sum();
        e.iter().map(|x| x / s).collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Softmax
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn test_softmax_on_transposed_input() {
        let backend = CpuBackend::new();
        let mut stream = CpuStream::default();
        // [3, 2] viewed as the transpose of a row-major [2, 3]
        let base = CpuTensor::from_f64_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3), DType::F64)
            .unwrap();
        let x = base.transpose(0, 1).unwrap();
        let mut y = CpuTensor::zeros((3, 2), DType::F64);

        let plan = backend
            .plan(&OpDesc::SoftmaxForward {
                src: x.desc(),
                axis: 0,
                prop: PropKind::ForwardInference,
            })
            .unwrap();
        let prim = backend.instantiate(&plan).unwrap();
        let args = ExecArgs::new(ArgKind::Dst, y.view_mut()).with_src(ArgKind::Src, x.view());
        backend.execute(&prim, args, &mut stream).unwrap();

        // axis 0 of the transposed view is a row of the base tensor
        let r0 = softmax_ref(&[1.0, 2.0, 3.0]);
        let r1 = softmax_ref(&[4.0, 5.0, 6.0]);
        assert_approx_vec(
            &y.to_f64_vec(),
            &[r0[0], r1[0], r0[1], r1[1], r0[2], r1[2]],
            1e-12,
        );
    }

    #[test]
    fn test_softmax_f16_rounds_output() {
        let backend = CpuBackend::new();
        let mut stream = CpuStream::default();
        let x = CpuTensor::from_f64_slice(&[0.0, 0.0, 0.0, 0.0], 4, DType::F16).unwrap();
        let mut y = CpuTensor::zeros(4, DType::F16);
        let plan = backend
            .plan(&OpDesc::SoftmaxForward {
                src: x.desc(),
                axis: 0,
                prop: PropKind::ForwardInference,
            })
            .unwrap();
        let prim = backend.instantiate(&plan).unwrap();
        let args = ExecArgs::new(ArgKind::Dst, y.view_mut()).with_src(ArgKind::Src, x.view());
        backend.execute(&prim, args, &mut stream).unwrap();
        assert_eq!(y.to_f64_vec(), vec![0.25; 4]);
    }

    #[test]
    fn test_output_written_at_offset() {
        let backend = CpuBackend::new();
        let mut stream = CpuStream::default();
        let desc = TensorDesc::contiguous(2, DType::F32);
        let x = CpuStorage::from_f64_slice(&[0.0, 0.0], DType::F32);
        let mut out = CpuStorage::from_f64_slice(&[-1.0; 5], DType::F32);
        let plan = backend
            .plan(&OpDesc::SoftmaxForward {
                src: &desc,
                axis: 0,
                prop: PropKind::ForwardInference,
            })
            .unwrap();
        let prim = backend.instantiate(&plan).unwrap();
        let args = ExecArgs::new(ArgKind::Dst, TensorMut::new(&mut out, &desc).with_offset(2))
            .with_src(ArgKind::Src, TensorRef::new(&x, &desc));
        backend.execute(&prim, args, &mut stream).unwrap();
        assert_eq!(out.to_f64_vec(), vec![-1.0, -1.0, 0.5, 0.5, -1.0]);
    }

    #[test]
    fn test_softmax_reads_tensor_at_offset() {
        let backend = CpuBackend::new();
        let mut stream = CpuStream::default();
        let storage = CpuStorage::from_f64_slice(&[9.0, 9.0, 1.0, 2.0, 3.0], DType::F64);
        let x = CpuTensor::from_parts(storage, TensorDesc::contiguous(3, DType::F64), 2);
        assert_eq!(x.offset(), 2);
        assert_eq!(x.storage().len(), 5);
        assert_eq!(x.to_f64_vec(), vec![1.0, 2.0, 3.0]);

        let plan = backend
            .plan(&OpDesc::SoftmaxForward {
                src: x.desc(),
                axis: 0,
                prop: PropKind::ForwardInference,
            })
            .unwrap();
        let prim = backend.instantiate(&plan).unwrap();
        let mut y = CpuTensor::zeros(3, DType::F64);
        let args = ExecArgs::new(ArgKind::Dst, y.view_mut()).with_src(ArgKind::Src, x.view());
        backend.execute(&prim, args, &mut stream).unwrap();
        assert_approx_vec(&y.to_f64_vec(), &softmax_ref(&[1.0, 2.0, 3.0]), 1e-12);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Eltwise
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn test_linear_scale() {
        let backend = CpuBackend::new();
        let mut stream = CpuStream::default();
        let x = CpuTensor::from_f64_slice(&[2.0, -4.0], 2, DType::F32).unwrap();
        let mut y = CpuTensor::zeros(2, DType::F32);
        let plan = backend
            .plan(&OpDesc::Eltwise {
                src: x.desc(),
                alg: EltwiseAlg::Linear {
                    alpha: 0.5,
                    beta: 0.0,
                },
                prop: PropKind::ForwardInference,
            })
            .unwrap();
        let prim = backend.instantiate(&plan).unwrap();
        let args = ExecArgs::new(ArgKind::Dst, y.view_mut()).with_src(ArgKind::Src, x.view());
        backend.execute(&prim, args, &mut stream).unwrap();
        assert_eq!(y.to_f64_vec(), vec![1.0, -2.0]);
    }

    #[test]
    fn test_linear_rejects_infinite_alpha() {
        let backend = CpuBackend::new();
        let desc = TensorDesc::contiguous(2, DType::F32);
        let err = backend
            .plan(&OpDesc::Eltwise {
                src: &desc,
                alg: EltwiseAlg::Linear {
                    alpha: f32::INFINITY,
                    beta: 0.0,
                },
                prop: PropKind::ForwardInference,
            })
            .unwrap_err();
        assert!(err.is_planning());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Concat
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn test_concat_three_inputs_axis0() {
        let backend = CpuBackend::new();
        let mut stream = CpuStream::default();
        let a = CpuTensor::from_f64_slice(&[1.0, 2.0], (1, 2), DType::F32).unwrap();
        let b = CpuTensor::from_f64_slice(&[3.0, 4.0, 5.0, 6.0], (2, 2), DType::F32).unwrap();
        let c = CpuTensor::from_f64_slice(&[7.0, 8.0], (1, 2), DType::F32).unwrap();
        let descs = vec![a.desc().clone(), b.desc().clone(), c.desc().clone()];
        let plan = backend
            .plan(&OpDesc::Concat {
                srcs: &descs,
                axis: 0,
            })
            .unwrap();
        assert_eq!(plan.output_desc().dims(), &[4, 2]);
        let prim = backend.instantiate(&plan).unwrap();

        let mut out = CpuTensor::zeros((4, 2), DType::F32);
        let args = ExecArgs::new(ArgKind::Dst, out.view_mut())
            .with_src(ArgKind::MultipleSrc(0), a.view())
            .with_src(ArgKind::MultipleSrc(1), b.view())
            .with_src(ArgKind::MultipleSrc(2), c.view());
        backend.execute(&prim, args, &mut stream).unwrap();
        assert_eq!(
            out.to_f64_vec(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
        );
    }

    #[test]
    fn test_concat_missing_input_binding() {
        let backend = CpuBackend::new();
        let mut stream = CpuStream::default();
        let a = CpuTensor::zeros((1, 2), DType::F32);
        let descs = vec![a.desc().clone(), a.desc().clone()];
        let plan = backend
            .plan(&OpDesc::Concat {
                srcs: &descs,
                axis: 0,
            })
            .unwrap();
        let prim = backend.instantiate(&plan).unwrap();
        let mut out = CpuTensor::zeros((2, 2), DType::F32);
        let args = ExecArgs::new(ArgKind::Dst, out.view_mut())
            .with_src(ArgKind::MultipleSrc(0), a.view());
        let err = backend.execute(&prim, args, &mut stream).unwrap_err();
        assert!(err.is_execution());
        assert!(err.to_string().contains("src[1]"), "{err}");
    }

    #[test]
    fn test_concat_dtype_mismatch_is_planning_error() {
        let backend = CpuBackend::new();
        let descs = vec![
            TensorDesc::contiguous((1, 2), DType::F32),
            TensorDesc::contiguous((1, 2), DType::F64),
        ];
        let err = backend
            .plan(&OpDesc::Concat {
                srcs: &descs,
                axis: 0,
            })
            .unwrap_err();
        assert!(err.is_planning());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Allocation and counters
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn test_alloc_covers_strided_span() {
        let backend = CpuBackend::new();
        let layout = Layout::new(Shape::from((2, 2)), vec![1, 3]).unwrap();
        let desc = TensorDesc::new(DType::F32, layout);
        let buf = backend.alloc(&desc).unwrap();
        assert_eq!(buf.to_f64_vec().len(), desc.layout().span());
        assert_eq!(backend.stats().allocations, 1);
    }

    #[test]
    fn test_clones_share_counters() {
        let backend = CpuBackend::new();
        let other = backend.clone();
        let desc = TensorDesc::contiguous(3, DType::F32);
        other
            .plan(&OpDesc::SoftmaxForward {
                src: &desc,
                axis: 0,
                prop: PropKind::ForwardInference,
            })
            .unwrap();
        assert_eq!(backend.stats().plan_calls, 1);
        backend.reset_stats();
        assert_eq!(other.stats().plan_calls, 0);
    }
}
