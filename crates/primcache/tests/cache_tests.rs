// Context / cache tests — lifecycle, configuration and statistics

use std::sync::Arc;

use primcache::prelude::*;
use primcache::ContextStats;
use primcache_cpu::{CpuBackend, CpuStream, CpuTensor};

fn sample() -> (CpuTensor, CpuTensor) {
    let x = CpuTensor::from_f64_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3), DType::F32)
        .unwrap();
    let y = CpuTensor::zeros((2, 3), DType::F32);
    (x, y)
}

#[test]
fn test_disabled_cache_plans_every_call() {
    let config = ContextConfig::default().with_cache(false);
    let mut ctx = PrimitiveContext::with_config(CpuBackend::new(), CpuStream::new(0), config);
    let (x, mut y) = sample();
    let t = SoftmaxFwdTensors::new(x.view(), y.view_mut());
    let a = SoftmaxForward::get_cached(&mut ctx, &SoftmaxParam::new(1), &t, false).unwrap();
    let b = SoftmaxForward::get_cached(&mut ctx, &SoftmaxParam::new(1), &t, false).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(ctx.backend().stats().plan_calls, 2);
    let stats = ctx.stats().softmax_forward;
    assert_eq!((stats.entries, stats.hits, stats.misses), (0, 0, 2));
}

#[test]
fn test_disabled_cache_still_computes() {
    let config = ContextConfig::default().with_cache(false);
    let mut cold = PrimitiveContext::with_config(CpuBackend::new(), CpuStream::new(0), config);
    let mut warm = PrimitiveContext::new(CpuBackend::new(), CpuStream::new(1));
    let (x, mut y1) = sample();
    let mut y2 = CpuTensor::zeros((2, 3), DType::F32);
    let param = SoftmaxParam::new(0).with_temperature(1.5);
    softmax_forward(&mut cold, &param, SoftmaxFwdTensors::new(x.view(), y1.view_mut()), false)
        .unwrap();
    softmax_forward(&mut warm, &param, SoftmaxFwdTensors::new(x.view(), y2.view_mut()), false)
        .unwrap();
    assert_eq!(y1.to_f64_vec(), y2.to_f64_vec());
}

#[test]
fn test_contexts_do_not_share_entries() {
    // Clones of one backend share counters, so both plans are visible.
    let backend = CpuBackend::new();
    let mut c1 = PrimitiveContext::new(backend.clone(), CpuStream::new(0));
    let mut c2 = PrimitiveContext::new(backend.clone(), CpuStream::new(1));
    let (x, mut y) = sample();
    let t = SoftmaxFwdTensors::new(x.view(), y.view_mut());
    let a = SoftmaxForward::get_cached(&mut c1, &SoftmaxParam::new(1), &t, false).unwrap();
    let b = SoftmaxForward::get_cached(&mut c2, &SoftmaxParam::new(1), &t, false).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(backend.stats().plan_calls, 2);
}

#[test]
fn test_clear_drops_entries_but_not_handles() {
    let mut ctx = PrimitiveContext::new(CpuBackend::new(), CpuStream::new(0));
    let (x, mut y) = sample();
    let old = {
        let t = SoftmaxFwdTensors::new(x.view(), y.view_mut());
        SoftmaxForward::get_cached(&mut ctx, &SoftmaxParam::new(1), &t, false).unwrap()
    };
    ctx.clear();
    assert_eq!(ctx.stats(), ContextStats::default());

    // the old handle still runs
    let mut t = SoftmaxFwdTensors::new(x.view(), y.view_mut());
    old.execute(&mut ctx, &mut t).unwrap();
    let fresh = SoftmaxForward::get_cached(&mut ctx, &SoftmaxParam::new(1), &t, false).unwrap();
    assert!(!Arc::ptr_eq(&old, &fresh));
}

#[test]
fn test_stats_per_operator() {
    let mut ctx = PrimitiveContext::new(CpuBackend::new(), CpuStream::new(0));
    let (x, mut y) = sample();
    for _ in 0..3 {
        softmax_forward(
            &mut ctx,
            &SoftmaxParam::new(1),
            SoftmaxFwdTensors::new(x.view(), y.view_mut()),
            true,
        )
        .unwrap();
    }
    let mut dx = CpuTensor::zeros((2, 3), DType::F32);
    softmax_backward(
        &mut ctx,
        &SoftmaxParam::new(1),
        SoftmaxBwdTensors::new(x.view(), y.view(), dx.view_mut()),
        WriteReq::WriteTo,
    )
    .unwrap();
    let mut joined = CpuTensor::zeros((4, 3), DType::F32);
    concat_forward(&mut ctx, 0, &[x.view(), y.view()], joined.view_mut()).unwrap();

    let stats = ctx.stats();
    assert_eq!(stats.softmax_forward.entries, 1);
    assert_eq!(stats.softmax_forward.hits, 2);
    assert_eq!(stats.softmax_backward.entries, 1);
    assert_eq!(stats.concat.entries, 1);
    assert_eq!(stats.total_entries(), 3);
}

#[test]
fn test_backend_sees_one_plan_per_entry() {
    let mut ctx = PrimitiveContext::new(CpuBackend::new(), CpuStream::new(0));
    let (x, mut y) = sample();
    for _ in 0..5 {
        softmax_forward(
            &mut ctx,
            &SoftmaxParam::new(1).with_temperature(2.0),
            SoftmaxFwdTensors::new(x.view(), y.view_mut()),
            false,
        )
        .unwrap();
    }
    let s = ctx.backend().stats();
    // softmax + scale, planned once
    assert_eq!(s.plan_calls, 2);
    assert_eq!(s.instantiations, 2);
    // two stages per call
    assert_eq!(s.executions, 10);
    assert_eq!(ctx.stream().submitted(), 10);
}

#[test]
fn test_support_predicates_match_backend() {
    let f = TensorDesc::contiguous((2, 3), DType::F32);
    let i = TensorDesc::contiguous((2, 3), DType::U8);
    assert!(supports_softmax(&f, &f));
    assert!(!supports_softmax(&i, &i));
    assert!(supports_concat(&[f.clone(), f]));
    assert!(!supports_concat(&[i]));
}

#[test]
fn test_wait_on_cpu_stream() {
    let mut ctx = PrimitiveContext::new(CpuBackend::new(), CpuStream::new(0));
    ctx.wait().unwrap();
    assert!(format!("{ctx:?}").contains("PrimitiveContext"));
}
