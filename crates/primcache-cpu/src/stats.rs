// Backend call counters
//
// Planning is the expensive step the cache exists to avoid, so the CPU
// backend counts every request it receives. Tests read these counters to
// prove that a cache hit (or an early configuration error) never reached
// the backend.
//
// The counters live behind an Arc shared by all clones of a CpuBackend and
// use relaxed atomics; they are diagnostics, not synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a backend's call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// `plan` calls, including the ones that were refused.
    pub plan_calls: u64,
    /// `plan` calls that returned a planning error.
    pub plan_failures: u64,
    /// Primitives instantiated from plans.
    pub instantiations: u64,
    /// Primitives executed.
    pub executions: u64,
    /// Scratch buffers handed out by `alloc`.
    pub allocations: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    plan_calls: AtomicU64,
    plan_failures: AtomicU64,
    instantiations: AtomicU64,
    executions: AtomicU64,
    allocations: AtomicU64,
}

impl Counters {
    pub(crate) fn plan_called(&self) {
        self.plan_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn plan_failed(&self) {
        self.plan_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn instantiated(&self) {
        self.instantiations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn executed(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn allocated(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BackendStats {
        BackendStats {
            plan_calls: self.plan_calls.load(Ordering::Relaxed),
            plan_failures: self.plan_failures.load(Ordering::Relaxed),
            instantiations: self.instantiations.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        self.plan_calls.store(0, Ordering::Relaxed);
        self.plan_failures.store(0, Ordering::Relaxed);
        self.instantiations.store(0, Ordering::Relaxed);
        self.executions.store(0, Ordering::Relaxed);
        self.allocations.store(0, Ordering::Relaxed);
    }
}
