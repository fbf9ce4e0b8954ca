// PrimitiveContext — per-worker owner of the caches
//
// A host creates one context per worker and passes it into every call. The
// context owns:
//
//   backend   the planning/execution collaborator
//   stream    where primitives are submitted, in order
//   caches    one PrimitiveCache per operator
//   config    cache and validation switches
//
// Nothing here is shared: caches are mutated through `&mut self`, so two
// workers that see the same signature each plan it once in their own context.

use std::fmt;

use primcache_core::{Backend, BackendStream, ExecArgs, OpDesc, Plan, Result, TensorDesc};

use crate::cache::{CacheStats, PrimitiveCache};
use crate::concat::ConcatForward;
use crate::config::ContextConfig;
use crate::signature::OpSignature;
use crate::softmax::{SoftmaxBackward, SoftmaxForward};

/// A planned and instantiated backend primitive.
pub struct Stage<B: Backend> {
    plan: Plan,
    primitive: B::Primitive,
}

impl<B: Backend> Stage<B> {
    /// Plan `op` and instantiate the result.
    pub fn build(backend: &B, op: &OpDesc<'_>) -> Result<Self> {
        Self::from_plan(backend, backend.plan(op)?)
    }

    /// Instantiate an already planned primitive.
    pub fn from_plan(backend: &B, plan: Plan) -> Result<Self> {
        let primitive = backend.instantiate(&plan)?;
        tracing::debug!(
            target: "primcache",
            backend = %backend.name(),
            primitive = %plan.kind(),
            output = %plan.output_desc(),
            "planned primitive"
        );
        Ok(Stage { plan, primitive })
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn primitive(&self) -> &B::Primitive {
        &self.primitive
    }
}

impl<B: Backend> fmt::Debug for Stage<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("plan", &self.plan)
            .field("primitive", &self.primitive)
            .finish()
    }
}

pub(crate) struct Caches<B: Backend> {
    pub(crate) softmax_fwd: PrimitiveCache<SoftmaxForward<B>>,
    pub(crate) softmax_bwd: PrimitiveCache<SoftmaxBackward<B>>,
    pub(crate) concat: PrimitiveCache<ConcatForward<B>>,
}

/// Cache counters of a context, per operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub softmax_forward: CacheStats,
    pub softmax_backward: CacheStats,
    pub concat: CacheStats,
}

impl ContextStats {
    pub fn total_entries(&self) -> usize {
        self.softmax_forward.entries + self.softmax_backward.entries + self.concat.entries
    }
}

/// Execution context: backend, stream and primitive caches of one worker.
pub struct PrimitiveContext<B: Backend> {
    backend: B,
    stream: B::Stream,
    config: ContextConfig,
    caches: Caches<B>,
}

impl<B: Backend> PrimitiveContext<B> {
    pub fn new(backend: B, stream: B::Stream) -> Self {
        Self::with_config(backend, stream, ContextConfig::default())
    }

    pub fn with_config(backend: B, stream: B::Stream, config: ContextConfig) -> Self {
        PrimitiveContext {
            backend,
            stream,
            config,
            caches: Caches {
                softmax_fwd: PrimitiveCache::new("softmax_forward"),
                softmax_bwd: PrimitiveCache::new("softmax_backward"),
                concat: PrimitiveCache::new("concat"),
            },
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn stream(&self) -> &B::Stream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut B::Stream {
        &mut self.stream
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Block until everything submitted so far has finished.
    pub fn wait(&mut self) -> Result<()> {
        self.stream.wait()
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            softmax_forward: self.caches.softmax_fwd.stats(),
            softmax_backward: self.caches.softmax_bwd.stats(),
            concat: self.caches.concat.stats(),
        }
    }

    /// Drop every cached entry. Handles already given out stay usable.
    pub fn clear(&mut self) {
        self.caches.softmax_fwd.clear();
        self.caches.softmax_bwd.clear();
        self.caches.concat.clear();
    }

    /// Look up `signature` in the cache `select` picks, building the entry
    /// with the backend on a miss.
    pub(crate) fn cached<V, F>(
        &mut self,
        select: fn(&mut Caches<B>) -> &mut PrimitiveCache<V>,
        signature: OpSignature,
        build: F,
    ) -> Result<std::sync::Arc<V>>
    where
        F: FnOnce(&B) -> Result<V>,
    {
        let backend = &self.backend;
        let cache = select(&mut self.caches);
        if self.config.cache_enabled {
            cache.get_or_build(signature, || build(backend))
        } else {
            cache.build_uncached(|| build(backend))
        }
    }

    pub(crate) fn validate_bindings(&self) -> bool {
        self.config.validate_bindings
    }

    pub(crate) fn alloc(&self, desc: &TensorDesc) -> Result<B::Storage> {
        self.backend.alloc(desc)
    }

    /// Submit one stage to the stream.
    pub(crate) fn submit(
        &mut self,
        stage: &Stage<B>,
        args: ExecArgs<'_, B::Storage>,
    ) -> Result<()> {
        tracing::trace!(
            target: "primcache",
            stream = %self.stream.name(),
            primitive = %stage.plan.kind(),
            "submit"
        );
        self.backend.execute(&stage.primitive, args, &mut self.stream)
    }
}

impl<B: Backend> fmt::Debug for PrimitiveContext<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveContext")
            .field("backend", &self.backend)
            .field("stream", &self.stream)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
