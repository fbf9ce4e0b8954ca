// PrimitiveCache — signature → built entry
//
// One map per operator, owned by a PrimitiveContext and mutated through
// `&mut self` only. Entries are `Arc`s so a caller can keep the handle it got
// back while the cache keeps serving (and growing) for other signatures.
// Nothing is ever evicted; `clear` drops every entry at once.
//
// A failed build inserts nothing, so the same signature is planned again on
// the next call and reports the same error.

use std::collections::hash_map::Entry;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use primcache_core::Result;

use crate::signature::OpSignature;

/// Lookup counters of one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently held.
    pub entries: usize,
    pub hits: u64,
    /// Builds, including failed ones and builds that bypassed the cache.
    pub misses: u64,
}

/// Memoization table for built primitives of one operator.
#[derive(Debug)]
pub struct PrimitiveCache<V> {
    name: &'static str,
    entries: FxHashMap<OpSignature, Arc<V>>,
    hits: u64,
    misses: u64,
}

impl<V> PrimitiveCache<V> {
    pub fn new(name: &'static str) -> Self {
        PrimitiveCache {
            name,
            entries: FxHashMap::default(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return the entry for `signature`, building and inserting it on a miss.
    ///
    /// `build` runs at most once, and only on a miss.
    pub fn get_or_build<F>(&mut self, signature: OpSignature, build: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        match self.entries.entry(signature) {
            Entry::Occupied(e) => {
                self.hits += 1;
                tracing::trace!(
                    target: "primcache",
                    cache = self.name,
                    sig = format_args!("{:016x}", e.key().fingerprint()),
                    "cache hit"
                );
                Ok(Arc::clone(e.get()))
            }
            Entry::Vacant(e) => {
                self.misses += 1;
                tracing::debug!(
                    target: "primcache",
                    cache = self.name,
                    sig = format_args!("{:016x}", e.key().fingerprint()),
                    "cache miss, building"
                );
                let value = Arc::new(build()?);
                e.insert(Arc::clone(&value));
                Ok(value)
            }
        }
    }

    /// Build a fresh entry without consulting or filling the map.
    pub fn build_uncached<F>(&mut self, build: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        self.misses += 1;
        tracing::debug!(target: "primcache", cache = self.name, "cache bypassed, building");
        Ok(Arc::new(build()?))
    }

    pub fn get(&self, signature: &OpSignature) -> Option<&Arc<V>> {
        self.entries.get(signature)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    /// Drop every entry and reset the counters. Handles already given out
    /// stay valid.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primcache_core::Error;

    fn sig(n: usize) -> OpSignature {
        let mut s = OpSignature::new();
        s.add_sign(&n);
        s
    }

    #[test]
    fn test_hit_returns_same_entry_without_building() {
        let mut cache = PrimitiveCache::new("test");
        let a = cache.get_or_build(sig(1), || Ok(10)).unwrap();
        let b = cache
            .get_or_build(sig(1), || -> Result<i32> { panic!("built twice") })
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(cache.get(&sig(1)).unwrap(), &a));
        assert!(cache.get(&sig(2)).is_none());
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                hits: 1,
                misses: 1
            }
        );
    }

    #[test]
    fn test_failed_build_inserts_nothing() {
        let mut cache: PrimitiveCache<i32> = PrimitiveCache::new("test");
        let err = cache
            .get_or_build(sig(1), || Err(Error::planning("sum", "nope")))
            .unwrap_err();
        assert!(err.is_planning());
        assert!(cache.is_empty());
        let mut calls = 0;
        cache
            .get_or_build(sig(1), || {
                calls += 1;
                Ok(3)
            })
            .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_uncached_builds_are_distinct() {
        let mut cache = PrimitiveCache::new("test");
        let a = cache.build_uncached(|| Ok(1)).unwrap();
        let b = cache.build_uncached(|| Ok(1)).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_clear_keeps_handles_alive() {
        let mut cache = PrimitiveCache::new("test");
        let a = cache.get_or_build(sig(7), || Ok(String::from("x"))).unwrap();
        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
        assert_eq!(a.as_str(), "x");
        let b = cache.get_or_build(sig(7), || Ok(String::from("x"))).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
