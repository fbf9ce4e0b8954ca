// ContextConfig — knobs of a PrimitiveContext
//
// Both switches default to the safe, fast setting. Hosts that want to flip
// them without recompiling can read them from the environment:
//
//   PRIMCACHE_DISABLE_CACHE=1        plan every call from scratch
//   PRIMCACHE_SKIP_BINDING_CHECKS=1  skip the per-call descriptor checks
//
// Accepted truthy values are `1` and `true` (any case).

pub const ENV_DISABLE_CACHE: &str = "PRIMCACHE_DISABLE_CACHE";
pub const ENV_SKIP_BINDING_CHECKS: &str = "PRIMCACHE_SKIP_BINDING_CHECKS";

/// Configuration of a [`PrimitiveContext`](crate::PrimitiveContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    /// When false, `get_cached` builds a fresh entry on every call and
    /// inserts nothing (default: true).
    pub cache_enabled: bool,
    /// Check that every bound tensor matches its planned descriptor before
    /// the first primitive of a call is submitted (default: true).
    pub validate_bindings: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            validate_bindings: true,
        }
    }
}

impl ContextConfig {
    /// Enable or disable the primitive caches.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Enable or disable up-front binding checks.
    pub fn with_binding_checks(mut self, enabled: bool) -> Self {
        self.validate_bindings = enabled;
        self
    }

    /// Defaults, overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults, overridden by whatever `lookup` returns for the
    /// environment keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).is_some_and(|v| is_truthy(&v));
        Self::default()
            .with_cache(!flag(ENV_DISABLE_CACHE))
            .with_binding_checks(!flag(ENV_SKIP_BINDING_CHECKS))
    }
}

fn is_truthy(value: &str) -> bool {
    let v = value.trim();
    v == "1" || v.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = ContextConfig::default();
        assert!(c.cache_enabled);
        assert!(c.validate_bindings);
        assert_eq!(ContextConfig::from_lookup(lookup(&[])), c);
    }

    #[test]
    fn test_builder() {
        let c = ContextConfig::default()
            .with_cache(false)
            .with_binding_checks(false);
        assert!(!c.cache_enabled);
        assert!(!c.validate_bindings);
    }

    #[test]
    fn test_env_flags() {
        let c = ContextConfig::from_lookup(lookup(&[(ENV_DISABLE_CACHE, "TRUE")]));
        assert!(!c.cache_enabled);
        assert!(c.validate_bindings);

        let c = ContextConfig::from_lookup(lookup(&[(ENV_SKIP_BINDING_CHECKS, "1")]));
        assert!(c.cache_enabled);
        assert!(!c.validate_bindings);

        let c = ContextConfig::from_lookup(lookup(&[(ENV_DISABLE_CACHE, "0")]));
        assert!(c.cache_enabled);
    }
}
