//! Memoization of compiled kernels.
//!
//! Kernels that share a program and build options are compiled once and
//! shared by every graph node that needs them. The cache is owned by whoever
//! builds the graph, so separate instances never share compiled state.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Compiled-kernel cache keyed by `K`.
#[derive(Debug)]
pub struct KernelCache<K, V> {
    entries: HashMap<K, Arc<V>>,
    /// Cache hits counter.
    hits: u64,
    /// Cache misses counter.
    misses: u64,
}

impl<K: Eq + Hash, V> KernelCache<K, V> {
    /// Empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up a kernel without building it.
    pub fn get(&mut self, key: &K) -> Option<Arc<V>> {
        match self.entries.get(key) {
            Some(v) => {
                self.hits += 1;
                Some(Arc::clone(v))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Returns the cached kernel or builds and caches it.
    ///
    /// A failed build caches nothing.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: K,
        build: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(v) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(v));
        }
        self.misses += 1;
        let v = Arc::new(build()?);
        self.entries.insert(key, Arc::clone(&v));
        Ok(v)
    }

    /// Number of cached kernels.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every cached kernel; counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that had to build.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Hit ratio (0.0 - 1.0).
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl<K: Eq + Hash, V> Default for KernelCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_once() {
        let mut cache: KernelCache<(u8, bool), String> = KernelCache::new();
        let mut builds = 0;
        for _ in 0..3 {
            let v = cache
                .get_or_try_insert_with((1, true), || {
                    builds += 1;
                    Ok::<_, ()>("k".to_string())
                })
                .unwrap();
            assert_eq!(*v, "k");
        }
        assert_eq!(builds, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
        assert!((cache.hit_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_build_not_cached() {
        let mut cache: KernelCache<u8, u8> = KernelCache::new();
        assert!(cache.get_or_try_insert_with(0, || Err("boom")).is_err());
        assert!(cache.is_empty());
        assert!(cache.get(&0).is_none());
        cache.get_or_try_insert_with(0, || Ok::<_, ()>(4)).unwrap();
        assert_eq!(cache.get(&0).as_deref(), Some(&4));
        cache.clear();
        assert!(cache.is_empty());
    }
}
