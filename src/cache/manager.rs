//! Keyed cache with single-flight construction bookkeeping.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::adapters::Teardown;
use crate::observability::metrics;

struct CacheState<V> {
    entries: BTreeMap<String, V>,
    initializing: BTreeSet<String>,
}

/// Cache of long-lived instances keyed by name (or `name:variant`).
pub struct CacheManager<V> {
    name: String,
    state: Mutex<CacheState<V>>,
    default_variants: HashMap<String, String>,
}

impl<V: Clone> CacheManager<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(CacheState {
                entries: BTreeMap::new(),
                initializing: BTreeSet::new(),
            }),
            default_variants: HashMap::new(),
        }
    }

    /// Configured variants (e.g. model names) used when no override is given.
    pub fn with_default_variants(mut self, variants: HashMap<String, String>) -> Self {
        self.default_variants = variants;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.lock().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn get_cached_keys(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    pub fn get_cache_size(&self) -> usize {
        self.lock().entries.len()
    }

    /// Mark `key` as being constructed by the caller.
    ///
    /// Returns false without waiting when the key is already cached or claimed.
    pub fn claim_initialization(&self, key: &str) -> bool {
        let mut state = self.lock();
        if state.entries.contains_key(key) || state.initializing.contains(key) {
            return false;
        }
        state.initializing.insert(key.to_string());
        true
    }

    /// Clear the initializing mark, whether construction succeeded or not.
    pub fn release_initialization(&self, key: &str) {
        self.lock().initializing.remove(key);
    }

    pub fn is_initializing(&self, key: &str) -> bool {
        self.lock().initializing.contains(key)
    }

    pub fn initializing_keys(&self) -> Vec<String> {
        self.lock().initializing.iter().cloned().collect()
    }

    /// Store a constructed instance. Clears any claim on the key in the same step.
    pub fn put(&self, key: &str, value: V) {
        let size = {
            let mut state = self.lock();
            state.initializing.remove(key);
            state.entries.insert(key.to_string(), value);
            state.entries.len()
        };
        metrics::record_cache_size(&self.name, size);
    }

    /// Compose a cache key from a base name and an optional variant.
    ///
    /// Without an explicit override the configured default variant for
    /// `base_name` is used; with neither, the key is the base name itself.
    pub fn build_cache_key(&self, base_name: &str, explicit_override: Option<&str>) -> String {
        let variant = explicit_override
            .filter(|v| !v.is_empty())
            .or_else(|| self.default_variants.get(base_name).map(String::as_str));
        match variant {
            Some(variant) => format!("{base_name}:{variant}"),
            None => base_name.to_string(),
        }
    }
}

impl<V: Clone + Teardown> CacheManager<V> {
    /// Evict one entry, closing it. Also drops any claim on the key.
    pub async fn remove(&self, key: &str) -> bool {
        let (removed, size) = {
            let mut state = self.lock();
            state.initializing.remove(key);
            let removed = state.entries.remove(key);
            (removed, state.entries.len())
        };
        metrics::record_cache_size(&self.name, size);

        match removed {
            Some(value) => {
                value.close().await;
                tracing::debug!(cache = %self.name, key = %key, "Cache entry closed and evicted");
                true
            }
            None => false,
        }
    }

    /// Evict and close every entry.
    pub async fn clear(&self) -> usize {
        let drained: Vec<(String, V)> = {
            let mut state = self.lock();
            state.initializing.clear();
            std::mem::take(&mut state.entries).into_iter().collect()
        };
        metrics::record_cache_size(&self.name, 0);

        let count = drained.len();
        for (key, value) in drained {
            value.close().await;
            tracing::debug!(cache = %self.name, key = %key, "Cache entry closed and evicted");
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Service {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Teardown for Service {
        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_claim_is_exclusive_until_released() {
        let cache: CacheManager<u32> = CacheManager::new("test");
        assert!(cache.claim_initialization("a"));
        assert!(!cache.claim_initialization("a"));
        assert!(cache.is_initializing("a"));

        cache.release_initialization("a");
        assert!(!cache.is_initializing("a"));
        assert!(cache.claim_initialization("a"));
    }

    #[test]
    fn test_put_clears_claim_and_blocks_new_claims() {
        let cache: CacheManager<u32> = CacheManager::new("test");
        assert!(cache.claim_initialization("a"));
        cache.put("a", 1);

        assert!(!cache.is_initializing("a"));
        assert_eq!(cache.get("a"), Some(1));
        assert!(!cache.claim_initialization("a"));
        assert_eq!(cache.get_cached_keys(), vec!["a".to_string()]);
        assert_eq!(cache.get_cache_size(), 1);
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let cache: Arc<CacheManager<u32>> = Arc::new(CacheManager::new("test"));
        let barrier = Arc::new(std::sync::Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    cache.claim_initialization("shared")
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_build_cache_key() {
        let variants = HashMap::from([("embedder".to_string(), "small".to_string())]);
        let cache: CacheManager<u32> = CacheManager::new("providers").with_default_variants(variants);

        assert_eq!(cache.build_cache_key("embedder", None), "embedder:small");
        assert_eq!(cache.build_cache_key("embedder", Some("large")), "embedder:large");
        assert_eq!(cache.build_cache_key("llm", None), "llm");
        assert_eq!(cache.build_cache_key("llm", Some("")), "llm");
    }

    #[tokio::test]
    async fn test_remove_and_clear_close_values() {
        let closed = Arc::new(AtomicUsize::new(0));
        let cache: CacheManager<Arc<Service>> = CacheManager::new("services");
        for key in ["a", "b", "c"] {
            cache.put(key, Arc::new(Service { closed: closed.clone() }));
        }

        assert!(cache.remove("a").await);
        assert!(!cache.remove("a").await);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        assert_eq!(cache.clear().await, 2);
        assert_eq!(closed.load(Ordering::SeqCst), 3);
        assert_eq!(cache.get_cache_size(), 0);
    }
}
