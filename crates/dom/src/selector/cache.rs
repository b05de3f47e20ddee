//! Process-wide selector cache
//!
//! Compilation is a pure function of the selector text, so compiled
//! selectors can be shared freely. Entries are never replaced or evicted;
//! once the cache is full, new selectors are compiled on every call.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::CompiledSelector;
use crate::error::Result;

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached selectors
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Selector text → compiled selector
#[derive(Debug)]
pub struct SelectorCache {
    entries: DashMap<String, Arc<CompiledSelector>, ahash::RandomState>,
    capacity: usize,
}

impl SelectorCache {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::with_capacity_and_hasher(
                config.capacity.min(1024),
                ahash::RandomState::new(),
            ),
            capacity: config.capacity,
        }
    }

    /// Return the cached selector, compiling (and caching) it on a miss.
    /// Failed compilations are not cached.
    pub fn get_or_compile(&self, selector: &str) -> Result<Arc<CompiledSelector>> {
        // Clone out so the shard lock is released before any insert
        let hit = self.entries.get(selector).map(|entry| Arc::clone(entry.value()));
        if let Some(compiled) = hit {
            return Ok(compiled);
        }

        let compiled = Arc::new(CompiledSelector::compile(selector)?);

        if self.entries.len() >= self.capacity {
            tracing::debug!(
                "Selector cache full ({} entries), not caching '{}'",
                self.capacity,
                selector
            );
            return Ok(compiled);
        }

        let stored = self
            .entries
            .entry(selector.to_string())
            .or_insert(compiled);
        tracing::debug!("Cached selector '{}'", selector);
        Ok(Arc::clone(stored.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SelectorCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared cache used by the string-selector methods of [`crate::Query`]
pub fn global_cache() -> &'static SelectorCache {
    static CACHE: OnceLock<SelectorCache> = OnceLock::new();
    CACHE.get_or_init(SelectorCache::new)
}
