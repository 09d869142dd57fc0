//! Parsed template cache
//!
//! Parsing is the only step of processing whose result depends on nothing but
//! the template source and its mode, so parsed templates are cached as
//! [`ImmutableModel`]s and replayed for every call. A manager owns a
//! [`TemplateCache`]; a process-wide one is also available for
//! [`CacheMode::Aggressive`](crate::config::CacheMode::Aggressive).

use std::hash::Hash;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use indexmap::IndexMap;
use log::debug;

use crate::error::Result;
use crate::model::ImmutableModel;
use crate::template_mode::TemplateMode;

/// Bounded map with hit statistics
///
/// When full, the entry inserted first makes room for the new one.
pub struct Cache<K, V> {
    entries: IndexMap<K, V>,
    capacity: usize,
    hits: usize,
    misses: usize,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if self.capacity == 0 {
            return None;
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(key, value)
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and reset the statistics
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let requests = self.hits + self.misses;
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            hit_rate: if requests > 0 {
                self.hits as f64 / requests as f64
            } else {
                0.0
            },
            entry_count: self.entries.len(),
            capacity: self.capacity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: f64,
    pub entry_count: usize,
    pub capacity: usize,
}

/// Parsed templates are cached per source and template mode
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateCacheKey {
    pub template_name: Option<String>,
    pub content: Arc<str>,
    pub template_mode: TemplateMode,
}

impl TemplateCacheKey {
    pub fn new(template_name: Option<&str>, content: &str, template_mode: TemplateMode) -> Self {
        Self {
            template_name: template_name.map(str::to_owned),
            content: Arc::from(content),
            template_mode,
        }
    }
}

/// Thread-safe cache of parsed templates
pub struct TemplateCache {
    parsed_templates: RwLock<Cache<TemplateCacheKey, ImmutableModel>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            parsed_templates: RwLock::new(Cache::new(capacity)),
        }
    }

    /// Cached parse of `key`, running `parse` on a miss
    ///
    /// Parse errors are not cached.
    pub fn get_or_parse<F>(&self, key: &TemplateCacheKey, parse: F) -> Result<ImmutableModel>
    where
        F: FnOnce() -> Result<ImmutableModel>,
    {
        {
            let mut cache = self
                .parsed_templates
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(model) = cache.get(key) {
                debug!(target: "thymeleaf.engine.cache", "cache hit for {:?} ({})", key.template_name, key.template_mode);
                return Ok(model);
            }
        }

        debug!(target: "thymeleaf.engine.cache", "cache miss for {:?} ({})", key.template_name, key.template_mode);
        let model = parse()?;
        self.parsed_templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), model.clone());
        Ok(model)
    }

    pub fn invalidate(&self, key: &TemplateCacheKey) -> bool {
        self.parsed_templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn clear(&self) {
        self.parsed_templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.parsed_templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stats()
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_CACHE: OnceLock<TemplateCache> = OnceLock::new();

/// Process-wide cache, shared by every manager using aggressive caching
pub fn global_cache() -> &'static TemplateCache {
    GLOBAL_CACHE.get_or_init(TemplateCache::new)
}

pub fn clear_global_cache() {
    global_cache().clear();
}
