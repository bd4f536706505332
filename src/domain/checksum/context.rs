//! Per unit-of-work state for checksum and watermark reads

use std::collections::{HashMap, HashSet};

/// State scoped to one logical unit of work (typically one request)
///
/// Holds the tag counters already read from the store, the tags already
/// invalidated during this unit of work and each bin's delete-all watermark.
/// Each concurrent worker owns its own instance; call [`reset`](Self::reset)
/// between independent requests of a long-lived worker.
#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    tag_cache: HashMap<String, i64>,
    invalidated_tags: HashSet<String>,
    watermarks: HashMap<String, Option<f64>>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every cached counter, invalidation and watermark
    pub fn reset(&mut self) {
        self.tag_cache.clear();
        self.invalidated_tags.clear();
        self.watermarks.clear();
    }

    /// Last counter value observed for `tag`
    pub fn cached_counter(&self, tag: &str) -> Option<i64> {
        self.tag_cache.get(tag).copied()
    }

    pub fn cache_counter(&mut self, tag: &str, value: i64) {
        self.tag_cache.insert(tag.to_string(), value);
    }

    pub fn forget_counter(&mut self, tag: &str) {
        self.tag_cache.remove(tag);
    }

    /// Marks `tag` invalidated, returning false if it already was
    pub fn mark_invalidated(&mut self, tag: &str) -> bool {
        self.invalidated_tags.insert(tag.to_string())
    }

    pub fn clear_invalidated(&mut self, tag: &str) {
        self.invalidated_tags.remove(tag);
    }

    pub fn is_invalidated(&self, tag: &str) -> bool {
        self.invalidated_tags.contains(tag)
    }

    /// Delete-all watermark of `bin`, if already read in this unit of work
    ///
    /// The inner `None` means the bin has never been emptied.
    pub fn watermark(&self, bin: &str) -> Option<Option<f64>> {
        self.watermarks.get(bin).copied()
    }

    pub fn record_watermark(&mut self, bin: &str, watermark: Option<f64>) {
        self.watermarks.insert(bin.to_string(), watermark);
    }
}
