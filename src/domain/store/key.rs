//! Store key layout

/// Field used by the bin-wide delete-all watermark, stored next to the bin's
/// cache records.
pub const LAST_DELETE_ALL_KEY: &str = "_last_delete_all";

/// Builds every key written by the cache, checksum, lock and flood backends
///
/// All keys share one namespace prefix:
/// - `<prefix>:<bin>:<cid>` for cache records
/// - `<prefix>:cachetags:<tag>` for tag counters
/// - `<prefix>:lock:<name>` for locks
/// - `<prefix>:flood:<name>:<identifier>` for flood events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    prefix: String,
}

impl StoreKeys {
    /// Creates a key builder for the given prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of the hash record holding `cid` in `bin`
    pub fn cache_key(&self, bin: &str, cid: &str) -> String {
        self.namespaced(&[bin, cid])
    }

    /// Key of the invalidation counter for `tag`
    pub fn tag_key(&self, tag: &str) -> String {
        self.namespaced(&["cachetags", tag])
    }

    /// Key of the delete-all watermark for `bin`
    pub fn last_delete_all_key(&self, bin: &str) -> String {
        self.namespaced(&[bin, LAST_DELETE_ALL_KEY])
    }

    pub fn lock_key(&self, name: &str) -> String {
        self.namespaced(&["lock", name])
    }

    pub fn flood_key(&self, name: &str, identifier: &str) -> String {
        self.namespaced(&["flood", name, identifier])
    }

    fn namespaced(&self, parts: &[&str]) -> String {
        if self.prefix.is_empty() {
            parts.join(":")
        } else {
            format!("{}:{}", self.prefix, parts.join(":"))
        }
    }
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self::new("tagcache")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key() {
        let keys = StoreKeys::new("site");
        assert_eq!(keys.cache_key("page", "front"), "site:page:front");
    }

    #[test]
    fn test_tag_key() {
        let keys = StoreKeys::new("site");
        assert_eq!(keys.tag_key("node:5"), "site:cachetags:node:5");
    }

    #[test]
    fn test_last_delete_all_key() {
        let keys = StoreKeys::new("site");
        assert_eq!(
            keys.last_delete_all_key("render"),
            "site:render:_last_delete_all"
        );
    }

    #[test]
    fn test_lock_and_flood_keys() {
        let keys = StoreKeys::new("site");
        assert_eq!(keys.lock_key("cron"), "site:lock:cron");
        assert_eq!(
            keys.flood_key("user.failed_login", "10.0.0.1"),
            "site:flood:user.failed_login:10.0.0.1"
        );
    }

    #[test]
    fn test_empty_prefix() {
        let keys = StoreKeys::new("");
        assert_eq!(keys.cache_key("page", "front"), "page:front");
        assert_eq!(keys.tag_key("node:5"), "cachetags:node:5");
    }
}
