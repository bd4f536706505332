//! Cache domain - Tag-invalidated cache bins

mod entry;
mod repository;
mod tags;

pub use entry::{
    CacheItem, CacheRecord, CacheValue, CacheWrite, Expiry, MultipleLookup, StoredData,
    VALID_FIELD,
};
pub use repository::{CacheBackend, CacheBackendExt};
pub use tags::{bin_tag, normalize_tags, validate_tag, BIN_TAG_PREFIX};
