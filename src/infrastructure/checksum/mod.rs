//! Checksum infrastructure - Tag counters kept in the store

mod store_checksum;

pub use store_checksum::StoreCacheTagsChecksum;
