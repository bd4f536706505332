//! Checksum domain - Tag invalidation counters

mod context;
mod repository;

pub use context::UnitOfWork;
pub use repository::CacheTagsChecksum;
