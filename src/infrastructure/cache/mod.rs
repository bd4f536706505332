//! Cache infrastructure - Cache bin implementations

mod backend;
mod factory;

pub use backend::StoreCacheBackend;
pub use factory::{BinSettings, CacheBackendFactory, CacheSettings};
