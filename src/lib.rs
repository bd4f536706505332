//! tagcache
//!
//! Cache bins over a Redis-style store with support for:
//! - Tag invalidation through per-tag checksum counters
//! - Per-item invalidation and bin-wide delete watermarks
//! - Store-backed locks and flood control
//! - Single node, replicated, cluster and in-process stores

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{CacheBackend, CacheBackendExt, CacheError, Expiry, UnitOfWork};
pub use infrastructure::cache::{CacheBackendFactory, CacheSettings};
pub use infrastructure::store::{ClientFactory, ConnectionSettings, Topology};
