//! Infrastructure layer - Store-backed implementations

pub mod cache;
pub mod checksum;
pub mod flood;
pub mod lock;
pub mod logging;
pub mod observability;
pub mod serialization;
pub mod store;
