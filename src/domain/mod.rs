//! Domain layer - Cache, checksum, lock and flood abstractions

pub mod cache;
pub mod checksum;
pub mod clock;
pub mod error;
pub mod flood;
pub mod lock;
pub mod serialization;
pub mod store;

pub use cache::{CacheBackend, CacheBackendExt, CacheItem, CacheValue, CacheWrite, Expiry};
pub use checksum::{CacheTagsChecksum, UnitOfWork};
pub use error::CacheError;
pub use flood::FloodControl;
pub use lock::{LockBackend, LockOwner};
pub use serialization::{CodecId, Serializer};
pub use store::{StoreClient, StoreKeys, StoreOp, StoreReply};
