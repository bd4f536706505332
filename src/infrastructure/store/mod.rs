//! Store infrastructure - Store client implementations

mod connection;
mod factory;
mod in_memory;
mod redis;
mod replicated;
mod settings;

pub use connection::{connect_node, NodeConnection};
pub use factory::{create_client, ClientFactory};
pub use in_memory::InMemoryStore;
pub use self::redis::{RedisStore, Routing};
pub use replicated::ReplicatedStore;
pub use settings::{ConnectionSettings, Topology};
