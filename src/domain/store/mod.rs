//! Store domain - Client abstraction over the key-value store

mod client;
mod key;

pub use client::{execute_sequentially, StoreClient, StoreOp, StoreReply};
pub use key::{StoreKeys, LAST_DELETE_ALL_KEY};

#[cfg(test)]
pub use client::MockStoreClient;
