//! Lock infrastructure - Store-backed locks

mod store_lock;

pub use store_lock::StoreLockBackend;
