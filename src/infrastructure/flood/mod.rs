//! Flood infrastructure - Store-backed flood control

mod store_flood;

pub use store_flood::StoreFlood;
