//! Serialization infrastructure - Codec implementations

mod json;

pub use json::{JsonSerializer, JSON_CODEC};
