//! Storage domain - Generic key/value storage abstraction

mod entity;
mod repository;

pub use entity::{composite_key, key_prefix, StorageEntity, StorageKey, KEY_SEPARATOR};
pub use repository::Storage;

#[cfg(test)]
pub use repository::mock;
