//! Sharing domain - permission levels and grants

mod entity;

pub use entity::{compute_effective_level, GrantKey, PermissionGrant, PermissionLevel};
