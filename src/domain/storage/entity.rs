//! Keys and entities understood by every storage backend

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};

/// Separator between segments of a composite key
///
/// Identifiers that appear in composite keys never contain it, so a prefix
/// ending in the separator selects exactly one parent.
pub const KEY_SEPARATOR: char = '/';

/// Key of a stored entity, rendered as a string for the backends
pub trait StorageKey: Clone + Debug + Send + Sync + Eq + std::hash::Hash {
    fn as_str(&self) -> &str;
}

/// Anything a backend can persist as serialized data under one key
pub trait StorageEntity: Clone + Debug + Send + Sync + Serialize + DeserializeOwned {
    type Key: StorageKey;

    fn key(&self) -> &Self::Key;
}

/// `kb-1/alice/read` from `["kb-1", "alice", "read"]`
pub fn composite_key(parts: &[&str]) -> String {
    parts.join(&KEY_SEPARATOR.to_string())
}

/// Prefix matching every composite key that starts with `parts`
pub fn key_prefix(parts: &[&str]) -> String {
    let mut prefix = composite_key(parts);
    prefix.push(KEY_SEPARATOR);
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key() {
        assert_eq!(composite_key(&["kb-1", "alice", "read"]), "kb-1/alice/read");
        assert_eq!(composite_key(&["kb-1"]), "kb-1");
    }

    #[test]
    fn test_key_prefix_does_not_match_sibling_ids() {
        let prefix = key_prefix(&["kb-1"]);

        assert_eq!(prefix, "kb-1/");
        assert!(composite_key(&["kb-1", "alice"]).starts_with(&prefix));
        assert!(!composite_key(&["kb-10", "alice"]).starts_with(&prefix));
    }

    #[test]
    fn test_nested_prefix() {
        assert_eq!(key_prefix(&["kb-1", "alice"]), "kb-1/alice/");
    }
}
