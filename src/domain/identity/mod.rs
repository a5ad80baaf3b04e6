//! Caller identity
//!
//! End users are authenticated upstream; this service only receives their
//! opaque identifier and never verifies credentials itself.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Maximum length for user identifiers
pub const MAX_USER_ID_LENGTH: usize = 64;

static USER_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.@-]*$").unwrap());

/// Opaque identifier of an authenticated organization user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Create a new UserId after validation
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();

        if id.is_empty() {
            return Err(DomainError::invalid_id("User ID cannot be empty"));
        }

        if id.len() > MAX_USER_ID_LENGTH {
            return Err(DomainError::invalid_id(format!(
                "User ID exceeds maximum length of {} characters",
                MAX_USER_ID_LENGTH
            )));
        }

        // '/' is the composite-key separator and must never appear here
        if !USER_ID_PATTERN.is_match(&id) {
            return Err(DomainError::invalid_id(format!(
                "Invalid user ID '{}': only alphanumerics, '_', '.', '@' and '-' are allowed",
                id
            )));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
