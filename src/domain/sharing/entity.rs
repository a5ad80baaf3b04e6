//! Sharing grants and permission levels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identity::UserId;
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::storage::{composite_key, key_prefix, StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Permission level on a knowledge base
///
/// Totally ordered: `Read < Query < Admin`. A higher level implies every
/// capability of the lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    /// See the knowledge base, its documents and binding
    Read,
    /// Run chat/text/search queries against its namespace
    Query,
    /// Share, bind, ingest documents
    Admin,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Query => "query",
            Self::Admin => "admin",
        }
    }

    /// True if this level grants at least `required`
    pub fn satisfies(&self, required: PermissionLevel) -> bool {
        *self >= required
    }
}

impl std::str::FromStr for PermissionLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "query" => Ok(Self::Query),
            "admin" => Ok(Self::Admin),
            other => Err(DomainError::validation(format!(
                "Unknown permission level '{}': expected read, query or admin",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Grant key: `<kb_id>/<grantee>/<level>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantKey(String);

impl GrantKey {
    pub fn new(
        knowledge_base_id: &KnowledgeBaseId,
        grantee: &UserId,
        level: PermissionLevel,
    ) -> Self {
        Self(composite_key(&[
            knowledge_base_id.as_str(),
            grantee.as_str(),
            level.as_str(),
        ]))
    }

    /// Prefix shared by all grants on a knowledge base
    pub fn knowledge_base_prefix(knowledge_base_id: &KnowledgeBaseId) -> String {
        key_prefix(&[knowledge_base_id.as_str()])
    }

    /// Prefix shared by all grants of one grantee on a knowledge base
    pub fn grantee_prefix(knowledge_base_id: &KnowledgeBaseId, grantee: &UserId) -> String {
        key_prefix(&[knowledge_base_id.as_str(), grantee.as_str()])
    }
}

impl StorageKey for GrantKey {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// One additive sharing grant. There are no deny entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionGrant {
    key: GrantKey,
    knowledge_base_id: KnowledgeBaseId,
    grantee: UserId,
    level: PermissionLevel,
    granted_by: UserId,
    granted_at: DateTime<Utc>,
}

impl PermissionGrant {
    pub fn new(
        knowledge_base_id: KnowledgeBaseId,
        grantee: UserId,
        level: PermissionLevel,
        granted_by: UserId,
    ) -> Self {
        Self {
            key: GrantKey::new(&knowledge_base_id, &grantee, level),
            knowledge_base_id,
            grantee,
            level,
            granted_by,
            granted_at: Utc::now(),
        }
    }

    pub fn knowledge_base_id(&self) -> &KnowledgeBaseId {
        &self.knowledge_base_id
    }

    pub fn grantee(&self) -> &UserId {
        &self.grantee
    }

    pub fn level(&self) -> PermissionLevel {
        self.level
    }

    pub fn granted_by(&self) -> &UserId {
        &self.granted_by
    }

    pub fn granted_at(&self) -> DateTime<Utc> {
        self.granted_at
    }
}

impl StorageEntity for PermissionGrant {
    type Key = GrantKey;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

/// Effective level from ownership plus matching grants
///
/// Owner → admin; otherwise the highest level among `grants` held by
/// `identity`; otherwise none.
pub fn compute_effective_level<'a>(
    owner: &UserId,
    identity: &UserId,
    grants: impl IntoIterator<Item = &'a PermissionGrant>,
) -> Option<PermissionLevel> {
    if owner == identity {
        return Some(PermissionLevel::Admin);
    }

    grants
        .into_iter()
        .filter(|grant| grant.grantee() == identity)
        .map(PermissionGrant::level)
        .max()
}
