//! Namespace binding entities

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::identity::UserId;
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::storage::{composite_key, key_prefix, StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Maximum length for external namespaces
pub const MAX_NAMESPACE_LENGTH: usize = 128;

static NAMESPACE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").unwrap());

/// External RAG engine namespace (the engine's addressing unit)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    pub fn new(namespace: impl Into<String>) -> Result<Self, DomainError> {
        let namespace = namespace.into();

        if namespace.is_empty() {
            return Err(DomainError::validation("Namespace cannot be empty"));
        }

        if namespace.len() > MAX_NAMESPACE_LENGTH {
            return Err(DomainError::validation(format!(
                "Namespace exceeds maximum length of {} characters",
                MAX_NAMESPACE_LENGTH
            )));
        }

        if !NAMESPACE_PATTERN.is_match(&namespace) {
            return Err(DomainError::validation(format!(
                "Invalid namespace '{}': only alphanumerics, '_', '.' and '-' are allowed",
                namespace
            )));
        }

        Ok(Self(namespace))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Namespace {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(namespace: Namespace) -> Self {
        namespace.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The active mapping from one knowledge base to its external namespace
///
/// Keyed by knowledge base id, so at most one binding exists per knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceBinding {
    knowledge_base_id: KnowledgeBaseId,
    namespace: Namespace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remark: Option<String>,
    bound_by: UserId,
    bound_at: DateTime<Utc>,
}

impl NamespaceBinding {
    pub fn new(
        knowledge_base_id: KnowledgeBaseId,
        namespace: Namespace,
        bound_by: UserId,
        remark: Option<String>,
    ) -> Self {
        Self {
            knowledge_base_id,
            namespace,
            remark: remark.filter(|r| !r.trim().is_empty()),
            bound_by,
            bound_at: Utc::now(),
        }
    }

    pub fn knowledge_base_id(&self) -> &KnowledgeBaseId {
        &self.knowledge_base_id
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn remark(&self) -> Option<&str> {
        self.remark.as_deref()
    }

    pub fn bound_by(&self) -> &UserId {
        &self.bound_by
    }

    pub fn bound_at(&self) -> DateTime<Utc> {
        self.bound_at
    }
}

impl StorageEntity for NamespaceBinding {
    type Key = KnowledgeBaseId;

    fn key(&self) -> &Self::Key {
        &self.knowledge_base_id
    }
}

/// Kind of binding change recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingAction {
    Bound,
    Rebound,
    Unbound,
}

impl std::fmt::Display for BindingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bound => write!(f, "bound"),
            Self::Rebound => write!(f, "rebound"),
            Self::Unbound => write!(f, "unbound"),
        }
    }
}

/// Audit entry key: `<kb_id>/<uuid>` so entries of one knowledge base share a prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingAuditId(String);

impl BindingAuditId {
    fn generate(knowledge_base_id: &KnowledgeBaseId) -> Self {
        Self(composite_key(&[
            knowledge_base_id.as_str(),
            &uuid::Uuid::new_v4().to_string(),
        ]))
    }

    /// Key prefix shared by every audit entry of `knowledge_base_id`
    pub fn prefix_for(knowledge_base_id: &KnowledgeBaseId) -> String {
        key_prefix(&[knowledge_base_id.as_str()])
    }
}

impl StorageKey for BindingAuditId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Immutable record of one bind, rebind or unbind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingAuditEntry {
    id: BindingAuditId,
    knowledge_base_id: KnowledgeBaseId,
    action: BindingAction,
    namespace: Namespace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    previous_namespace: Option<Namespace>,
    actor: UserId,
    recorded_at: DateTime<Utc>,
}

impl BindingAuditEntry {
    pub fn new(
        knowledge_base_id: KnowledgeBaseId,
        action: BindingAction,
        namespace: Namespace,
        previous_namespace: Option<Namespace>,
        actor: UserId,
    ) -> Self {
        Self {
            id: BindingAuditId::generate(&knowledge_base_id),
            knowledge_base_id,
            action,
            namespace,
            previous_namespace,
            actor,
            recorded_at: Utc::now(),
        }
    }

    pub fn knowledge_base_id(&self) -> &KnowledgeBaseId {
        &self.knowledge_base_id
    }

    pub fn action(&self) -> BindingAction {
        self.action
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn previous_namespace(&self) -> Option<&Namespace> {
        self.previous_namespace.as_ref()
    }

    pub fn actor(&self) -> &UserId {
        &self.actor
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl StorageEntity for BindingAuditEntry {
    type Key = BindingAuditId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}
