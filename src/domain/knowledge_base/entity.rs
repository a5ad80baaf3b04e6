//! Knowledge base entity and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{
    validate_knowledge_base_description, validate_knowledge_base_id,
    validate_knowledge_base_name, KnowledgeBaseValidationError,
};
use crate::domain::identity::UserId;
use crate::domain::sharing::PermissionLevel;
use crate::domain::storage::{StorageEntity, StorageKey};

/// Knowledge base identifier - alphanumeric + hyphens, max 50 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KnowledgeBaseId(String);

impl KnowledgeBaseId {
    /// Create a new KnowledgeBaseId after validation
    pub fn new(id: impl Into<String>) -> Result<Self, KnowledgeBaseValidationError> {
        let id = id.into();
        validate_knowledge_base_id(&id)?;
        Ok(Self(id))
    }

    /// Generate a fresh `kb-<uuid>` identifier
    pub fn generate() -> Self {
        Self(format!("kb-{}", uuid::Uuid::new_v4()))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for KnowledgeBaseId {
    type Error = KnowledgeBaseValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<KnowledgeBaseId> for String {
    fn from(id: KnowledgeBaseId) -> Self {
        id.0
    }
}

impl std::fmt::Display for KnowledgeBaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for KnowledgeBaseId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// An organization-owned, curated document collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    id: KnowledgeBaseId,
    owner: UserId,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl KnowledgeBase {
    /// Create a new knowledge base owned by `owner`
    pub fn new(
        id: KnowledgeBaseId,
        owner: UserId,
        name: impl Into<String>,
    ) -> Result<Self, KnowledgeBaseValidationError> {
        let name = name.into();
        validate_knowledge_base_name(&name)?;
        let now = Utc::now();

        Ok(Self {
            id,
            owner,
            name: name.trim().to_string(),
            description: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Set description (builder pattern)
    pub fn with_description(
        mut self,
        description: impl Into<String>,
    ) -> Result<Self, KnowledgeBaseValidationError> {
        let description = description.into();
        validate_knowledge_base_description(&description)?;
        self.description = Some(description);
        Ok(self)
    }

    /// Replace the name; surrounding whitespace is trimmed
    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), KnowledgeBaseValidationError> {
        let name = name.into();
        validate_knowledge_base_name(&name)?;
        self.name = name.trim().to_string();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replace or clear the description
    pub fn set_description(
        &mut self,
        description: Option<String>,
    ) -> Result<(), KnowledgeBaseValidationError> {
        if let Some(description) = &description {
            validate_knowledge_base_description(description)?;
        }
        self.description = description;
        self.updated_at = Utc::now();
        Ok(())
    }

    // Getters

    pub fn id(&self) -> &KnowledgeBaseId {
        &self.id
    }

    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner == user
    }
}

impl StorageEntity for KnowledgeBase {
    type Key = KnowledgeBaseId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}

/// A knowledge base as seen by one caller, joined with its binding
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBaseView {
    pub knowledge_base: KnowledgeBase,
    pub namespace: Option<String>,
    pub effective_level: PermissionLevel,
}
