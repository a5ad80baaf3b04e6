//! Document record entity

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::{next_state, DocumentEvent, DocumentState};
use crate::domain::identity::UserId;
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::storage::{StorageEntity, StorageKey};
use crate::domain::DomainError;

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^doc-[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$").unwrap()
});

/// Maximum length for document names
pub const MAX_DOCUMENT_NAME_LENGTH: usize = 255;

/// Maximum length of a recorded error detail
const MAX_ERROR_DETAIL_LENGTH: usize = 500;

/// Validated document identifier: doc-{uuid}
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();

        if !ID_PATTERN.is_match(&id) {
            return Err(DomainError::invalid_id(format!(
                "Invalid document ID '{}': must be in format doc-{{uuid}}",
                id
            )));
        }

        Ok(Self(id))
    }

    pub fn generate() -> Self {
        Self(format!("doc-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for DocumentId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Input for registering an uploaded document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDocument {
    pub name: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl NewDocument {
    pub fn validate(&self) -> Result<(), DomainError> {
        let name = self.name.trim();

        if name.is_empty() {
            return Err(DomainError::validation("Document name cannot be empty"));
        }

        if name.chars().count() > MAX_DOCUMENT_NAME_LENGTH {
            return Err(DomainError::validation(format!(
                "Document name exceeds maximum length of {} characters",
                MAX_DOCUMENT_NAME_LENGTH
            )));
        }

        if self.metadata.as_ref().is_some_and(|metadata| !metadata.is_object()) {
            return Err(DomainError::validation("Document metadata must be a JSON object"));
        }

        Ok(())
    }
}

/// A document and its lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    id: DocumentId,
    knowledge_base_id: KnowledgeBaseId,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_url: Option<String>,
    #[serde(default)]
    metadata: Value,
    state: DocumentState,
    last_transition_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_detail: Option<String>,
    #[serde(default)]
    attempts: u32,
    created_by: UserId,
    created_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Create an `uploaded` record; call `NewDocument::validate` first
    pub fn new(knowledge_base_id: KnowledgeBaseId, input: NewDocument, created_by: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::generate(),
            knowledge_base_id,
            name: input.name.trim().to_string(),
            source_url: input.source_url.filter(|url| !url.trim().is_empty()),
            metadata: input
                .metadata
                .unwrap_or_else(|| Value::Object(Default::default())),
            state: DocumentState::Uploaded,
            last_transition_at: now,
            error_detail: None,
            attempts: 0,
            created_by,
            created_at: now,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn knowledge_base_id(&self) -> &KnowledgeBaseId {
        &self.knowledge_base_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn last_transition_at(&self) -> DateTime<Utc> {
        self.last_transition_at
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn created_by(&self) -> &UserId {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply(&mut self, event: DocumentEvent) -> Result<DocumentState, DomainError> {
        let next = next_state(self.state, event)?;
        self.state = next;
        self.last_transition_at = Utc::now();
        Ok(next)
    }

    /// uploaded|queued -> queued, counting one dispatch attempt
    pub fn submit(&mut self) -> Result<DocumentState, DomainError> {
        let next = self.apply(DocumentEvent::Submit)?;
        self.attempts += 1;
        self.error_detail = None;
        Ok(next)
    }

    /// queued -> vectorizing
    pub fn mark_accepted(&mut self) -> Result<DocumentState, DomainError> {
        self.apply(DocumentEvent::EngineAccepted)
    }

    /// queued|vectorizing -> queryable
    pub fn mark_succeeded(&mut self) -> Result<DocumentState, DomainError> {
        let next = self.apply(DocumentEvent::EngineSucceeded)?;
        self.error_detail = None;
        Ok(next)
    }

    /// queued|vectorizing -> failed
    pub fn mark_failed(&mut self, detail: impl Into<String>) -> Result<DocumentState, DomainError> {
        let next = self.apply(DocumentEvent::EngineFailed)?;
        self.error_detail = Some(truncate_detail(detail.into()));
        Ok(next)
    }

    /// failed -> queued
    pub fn retry(&mut self) -> Result<DocumentState, DomainError> {
        let next = self.apply(DocumentEvent::Retry)?;
        self.error_detail = None;
        Ok(next)
    }

    /// Record why a dispatch did not reach the engine; the state stays `queued`
    pub fn record_dispatch_error(&mut self, detail: impl Into<String>) {
        self.error_detail = Some(truncate_detail(detail.into()));
    }
}

impl StorageEntity for DocumentRecord {
    type Key = DocumentId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}

fn truncate_detail(detail: String) -> String {
    if detail.chars().count() <= MAX_ERROR_DETAIL_LENGTH {
        detail
    } else {
        detail.chars().take(MAX_ERROR_DETAIL_LENGTH).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DocumentRecord {
        DocumentRecord::new(
            KnowledgeBaseId::new("auto-manuals").unwrap(),
            NewDocument {
                name: " engine-oil.pdf ".to_string(),
                ..Default::default()
            },
            UserId::new("alice").unwrap(),
        )
    }

    #[test]
    fn test_document_id_format() {
        let id = DocumentId::generate();
        assert!(id.as_str().starts_with("doc-"));
        assert!(DocumentId::new(id.as_str()).is_ok());
        assert!(DocumentId::new("doc-123").is_err());
    }

    #[test]
    fn test_new_record_is_uploaded() {
        let record = record();
        assert_eq!(record.state(), DocumentState::Uploaded);
        assert_eq!(record.name(), "engine-oil.pdf");
        assert_eq!(record.attempts(), 0);
        assert!(record.metadata().is_object());
    }

    #[test]
    fn test_new_document_validation() {
        assert!(NewDocument { name: "  ".into(), ..Default::default() }.validate().is_err());
        assert!(
            NewDocument {
                name: "a.pdf".into(),
                metadata: Some(serde_json::json!([1, 2])),
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        assert!(NewDocument { name: "a.pdf".into(), ..Default::default() }.validate().is_ok());
    }

    #[test]
    fn test_dispatch_error_keeps_queued() {
        let mut record = record();
        record.submit().unwrap();
        record.record_dispatch_error("engine unreachable");

        assert_eq!(record.state(), DocumentState::Queued);
        assert_eq!(record.error_detail(), Some("engine unreachable"));

        record.submit().unwrap();
        assert_eq!(record.attempts(), 2);
        assert_eq!(record.error_detail(), None);
    }

    #[test]
    fn test_failure_detail_truncated() {
        let mut record = record();
        record.submit().unwrap();
        record.mark_failed("x".repeat(2_000)).unwrap();

        assert_eq!(record.state(), DocumentState::Failed);
        assert_eq!(record.error_detail().unwrap().len(), MAX_ERROR_DETAIL_LENGTH);
    }

    #[test]
    fn test_rejected_transition_leaves_record_untouched() {
        let mut record = record();
        let before = record.clone();

        assert!(record.mark_succeeded().is_err());
        assert_eq!(record, before);
    }
}
