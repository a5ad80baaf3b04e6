//! Domain layer - Core business logic and entities

pub mod binding;
pub mod document;
pub mod engine;
pub mod error;
pub mod identity;
pub mod knowledge_base;
pub mod query;
pub mod sharing;
pub mod storage;
pub mod token;

pub use binding::{BindingAction, BindingAuditEntry, Namespace, NamespaceBinding};
pub use document::{
    CompletionOutcome, CompletionSignal, DocumentEvent, DocumentId, DocumentRecord,
    DocumentState, NewDocument, SignalOutcome,
};
pub use engine::{EngineMethod, EngineReply, EngineRequest, EngineTransport, TransportError};
pub use error::DomainError;
pub use identity::UserId;
pub use knowledge_base::{KnowledgeBase, KnowledgeBaseId, KnowledgeBaseView};
pub use query::{NormalizedQuery, QueryPayload, QueryResponse, RequestKind};
pub use sharing::{PermissionGrant, PermissionLevel};
pub use storage::{Storage, StorageEntity, StorageKey};
pub use token::{DelegatedToken, TokenRejection, TokenScope, VerifiedToken};
