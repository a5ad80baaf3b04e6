//! Infrastructure services

pub(crate) mod binding_service;
pub(crate) mod ingestion_orchestrator;
pub(crate) mod knowledge_base_service;
pub(crate) mod namespace_limiter;
pub(crate) mod permission_ledger;
pub(crate) mod query_router;
pub(crate) mod token_issuer;

pub use binding_service::BindingService;
pub use ingestion_orchestrator::{CallbackVerifier, IngestionOrchestrator, SIGNATURE_HEADER};
pub use knowledge_base_service::{
    CreateKnowledgeBaseRequest, DeletionSummary, KnowledgeBaseService, UpdateKnowledgeBaseRequest,
};
pub use namespace_limiter::{NamespaceLimiter, DEFAULT_ACQUIRE_TIMEOUT_MS, DEFAULT_MAX_IN_FLIGHT};
pub use permission_ledger::{Authorized, PermissionLedger};
pub use query_router::QueryRouter;
pub use token_issuer::TokenIssuer;
