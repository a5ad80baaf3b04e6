//! Application state for shared services

use std::sync::Arc;

use crate::infrastructure::engine::ExternalEngine;
use crate::infrastructure::services::{
    BindingService, CallbackVerifier, IngestionOrchestrator, KnowledgeBaseService,
    PermissionLedger, QueryRouter, TokenIssuer,
};

/// Services shared by all handlers
#[derive(Clone, Debug)]
pub struct AppState {
    pub knowledge_bases: Arc<KnowledgeBaseService>,
    pub ledger: Arc<PermissionLedger>,
    pub bindings: Arc<BindingService>,
    pub issuer: Arc<TokenIssuer>,
    pub orchestrator: Arc<IngestionOrchestrator>,
    pub router: Arc<QueryRouter>,
    pub engine: Arc<ExternalEngine>,
    pub callback_verifier: CallbackVerifier,
}
