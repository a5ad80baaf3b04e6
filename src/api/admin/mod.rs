//! Management API: knowledge bases, bindings, sharing, documents and tokens
//!
//! Every route acts on behalf of the caller named in `X-User-Id`.

pub mod bindings;
pub mod documents;
pub mod grants;
pub mod knowledge_bases;
pub mod tokens;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::api::types::ApiError;
use crate::domain::knowledge_base::KnowledgeBaseId;

use super::state::AppState;

/// Parse a path or body knowledge base id
///
/// A malformed id cannot name an existing knowledge base.
pub(crate) fn parse_knowledge_base_id(raw: &str) -> Result<KnowledgeBaseId, ApiError> {
    KnowledgeBaseId::new(raw)
        .map_err(|_| ApiError::not_found(format!("Knowledge base '{}' not found", raw)))
}

/// Create management API router
pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route(
            "/knowledge-bases",
            get(knowledge_bases::list_knowledge_bases).post(knowledge_bases::create_knowledge_base),
        )
        .route(
            "/knowledge-bases/{kb_id}",
            get(knowledge_bases::get_knowledge_base)
                .patch(knowledge_bases::update_knowledge_base)
                .delete(knowledge_bases::delete_knowledge_base),
        )
        .route(
            "/knowledge-bases/{kb_id}/binding",
            get(bindings::get_binding)
                .post(bindings::bind_namespace)
                .put(bindings::rebind_namespace)
                .delete(bindings::unbind_namespace),
        )
        .route("/knowledge-bases/{kb_id}/binding/audit", get(bindings::binding_audit))
        .route(
            "/knowledge-bases/{kb_id}/grants",
            get(grants::list_grants).post(grants::grant_access),
        )
        .route(
            "/knowledge-bases/{kb_id}/grants/{grantee}",
            put(grants::change_access).delete(grants::revoke_access),
        )
        .route(
            "/knowledge-bases/{kb_id}/documents",
            get(documents::list_documents).post(documents::register_document),
        )
        .route(
            "/documents/{document_id}",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/documents/{document_id}/submit", post(documents::submit_document))
        .route("/documents/{document_id}/retry", post(documents::retry_document))
        .route("/tokens", post(tokens::issue_token))
}
