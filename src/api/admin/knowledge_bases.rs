//! Knowledge base catalog endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use tracing::debug;

use crate::api::middleware::CallerIdentity;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::knowledge_base::KnowledgeBaseView;
use crate::domain::sharing::PermissionLevel;
use crate::infrastructure::services::{
    CreateKnowledgeBaseRequest, DeletionSummary, UpdateKnowledgeBaseRequest,
};

use super::parse_knowledge_base_id;

/// Knowledge base as returned to a caller
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBaseResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner: String,
    /// Bound external namespace, if any
    pub namespace: Option<String>,
    pub effective_level: PermissionLevel,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListKnowledgeBasesResponse {
    pub knowledge_bases: Vec<KnowledgeBaseResponse>,
    pub total: usize,
}

impl From<KnowledgeBaseView> for KnowledgeBaseResponse {
    fn from(view: KnowledgeBaseView) -> Self {
        let kb = &view.knowledge_base;

        Self {
            id: kb.id().as_str().to_string(),
            name: kb.name().to_string(),
            description: kb.description().map(str::to_string),
            owner: kb.owner().as_str().to_string(),
            namespace: view.namespace.clone(),
            effective_level: view.effective_level,
            created_at: kb.created_at().to_rfc3339(),
            updated_at: kb.updated_at().to_rfc3339(),
        }
    }
}

/// GET /api/knowledge-bases
pub async fn list_knowledge_bases(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
) -> Result<Json<ListKnowledgeBasesResponse>, ApiError> {
    debug!(caller = %caller, "Listing visible knowledge bases");

    let knowledge_bases: Vec<KnowledgeBaseResponse> = state
        .knowledge_bases
        .list_visible(&caller)
        .await?
        .into_iter()
        .map(KnowledgeBaseResponse::from)
        .collect();
    let total = knowledge_bases.len();

    Ok(Json(ListKnowledgeBasesResponse {
        knowledge_bases,
        total,
    }))
}

/// POST /api/knowledge-bases
pub async fn create_knowledge_base(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Json(request): Json<CreateKnowledgeBaseRequest>,
) -> Result<(StatusCode, Json<KnowledgeBaseResponse>), ApiError> {
    debug!(caller = %caller, name = %request.name, "Creating knowledge base");

    let created = state.knowledge_bases.create(request, &caller).await?;
    let view = KnowledgeBaseView {
        knowledge_base: created,
        namespace: None,
        effective_level: PermissionLevel::Admin,
    };

    Ok((StatusCode::CREATED, Json(view.into())))
}

/// GET /api/knowledge-bases/{kb_id}
pub async fn get_knowledge_base(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(kb_id): Path<String>,
) -> Result<Json<KnowledgeBaseResponse>, ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    let view = state.knowledge_bases.get(&kb_id, &caller).await?;

    Ok(Json(view.into()))
}

/// PATCH /api/knowledge-bases/{kb_id}
pub async fn update_knowledge_base(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(kb_id): Path<String>,
    Json(request): Json<UpdateKnowledgeBaseRequest>,
) -> Result<Json<KnowledgeBaseResponse>, ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    debug!(caller = %caller, kb_id = %kb_id, "Updating knowledge base");

    let view = state.knowledge_bases.update(&kb_id, &caller, request).await?;
    Ok(Json(view.into()))
}

/// DELETE /api/knowledge-bases/{kb_id}
///
/// Owner only; removes binding, grants and documents with it.
pub async fn delete_knowledge_base(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(kb_id): Path<String>,
) -> Result<Json<DeletionSummary>, ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    debug!(caller = %caller, kb_id = %kb_id, "Deleting knowledge base");

    let summary = state.knowledge_bases.delete(&kb_id, &caller).await?;
    Ok(Json(summary))
}
