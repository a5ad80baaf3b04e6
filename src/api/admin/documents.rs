//! Document ingestion endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use serde_json::Value;

use crate::api::middleware::CallerIdentity;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::document::{DocumentId, DocumentRecord, DocumentState, NewDocument};

use super::parse_knowledge_base_id;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub knowledge_base_id: String,
    pub name: String,
    pub source_url: Option<String>,
    pub metadata: Value,
    pub state: DocumentState,
    pub last_transition_at: String,
    pub error_detail: Option<String>,
    pub attempts: u32,
    pub created_by: String,
    pub created_at: String,
}

impl From<DocumentRecord> for DocumentResponse {
    fn from(record: DocumentRecord) -> Self {
        Self {
            id: record.id().as_str().to_string(),
            knowledge_base_id: record.knowledge_base_id().as_str().to_string(),
            name: record.name().to_string(),
            source_url: record.source_url().map(str::to_string),
            metadata: record.metadata().clone(),
            state: record.state(),
            last_transition_at: record.last_transition_at().to_rfc3339(),
            error_detail: record.error_detail().map(str::to_string),
            attempts: record.attempts(),
            created_by: record.created_by().as_str().to_string(),
            created_at: record.created_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListDocumentsResponse {
    pub documents: Vec<DocumentResponse>,
    pub total: usize,
}

fn parse_document_id(raw: &str) -> Result<DocumentId, ApiError> {
    DocumentId::new(raw).map_err(|_| ApiError::not_found(format!("Document '{}' not found", raw)))
}

/// GET /api/knowledge-bases/{kb_id}/documents
pub async fn list_documents(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(kb_id): Path<String>,
) -> Result<Json<ListDocumentsResponse>, ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    let documents: Vec<DocumentResponse> = state
        .orchestrator
        .list(&kb_id, &caller)
        .await?
        .into_iter()
        .map(DocumentResponse::from)
        .collect();
    let total = documents.len();

    Ok(Json(ListDocumentsResponse { documents, total }))
}

/// POST /api/knowledge-bases/{kb_id}/documents
pub async fn register_document(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(kb_id): Path<String>,
    Json(request): Json<NewDocument>,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    let record = state.orchestrator.register(&kb_id, &caller, request).await?;

    Ok((StatusCode::CREATED, Json(record.into())))
}

/// GET /api/documents/{document_id}
pub async fn get_document(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let document_id = parse_document_id(&document_id)?;
    let record = state.orchestrator.get(&document_id, &caller).await?;

    Ok(Json(record.into()))
}

/// DELETE /api/documents/{document_id}
pub async fn delete_document(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let document_id = parse_document_id(&document_id)?;
    let record = state.orchestrator.delete(&document_id, &caller).await?;

    Ok(Json(record.into()))
}

/// POST /api/documents/{document_id}/submit
pub async fn submit_document(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let document_id = parse_document_id(&document_id)?;
    let record = state.orchestrator.submit(&document_id, &caller).await?;

    Ok(Json(record.into()))
}

/// POST /api/documents/{document_id}/retry
pub async fn retry_document(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let document_id = parse_document_id(&document_id)?;
    let record = state.orchestrator.retry(&document_id, &caller).await?;

    Ok(Json(record.into()))
}
