//! Namespace binding endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::middleware::CallerIdentity;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::binding::{BindingAction, BindingAuditEntry, Namespace, NamespaceBinding};

use super::parse_knowledge_base_id;

#[derive(Debug, Clone, Deserialize)]
pub struct BindRequest {
    pub namespace: String,
    #[serde(default)]
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BindingResponse {
    pub knowledge_base_id: String,
    pub namespace: String,
    pub remark: Option<String>,
    pub bound_by: String,
    pub bound_at: String,
}

impl From<NamespaceBinding> for BindingResponse {
    fn from(binding: NamespaceBinding) -> Self {
        Self {
            knowledge_base_id: binding.knowledge_base_id().as_str().to_string(),
            namespace: binding.namespace().as_str().to_string(),
            remark: binding.remark().map(str::to_string),
            bound_by: binding.bound_by().as_str().to_string(),
            bound_at: binding.bound_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnbindResponse {
    pub knowledge_base_id: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntryResponse {
    pub action: BindingAction,
    pub namespace: String,
    pub previous_namespace: Option<String>,
    pub actor: String,
    pub recorded_at: String,
}

impl From<BindingAuditEntry> for AuditEntryResponse {
    fn from(entry: BindingAuditEntry) -> Self {
        Self {
            action: entry.action(),
            namespace: entry.namespace().as_str().to_string(),
            previous_namespace: entry.previous_namespace().map(|ns| ns.as_str().to_string()),
            actor: entry.actor().as_str().to_string(),
            recorded_at: entry.recorded_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditLogResponse {
    pub entries: Vec<AuditEntryResponse>,
}

/// GET /api/knowledge-bases/{kb_id}/binding
pub async fn get_binding(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(kb_id): Path<String>,
) -> Result<Json<BindingResponse>, ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    let binding = state.bindings.binding_for(&kb_id, &caller).await?;

    Ok(Json(binding.into()))
}

/// POST /api/knowledge-bases/{kb_id}/binding
pub async fn bind_namespace(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(kb_id): Path<String>,
    Json(request): Json<BindRequest>,
) -> Result<(StatusCode, Json<BindingResponse>), ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    let namespace = Namespace::new(request.namespace)?;
    debug!(kb_id = %kb_id, namespace = %namespace, "Binding namespace");

    let binding = state
        .bindings
        .bind(&kb_id, namespace, &caller, request.remark)
        .await?;

    Ok((StatusCode::CREATED, Json(binding.into())))
}

/// PUT /api/knowledge-bases/{kb_id}/binding
pub async fn rebind_namespace(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(kb_id): Path<String>,
    Json(request): Json<BindRequest>,
) -> Result<Json<BindingResponse>, ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    let namespace = Namespace::new(request.namespace)?;
    debug!(kb_id = %kb_id, namespace = %namespace, "Rebinding namespace");

    let binding = state
        .bindings
        .rebind(&kb_id, namespace, &caller, request.remark)
        .await?;

    Ok(Json(binding.into()))
}

/// DELETE /api/knowledge-bases/{kb_id}/binding
pub async fn unbind_namespace(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(kb_id): Path<String>,
) -> Result<Json<UnbindResponse>, ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    let namespace = state.bindings.unbind(&kb_id, &caller).await?;

    Ok(Json(UnbindResponse {
        knowledge_base_id: kb_id.as_str().to_string(),
        namespace: namespace.as_str().to_string(),
    }))
}

/// GET /api/knowledge-bases/{kb_id}/binding/audit
pub async fn binding_audit(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(kb_id): Path<String>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    let entries = state
        .bindings
        .audit_log(&kb_id, &caller)
        .await?
        .into_iter()
        .map(AuditEntryResponse::from)
        .collect();

    Ok(Json(AuditLogResponse { entries }))
}
