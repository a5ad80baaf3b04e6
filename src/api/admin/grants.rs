//! Sharing endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::middleware::CallerIdentity;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::identity::UserId;
use crate::domain::sharing::{PermissionGrant, PermissionLevel};

use super::parse_knowledge_base_id;

#[derive(Debug, Clone, Deserialize)]
pub struct GrantRequest {
    pub grantee: String,
    pub level: PermissionLevel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeLevelRequest {
    pub level: PermissionLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrantResponse {
    pub knowledge_base_id: String,
    pub grantee: String,
    pub level: PermissionLevel,
    pub granted_by: String,
    pub granted_at: String,
}

impl From<PermissionGrant> for GrantResponse {
    fn from(grant: PermissionGrant) -> Self {
        Self {
            knowledge_base_id: grant.knowledge_base_id().as_str().to_string(),
            grantee: grant.grantee().as_str().to_string(),
            level: grant.level(),
            granted_by: grant.granted_by().as_str().to_string(),
            granted_at: grant.granted_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListGrantsResponse {
    pub grants: Vec<GrantResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevokeResponse {
    pub grantee: String,
    pub revoked: usize,
}

/// GET /api/knowledge-bases/{kb_id}/grants
pub async fn list_grants(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(kb_id): Path<String>,
) -> Result<Json<ListGrantsResponse>, ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    let grants: Vec<GrantResponse> = state
        .ledger
        .list_grants(&kb_id, &caller)
        .await?
        .into_iter()
        .map(GrantResponse::from)
        .collect();
    let total = grants.len();

    Ok(Json(ListGrantsResponse { grants, total }))
}

/// POST /api/knowledge-bases/{kb_id}/grants
pub async fn grant_access(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(kb_id): Path<String>,
    Json(request): Json<GrantRequest>,
) -> Result<(StatusCode, Json<GrantResponse>), ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    let grantee = UserId::new(request.grantee)?;
    debug!(kb_id = %kb_id, grantee = %grantee, level = %request.level, "Granting access");

    let grant = state
        .ledger
        .grant(&kb_id, &grantee, request.level, &caller)
        .await?;

    Ok((StatusCode::CREATED, Json(grant.into())))
}

/// PUT /api/knowledge-bases/{kb_id}/grants/{grantee}
///
/// Replaces the grantee's grants with one at the requested level.
pub async fn change_access(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path((kb_id, grantee)): Path<(String, String)>,
    Json(request): Json<ChangeLevelRequest>,
) -> Result<Json<GrantResponse>, ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    let grantee = UserId::new(grantee)?;
    debug!(kb_id = %kb_id, grantee = %grantee, level = %request.level, "Changing access level");

    let grant = state
        .ledger
        .set_level(&kb_id, &grantee, request.level, &caller)
        .await?;

    Ok(Json(grant.into()))
}

/// DELETE /api/knowledge-bases/{kb_id}/grants/{grantee}
pub async fn revoke_access(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path((kb_id, grantee)): Path<(String, String)>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let kb_id = parse_knowledge_base_id(&kb_id)?;
    let grantee = UserId::new(grantee)?;

    let revoked = state.ledger.revoke(&kb_id, &grantee, &caller).await?;

    Ok(Json(RevokeResponse {
        grantee: grantee.as_str().to_string(),
        revoked,
    }))
}
