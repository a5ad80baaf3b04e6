//! Delegated token issuance

use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::api::middleware::CallerIdentity;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::binding::Namespace;
use crate::domain::sharing::PermissionLevel;
use crate::domain::token::{DelegatedToken, TokenScope};

use super::parse_knowledge_base_id;

/// Exactly one of `knowledge_base_id` and `namespace` selects the scope
#[derive(Debug, Clone, Deserialize)]
pub struct IssueTokenRequest {
    #[serde(default)]
    pub knowledge_base_id: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    pub level: PermissionLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueTokenResponse {
    pub token: String,
    pub token_type: &'static str,
    pub namespace: String,
    pub level: PermissionLevel,
    pub expires_in: i64,
    pub expires_at: String,
}

impl From<DelegatedToken> for IssueTokenResponse {
    fn from(token: DelegatedToken) -> Self {
        Self {
            expires_in: (token.expires_at - token.issued_at).num_seconds(),
            expires_at: token.expires_at.to_rfc3339(),
            namespace: token.namespace.as_str().to_string(),
            level: token.level,
            token_type: "Bearer",
            token: token.token,
        }
    }
}

impl IssueTokenRequest {
    fn scope(&self) -> Result<TokenScope, ApiError> {
        match (&self.knowledge_base_id, &self.namespace) {
            (Some(kb_id), None) => Ok(TokenScope::KnowledgeBase(parse_knowledge_base_id(kb_id)?)),
            (None, Some(namespace)) => Ok(TokenScope::Namespace(Namespace::new(namespace.as_str())?)),
            _ => Err(ApiError::bad_request(
                "Provide exactly one of 'knowledge_base_id' or 'namespace'",
            )),
        }
    }
}

/// POST /api/tokens
pub async fn issue_token(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Json(request): Json<IssueTokenRequest>,
) -> Result<(StatusCode, Json<IssueTokenResponse>), ApiError> {
    let scope = request.scope()?;
    let token = state.issuer.issue(&caller, scope, request.level).await?;

    Ok((StatusCode::CREATED, Json(token.into())))
}
