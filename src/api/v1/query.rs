//! Token-authorized query forwarding

use axum::extract::{Path, State};

use crate::api::middleware::DelegatedBearer;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::query::{QueryPayload, QueryResponse, RequestKind};

/// POST /v1/query/{kind}
///
/// `kind` is `chat`, `text`, `search` or `initialize`.
pub async fn route_query(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    DelegatedBearer(token): DelegatedBearer,
    Json(payload): Json<QueryPayload>,
) -> Result<Json<QueryResponse>, ApiError> {
    let kind: RequestKind = kind.parse()?;
    let response = state.router.route(&token, kind, &payload).await?;

    Ok(Json(response))
}
