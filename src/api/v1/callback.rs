//! Engine completion callbacks

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use serde::Serialize;
use tracing::warn;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::document::{CompletionSignal, DocumentState, SignalOutcome};
use crate::infrastructure::services::SIGNATURE_HEADER;

#[derive(Debug, Clone, Serialize)]
pub struct CallbackResponse {
    pub document_id: String,
    /// `applied` or `duplicate`
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<DocumentState>,
}

/// POST /v1/ingestion/callback
///
/// The body is verified against `X-Engine-Signature` before it is parsed.
pub async fn ingestion_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = state.callback_verifier.verify(&body, signature) {
        warn!("Rejected engine callback with a bad signature");
        return Err(e.into());
    }

    let signal: CompletionSignal = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid completion signal: {}", e)))?;
    let document_id = signal.document_id.as_str().to_string();

    let response = match state.orchestrator.handle_signal(signal).await? {
        SignalOutcome::Applied(new_state) => CallbackResponse {
            document_id,
            outcome: "applied",
            state: Some(new_state),
        },
        SignalOutcome::Duplicate => CallbackResponse {
            document_id,
            outcome: "duplicate",
            state: None,
        },
    };

    Ok(Json(response))
}
