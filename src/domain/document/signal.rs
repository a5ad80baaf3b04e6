//! Engine completion signals

use serde::{Deserialize, Serialize};

use super::entity::DocumentId;
use super::state::DocumentState;
use crate::domain::DomainError;

/// Final outcome reported by the engine for one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Succeeded,
    Failed {
        #[serde(default)]
        detail: Option<String>,
    },
}

/// Completion signal delivered by the engine callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSignal {
    pub document_id: DocumentId,
    #[serde(flatten)]
    pub outcome: CompletionOutcome,
}

/// Result of handling a completion signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "state", rename_all = "snake_case")]
pub enum SignalOutcome {
    /// The document moved to the given state
    Applied(DocumentState),
    /// The document already reflects this outcome
    Duplicate,
}

/// What a signal means for a document in `state`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDisposition {
    Apply,
    Duplicate,
    /// A failure after the document became queryable
    Anomaly,
}

/// Classify a signal before touching the record
///
/// Signals for documents never submitted are rejected outright.
pub fn classify_signal(
    state: DocumentState,
    outcome: &CompletionOutcome,
) -> Result<SignalDisposition, DomainError> {
    use CompletionOutcome as O;
    use DocumentState as S;

    match (state, outcome) {
        (S::Uploaded, _) => Err(DomainError::conflict(
            "Completion signal for a document that was never submitted",
        )),
        (S::Queryable, O::Succeeded) | (S::Failed, O::Failed { .. }) => {
            Ok(SignalDisposition::Duplicate)
        }
        (S::Queryable, O::Failed { .. }) => Ok(SignalDisposition::Anomaly),
        (S::Failed, O::Succeeded) => Err(DomainError::conflict(
            "Success signal for a failed document; retry it first",
        )),
        (S::Queued | S::Vectorizing, _) => Ok(SignalDisposition::Apply),
    }
}
