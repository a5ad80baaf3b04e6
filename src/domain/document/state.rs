//! Document lifecycle state machine

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Lifecycle state of a document relative to the external engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    /// Stored locally, never handed to the engine
    #[default]
    Uploaded,
    /// Submitted, waiting for the engine to accept it
    Queued,
    /// Accepted by the engine and being embedded
    Vectorizing,
    /// Retrievable through the engine
    Queryable,
    /// The engine reported a terminal failure
    Failed,
}

impl DocumentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Queued => "queued",
            Self::Vectorizing => "vectorizing",
            Self::Queryable => "queryable",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event driving a lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
    Submit,
    EngineAccepted,
    EngineSucceeded,
    EngineFailed,
    Retry,
}

impl DocumentEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::EngineAccepted => "engine_accepted",
            Self::EngineSucceeded => "engine_succeeded",
            Self::EngineFailed => "engine_failed",
            Self::Retry => "retry",
        }
    }
}

impl fmt::Display for DocumentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn invalid_transition(state: DocumentState, event: DocumentEvent) -> DomainError {
    DomainError::conflict(format!(
        "Invalid document transition: {} -> {}",
        state, event
    ))
}

/// The single transition function of the document lifecycle
///
/// `Queued + Submit` re-dispatches after an engine failure left the document
/// queued. `Queued + EngineSucceeded` covers an accept reply that was lost.
pub fn next_state(
    state: DocumentState,
    event: DocumentEvent,
) -> Result<DocumentState, DomainError> {
    use DocumentEvent as E;
    use DocumentState as S;

    match (state, event) {
        (S::Uploaded | S::Queued, E::Submit) => Ok(S::Queued),
        (S::Queued, E::EngineAccepted) => Ok(S::Vectorizing),
        (S::Queued | S::Vectorizing, E::EngineSucceeded) => Ok(S::Queryable),
        (S::Queued | S::Vectorizing, E::EngineFailed) => Ok(S::Failed),
        (S::Failed, E::Retry) => Ok(S::Queued),
        _ => Err(invalid_transition(state, event)),
    }
}
