//! Document domain - records and the ingestion lifecycle

mod entity;
mod signal;
mod state;

pub use entity::{DocumentId, DocumentRecord, NewDocument, MAX_DOCUMENT_NAME_LENGTH};
pub use signal::{
    classify_signal, CompletionOutcome, CompletionSignal, SignalDisposition, SignalOutcome,
};
pub use state::{next_state, DocumentEvent, DocumentState};
