//! Ingestion orchestrator - keeps document state consistent with the engine

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info, instrument, warn};

use crate::domain::binding::Namespace;
use crate::domain::document::{
    classify_signal, CompletionOutcome, CompletionSignal, DocumentId, DocumentRecord,
    DocumentState, NewDocument, SignalDisposition, SignalOutcome,
};
use crate::domain::identity::UserId;
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::sharing::PermissionLevel;
use crate::domain::storage::Storage;
use crate::domain::DomainError;
use crate::infrastructure::engine::{ExternalEngine, IngestDocument};
use crate::infrastructure::locks::KeyedLocks;
use crate::infrastructure::observability::record_document_transition;

use super::binding_service::BindingService;
use super::permission_ledger::{knowledge_base_lock_key, PermissionLedger};
use super::token_issuer::TokenIssuer;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the engine's callback signature
pub const SIGNATURE_HEADER: &str = "X-Engine-Signature";

/// Verifies `sha256=<hex>` HMAC signatures on engine callbacks
///
/// Without a secret every callback is rejected, unless unsigned callbacks
/// were explicitly allowed for local development.
#[derive(Clone)]
pub struct CallbackVerifier {
    secret: Option<Vec<u8>>,
    allow_unsigned: bool,
}

impl std::fmt::Debug for CallbackVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackVerifier")
            .field("enabled", &self.secret.is_some())
            .field("allow_unsigned", &self.allow_unsigned)
            .finish()
    }
}

impl CallbackVerifier {
    pub fn new(secret: Option<String>, allow_unsigned: bool) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.is_empty())
                .map(String::into_bytes),
            allow_unsigned,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Unsigned callbacks are accepted (no secret, development flag on)
    pub fn accepts_unsigned(&self) -> bool {
        self.secret.is_none() && self.allow_unsigned
    }

    /// Signature the engine is expected to send for `body`
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret).ok()?;
        mac.update(body);
        Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }

    /// Check `header` against the body; compared in constant time
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> Result<(), DomainError> {
        let Some(secret) = &self.secret else {
            return if self.allow_unsigned {
                Ok(())
            } else {
                Err(DomainError::forbidden(
                    "Engine callbacks are disabled until a signing secret is configured",
                ))
            };
        };

        let rejected = || DomainError::forbidden("Invalid callback signature");

        let provided = header
            .and_then(|value| value.trim().strip_prefix("sha256="))
            .and_then(|hex_sig| hex::decode(hex_sig).ok())
            .ok_or_else(rejected)?;

        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| DomainError::internal(format!("Invalid callback secret: {}", e)))?;
        mac.update(body);
        mac.verify_slice(&provided).map_err(|_| rejected())
    }
}

fn document_lock_key(document_id: &DocumentId) -> String {
    format!("doc:{}", document_id)
}

/// Drives documents through uploaded → queued → vectorizing → queryable
pub struct IngestionOrchestrator {
    documents: Arc<dyn Storage<DocumentRecord>>,
    ledger: Arc<PermissionLedger>,
    bindings: Arc<BindingService>,
    issuer: Arc<TokenIssuer>,
    engine: Arc<ExternalEngine>,
    locks: Arc<KeyedLocks>,
}

impl std::fmt::Debug for IngestionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionOrchestrator").finish()
    }
}

impl IngestionOrchestrator {
    pub fn new(
        documents: Arc<dyn Storage<DocumentRecord>>,
        ledger: Arc<PermissionLedger>,
        bindings: Arc<BindingService>,
        issuer: Arc<TokenIssuer>,
        engine: Arc<ExternalEngine>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            documents,
            ledger,
            bindings,
            issuer,
            engine,
            locks,
        }
    }

    async fn load(&self, document_id: &DocumentId) -> Result<DocumentRecord, DomainError> {
        self.documents
            .get(document_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Document '{}' not found", document_id)))
    }

    /// Load a document the caller may act on at `required`
    ///
    /// Documents of knowledge bases the caller cannot see are reported missing.
    async fn load_authorized(
        &self,
        document_id: &DocumentId,
        caller: &UserId,
        required: PermissionLevel,
    ) -> Result<DocumentRecord, DomainError> {
        let record = self.load(document_id).await?;

        match self
            .ledger
            .authorize(record.knowledge_base_id(), caller, required)
            .await
        {
            Ok(_) => Ok(record),
            Err(DomainError::NotFound { .. }) => Err(DomainError::not_found(format!(
                "Document '{}' not found",
                document_id
            ))),
            Err(e) => Err(e),
        }
    }

    /// Record an uploaded document; requires admin
    ///
    /// Holds the knowledge base lock until the record exists, so a
    /// concurrent cascade delete either sees the document or runs first.
    #[instrument(skip_all, fields(kb = %knowledge_base_id, caller = %caller))]
    pub async fn register(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        caller: &UserId,
        input: NewDocument,
    ) -> Result<DocumentRecord, DomainError> {
        input.validate()?;

        let _guard = self.locks.read(&knowledge_base_lock_key(knowledge_base_id)).await;
        self.ledger
            .authorize_held(knowledge_base_id, caller, PermissionLevel::Admin)
            .await?;

        let record = DocumentRecord::new(knowledge_base_id.clone(), input, caller.clone());
        let created = self.documents.create(record).await?;

        info!(document_id = %created.id(), "Registered document");
        Ok(created)
    }

    /// Remove a document record; requires admin
    ///
    /// Only the local record goes. Late completion signals for it are
    /// answered with `NotFound`.
    #[instrument(skip_all, fields(document_id = %document_id, caller = %caller))]
    pub async fn delete(&self, document_id: &DocumentId, caller: &UserId) -> Result<DocumentRecord, DomainError> {
        let _guard = self.locks.lock(&document_lock_key(document_id)).await;

        let record = self
            .load_authorized(document_id, caller, PermissionLevel::Admin)
            .await?;
        self.documents.delete(document_id).await?;

        info!(state = %record.state(), "Deleted document");
        Ok(record)
    }

    /// One document; requires read
    pub async fn get(&self, document_id: &DocumentId, caller: &UserId) -> Result<DocumentRecord, DomainError> {
        self.load_authorized(document_id, caller, PermissionLevel::Read)
            .await
    }

    /// Documents of a knowledge base, oldest first; requires read
    pub async fn list(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        caller: &UserId,
    ) -> Result<Vec<DocumentRecord>, DomainError> {
        self.ledger
            .authorize(knowledge_base_id, caller, PermissionLevel::Read)
            .await?;

        let mut records: Vec<DocumentRecord> = self
            .documents
            .list()
            .await?
            .into_iter()
            .filter(|record| record.knowledge_base_id() == knowledge_base_id)
            .collect();
        records.sort_by_key(|record| record.created_at());

        Ok(records)
    }

    /// Hand an uploaded or still-queued document to the engine
    ///
    /// The binding is resolved before any state change or engine contact.
    #[instrument(skip_all, fields(document_id = %document_id, caller = %caller))]
    pub async fn submit(&self, document_id: &DocumentId, caller: &UserId) -> Result<DocumentRecord, DomainError> {
        let _guard = self.locks.lock(&document_lock_key(document_id)).await;

        let mut record = self
            .load_authorized(document_id, caller, PermissionLevel::Admin)
            .await?;
        let namespace = self.bindings.resolve(record.knowledge_base_id()).await?;

        let from = record.state();
        record.submit()?;
        record_document_transition(from, record.state());
        self.documents.update(record.clone()).await?;

        self.dispatch(record, &namespace, caller).await
    }

    /// Move a failed document back to queued and dispatch it again
    #[instrument(skip_all, fields(document_id = %document_id, caller = %caller))]
    pub async fn retry(&self, document_id: &DocumentId, caller: &UserId) -> Result<DocumentRecord, DomainError> {
        let _guard = self.locks.lock(&document_lock_key(document_id)).await;

        let mut record = self
            .load_authorized(document_id, caller, PermissionLevel::Admin)
            .await?;
        let namespace = self.bindings.resolve(record.knowledge_base_id()).await?;

        record.retry()?;
        record.submit()?;
        record_document_transition(DocumentState::Failed, record.state());
        self.documents.update(record.clone()).await?;

        self.dispatch(record, &namespace, caller).await
    }

    /// Call the engine for a queued record; the caller holds the document lock
    async fn dispatch(
        &self,
        mut record: DocumentRecord,
        namespace: &Namespace,
        caller: &UserId,
    ) -> Result<DocumentRecord, DomainError> {
        let token = self
            .issuer
            .mint(caller, namespace, PermissionLevel::Admin)?;
        let documents = [IngestDocument::from(&record)];

        match self.engine.ingest(namespace, &documents, &token.token).await {
            Ok(_) => {
                record.mark_accepted()?;
                record_document_transition(DocumentState::Queued, record.state());
                let updated = self.documents.update(record).await?;

                info!(namespace = %namespace, attempts = updated.attempts(), "Engine accepted document");
                Ok(updated)
            }
            Err(e) if e.is_engine_failure() => {
                record.record_dispatch_error(e.to_string());
                self.documents.update(record).await?;

                warn!(namespace = %namespace, error = %e, "Engine did not accept document; left queued");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply an engine completion signal
    ///
    /// Duplicates are no-ops. A failure for a queryable document is an
    /// anomaly and is rejected without changing state.
    #[instrument(skip_all, fields(document_id = %signal.document_id))]
    pub async fn handle_signal(&self, signal: CompletionSignal) -> Result<SignalOutcome, DomainError> {
        let _guard = self.locks.lock(&document_lock_key(&signal.document_id)).await;

        let mut record = self.load(&signal.document_id).await?;
        let from = record.state();

        match classify_signal(from, &signal.outcome)? {
            SignalDisposition::Duplicate => {
                debug!(state = %from, "Duplicate completion signal ignored");
                return Ok(SignalOutcome::Duplicate);
            }
            SignalDisposition::Anomaly => {
                warn!(state = %from, "Engine reported failure for a queryable document");
                return Err(DomainError::conflict(format!(
                    "Document '{}' is already queryable",
                    signal.document_id
                )));
            }
            SignalDisposition::Apply => {}
        }

        let to = match signal.outcome {
            CompletionOutcome::Succeeded => record.mark_succeeded()?,
            CompletionOutcome::Failed { detail } => record
                .mark_failed(detail.unwrap_or_else(|| "engine reported failure".to_string()))?,
        };

        self.documents.update(record).await?;
        record_document_transition(from, to);

        info!(from = %from, to = %to, "Applied completion signal");
        Ok(SignalOutcome::Applied(to))
    }
}
