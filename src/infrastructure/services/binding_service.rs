//! Namespace binding service - knowledge base ↔ external namespace mapping

use std::sync::Arc;

use tracing::{info, instrument};

use crate::domain::binding::{
    BindingAction, BindingAuditEntry, BindingAuditId, Namespace, NamespaceBinding,
};
use crate::domain::identity::UserId;
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::sharing::PermissionLevel;
use crate::domain::storage::Storage;
use crate::domain::DomainError;
use crate::infrastructure::locks::KeyedLocks;

use super::permission_ledger::{knowledge_base_lock_key, PermissionLedger};

fn not_bound(knowledge_base_id: &KnowledgeBaseId) -> DomainError {
    DomainError::not_bound(format!(
        "Knowledge base '{}' is not bound to a namespace",
        knowledge_base_id
    ))
}

/// Owns the single active binding of each knowledge base and its audit trail
pub struct BindingService {
    bindings: Arc<dyn Storage<NamespaceBinding>>,
    audit: Arc<dyn Storage<BindingAuditEntry>>,
    ledger: Arc<PermissionLedger>,
    locks: Arc<KeyedLocks>,
}

impl std::fmt::Debug for BindingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingService").finish()
    }
}

impl BindingService {
    pub fn new(
        bindings: Arc<dyn Storage<NamespaceBinding>>,
        audit: Arc<dyn Storage<BindingAuditEntry>>,
        ledger: Arc<PermissionLedger>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            bindings,
            audit,
            ledger,
            locks,
        }
    }

    async fn record(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        action: BindingAction,
        namespace: &Namespace,
        previous: Option<Namespace>,
        actor: &UserId,
    ) -> Result<(), DomainError> {
        let entry = BindingAuditEntry::new(
            knowledge_base_id.clone(),
            action,
            namespace.clone(),
            previous,
            actor.clone(),
        );
        self.audit.create(entry).await?;
        Ok(())
    }

    /// Bind an unbound knowledge base; `Conflict` if a binding exists
    #[instrument(skip_all, fields(kb = %knowledge_base_id, namespace = %namespace))]
    pub async fn bind(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        namespace: Namespace,
        actor: &UserId,
        remark: Option<String>,
    ) -> Result<NamespaceBinding, DomainError> {
        let _guard = self.locks.lock(&knowledge_base_lock_key(knowledge_base_id)).await;

        self.ledger
            .authorize_held(knowledge_base_id, actor, PermissionLevel::Admin)
            .await?;

        if let Some(existing) = self.bindings.get(knowledge_base_id).await? {
            return Err(DomainError::conflict(format!(
                "Knowledge base '{}' is already bound to '{}'; rebind explicitly",
                knowledge_base_id,
                existing.namespace()
            )));
        }

        let binding = NamespaceBinding::new(
            knowledge_base_id.clone(),
            namespace.clone(),
            actor.clone(),
            remark,
        );
        let created = self.bindings.create(binding).await?;
        self.record(knowledge_base_id, BindingAction::Bound, &namespace, None, actor)
            .await?;

        info!(actor = %actor, "Bound knowledge base");
        Ok(created)
    }

    /// Replace an existing binding; `NotBound` if there is none
    #[instrument(skip_all, fields(kb = %knowledge_base_id, namespace = %namespace))]
    pub async fn rebind(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        namespace: Namespace,
        actor: &UserId,
        remark: Option<String>,
    ) -> Result<NamespaceBinding, DomainError> {
        let _guard = self.locks.lock(&knowledge_base_lock_key(knowledge_base_id)).await;

        self.ledger
            .authorize_held(knowledge_base_id, actor, PermissionLevel::Admin)
            .await?;

        let current = self
            .bindings
            .get(knowledge_base_id)
            .await?
            .ok_or_else(|| not_bound(knowledge_base_id))?;

        if current.namespace() == &namespace {
            return Err(DomainError::conflict(format!(
                "Knowledge base '{}' is already bound to '{}'",
                knowledge_base_id, namespace
            )));
        }

        let binding = NamespaceBinding::new(
            knowledge_base_id.clone(),
            namespace.clone(),
            actor.clone(),
            remark,
        );
        let updated = self.bindings.update(binding).await?;
        self.record(
            knowledge_base_id,
            BindingAction::Rebound,
            &namespace,
            Some(current.namespace().clone()),
            actor,
        )
        .await?;

        info!(actor = %actor, previous = %current.namespace(), "Rebound knowledge base");
        Ok(updated)
    }

    /// Current namespace of a knowledge base, without an access check
    pub async fn resolve(&self, knowledge_base_id: &KnowledgeBaseId) -> Result<Namespace, DomainError> {
        self.bindings
            .get(knowledge_base_id)
            .await?
            .map(|binding| binding.namespace().clone())
            .ok_or_else(|| not_bound(knowledge_base_id))
    }

    /// Current binding, if any, without an access check
    pub async fn lookup(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
    ) -> Result<Option<NamespaceBinding>, DomainError> {
        self.bindings.get(knowledge_base_id).await
    }

    /// Every current binding
    pub async fn list_all(&self) -> Result<Vec<NamespaceBinding>, DomainError> {
        self.bindings.list().await
    }

    /// The binding as seen by a caller holding at least read
    pub async fn binding_for(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        caller: &UserId,
    ) -> Result<NamespaceBinding, DomainError> {
        let _guard = self.locks.read(&knowledge_base_lock_key(knowledge_base_id)).await;

        self.ledger
            .authorize_held(knowledge_base_id, caller, PermissionLevel::Read)
            .await?;

        self.bindings
            .get(knowledge_base_id)
            .await?
            .ok_or_else(|| not_bound(knowledge_base_id))
    }

    /// Knowledge bases currently bound to `namespace`
    ///
    /// Several knowledge bases may share a namespace.
    pub async fn reverse_resolve(&self, namespace: &Namespace) -> Result<Vec<KnowledgeBaseId>, DomainError> {
        let mut ids: Vec<KnowledgeBaseId> = self
            .bindings
            .list()
            .await?
            .into_iter()
            .filter(|binding| binding.namespace() == namespace)
            .map(|binding| binding.knowledge_base_id().clone())
            .collect();

        if ids.is_empty() {
            return Err(DomainError::not_bound(format!(
                "No knowledge base is bound to namespace '{}'",
                namespace
            )));
        }

        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    /// Remove the binding; `NotBound` if there is none
    #[instrument(skip_all, fields(kb = %knowledge_base_id))]
    pub async fn unbind(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        actor: &UserId,
    ) -> Result<Namespace, DomainError> {
        let _guard = self.locks.lock(&knowledge_base_lock_key(knowledge_base_id)).await;

        self.ledger
            .authorize_held(knowledge_base_id, actor, PermissionLevel::Admin)
            .await?;

        self.remove(knowledge_base_id, actor)
            .await?
            .ok_or_else(|| not_bound(knowledge_base_id))
    }

    /// Drop the binding if present and audit it; the caller holds the lock
    pub(crate) async fn remove(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        actor: &UserId,
    ) -> Result<Option<Namespace>, DomainError> {
        let Some(current) = self.bindings.get(knowledge_base_id).await? else {
            return Ok(None);
        };

        self.bindings.delete(knowledge_base_id).await?;
        self.record(
            knowledge_base_id,
            BindingAction::Unbound,
            current.namespace(),
            None,
            actor,
        )
        .await?;

        info!(kb = %knowledge_base_id, namespace = %current.namespace(), actor = %actor, "Unbound knowledge base");
        Ok(Some(current.namespace().clone()))
    }

    /// Audit trail of a knowledge base, oldest first; requires admin
    pub async fn audit_log(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        caller: &UserId,
    ) -> Result<Vec<BindingAuditEntry>, DomainError> {
        self.ledger
            .authorize(knowledge_base_id, caller, PermissionLevel::Admin)
            .await?;

        let mut entries = self
            .audit
            .list_by_key_prefix(&BindingAuditId::prefix_for(knowledge_base_id))
            .await?;
        entries.sort_by_key(|entry| entry.recorded_at());

        Ok(entries)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::infrastructure::services::permission_ledger::test_support::ledger_with;
    use crate::infrastructure::storage::InMemoryStorage;

    pub async fn binding_service_with(id: &str, owner: &str) -> (Arc<BindingService>, Arc<PermissionLedger>) {
        let (ledger, _, locks) = ledger_with(id, owner).await;
        let service = Arc::new(BindingService::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(InMemoryStorage::new()),
            ledger.clone(),
            locks,
        ));
        (service, ledger)
    }
}
