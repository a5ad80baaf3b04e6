//! Knowledge base catalog - create, view, list, edit and cascade-delete

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};

use crate::domain::document::DocumentRecord;
use crate::domain::identity::UserId;
use crate::domain::knowledge_base::{KnowledgeBase, KnowledgeBaseId, KnowledgeBaseView};
use crate::domain::sharing::PermissionLevel;
use crate::domain::storage::Storage;
use crate::domain::DomainError;
use crate::infrastructure::locks::KeyedLocks;

use super::binding_service::BindingService;
use super::permission_ledger::{knowledge_base_lock_key, knowledge_base_not_found, PermissionLedger};

/// Request to create a new knowledge base
#[derive(Debug, Clone, Deserialize)]
pub struct CreateKnowledgeBaseRequest {
    /// Generated as `kb-<uuid>` when absent
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Fields to change on a knowledge base; absent fields stay as they are
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateKnowledgeBaseRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// An empty string clears the description
    #[serde(default)]
    pub description: Option<String>,
}

fn owner_lock_key(owner: &UserId) -> String {
    format!("owner:{}", owner)
}

/// What a cascade delete removed
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeletionSummary {
    pub unbound_namespace: Option<String>,
    pub grants_removed: usize,
    pub documents_removed: usize,
}

/// Knowledge base service
pub struct KnowledgeBaseService {
    storage: Arc<dyn Storage<KnowledgeBase>>,
    documents: Arc<dyn Storage<DocumentRecord>>,
    ledger: Arc<PermissionLedger>,
    bindings: Arc<BindingService>,
    locks: Arc<KeyedLocks>,
}

impl std::fmt::Debug for KnowledgeBaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBaseService").finish()
    }
}

impl KnowledgeBaseService {
    pub fn new(
        storage: Arc<dyn Storage<KnowledgeBase>>,
        documents: Arc<dyn Storage<DocumentRecord>>,
        ledger: Arc<PermissionLedger>,
        bindings: Arc<BindingService>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            storage,
            documents,
            ledger,
            bindings,
            locks,
        }
    }

    /// Create a knowledge base owned by `owner`
    ///
    /// Names are unique per owner.
    #[instrument(skip_all, fields(owner = %owner))]
    pub async fn create(
        &self,
        request: CreateKnowledgeBaseRequest,
        owner: &UserId,
    ) -> Result<KnowledgeBase, DomainError> {
        let id = match request.id {
            Some(id) => KnowledgeBaseId::new(id)?,
            None => KnowledgeBaseId::generate(),
        };

        let mut knowledge_base = KnowledgeBase::new(id.clone(), owner.clone(), request.name)?;
        if let Some(description) = request.description.filter(|d| !d.trim().is_empty()) {
            knowledge_base = knowledge_base.with_description(description)?;
        }

        let _guard = self.locks.lock(&owner_lock_key(owner)).await;

        if self.name_taken(owner, knowledge_base.name(), None).await? {
            return Err(name_conflict(knowledge_base.name()));
        }

        let created = self.storage.create(knowledge_base).await.map_err(|e| match e {
            DomainError::Conflict { .. } => {
                DomainError::conflict(format!("Knowledge base '{}' already exists", id))
            }
            other => other,
        })?;

        info!(kb = %created.id(), "Created knowledge base");
        Ok(created)
    }

    async fn name_taken(
        &self,
        owner: &UserId,
        name: &str,
        except: Option<&KnowledgeBaseId>,
    ) -> Result<bool, DomainError> {
        Ok(self.storage.list().await?.iter().any(|existing| {
            existing.is_owned_by(owner)
                && existing.name() == name
                && Some(existing.id()) != except
        }))
    }

    /// Change name or description; requires admin
    ///
    /// A new name must stay unique among the owner's knowledge bases.
    #[instrument(skip_all, fields(kb = %knowledge_base_id, caller = %caller))]
    pub async fn update(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        caller: &UserId,
        request: UpdateKnowledgeBaseRequest,
    ) -> Result<KnowledgeBaseView, DomainError> {
        if request.name.is_none() && request.description.is_none() {
            return Err(DomainError::validation("Nothing to update"));
        }

        let _guard = self.locks.lock(&knowledge_base_lock_key(knowledge_base_id)).await;

        let authorized = self
            .ledger
            .authorize_held(knowledge_base_id, caller, PermissionLevel::Admin)
            .await?;
        let mut knowledge_base = authorized.knowledge_base;

        if let Some(name) = request.name {
            knowledge_base.rename(name)?;
        }
        if let Some(description) = request.description {
            knowledge_base.set_description(Some(description).filter(|d| !d.trim().is_empty()))?;
        }

        let updated = {
            let owner = knowledge_base.owner().clone();
            let _owner_guard = self.locks.lock(&owner_lock_key(&owner)).await;

            if self
                .name_taken(&owner, knowledge_base.name(), Some(knowledge_base_id))
                .await?
            {
                return Err(name_conflict(knowledge_base.name()));
            }

            self.storage.update(knowledge_base).await?
        };

        let namespace = self
            .bindings
            .lookup(knowledge_base_id)
            .await?
            .map(|binding| binding.namespace().to_string());

        info!(name = %updated.name(), "Updated knowledge base");
        Ok(KnowledgeBaseView {
            knowledge_base: updated,
            namespace,
            effective_level: authorized.level,
        })
    }

    /// One knowledge base as seen by `caller`; requires read
    pub async fn get(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        caller: &UserId,
    ) -> Result<KnowledgeBaseView, DomainError> {
        let authorized = self
            .ledger
            .authorize(knowledge_base_id, caller, PermissionLevel::Read)
            .await?;

        let namespace = self
            .bindings
            .lookup(knowledge_base_id)
            .await?
            .map(|binding| binding.namespace().to_string());

        Ok(KnowledgeBaseView {
            knowledge_base: authorized.knowledge_base,
            namespace,
            effective_level: authorized.level,
        })
    }

    /// Knowledge bases `caller` owns or has been granted, by name
    pub async fn list_visible(&self, caller: &UserId) -> Result<Vec<KnowledgeBaseView>, DomainError> {
        let (granted, bindings, knowledge_bases) = futures::try_join!(
            self.ledger.granted_levels(caller),
            self.bindings.list_all(),
            self.storage.list()
        )?;

        let namespaces: HashMap<KnowledgeBaseId, String> = bindings
            .into_iter()
            .map(|binding| {
                (
                    binding.knowledge_base_id().clone(),
                    binding.namespace().to_string(),
                )
            })
            .collect();

        let mut views: Vec<KnowledgeBaseView> = knowledge_bases
            .into_iter()
            .filter_map(|knowledge_base| {
                let level = if knowledge_base.is_owned_by(caller) {
                    PermissionLevel::Admin
                } else {
                    *granted.get(knowledge_base.id())?
                };

                Some(KnowledgeBaseView {
                    namespace: namespaces.get(knowledge_base.id()).cloned(),
                    effective_level: level,
                    knowledge_base,
                })
            })
            .collect();

        views.sort_by(|a, b| a.knowledge_base.name().cmp(b.knowledge_base.name()));
        Ok(views)
    }

    /// Delete a knowledge base with its binding, grants and documents
    ///
    /// Only the owner may delete; delegated admins get `Forbidden`.
    #[instrument(skip_all, fields(kb = %knowledge_base_id, caller = %caller))]
    pub async fn delete(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        caller: &UserId,
    ) -> Result<DeletionSummary, DomainError> {
        let _guard = self.locks.lock(&knowledge_base_lock_key(knowledge_base_id)).await;

        let knowledge_base = self
            .storage
            .get(knowledge_base_id)
            .await?
            .ok_or_else(|| knowledge_base_not_found(knowledge_base_id))?;

        if !knowledge_base.is_owned_by(caller) {
            return match self.ledger.effective_level_held(knowledge_base_id, caller).await? {
                Some(_) => Err(DomainError::forbidden(
                    "Only the owner may delete a knowledge base",
                )),
                None => Err(knowledge_base_not_found(knowledge_base_id)),
            };
        }

        let unbound_namespace = self
            .bindings
            .remove(knowledge_base_id, caller)
            .await?
            .map(|namespace| namespace.to_string());

        let grants_removed = self.ledger.remove_all(knowledge_base_id).await?;

        let mut documents_removed = 0;
        for document in self.documents.list().await? {
            if document.knowledge_base_id() == knowledge_base_id {
                self.documents.delete(document.id()).await?;
                documents_removed += 1;
            }
        }

        self.storage.delete(knowledge_base_id).await?;

        let summary = DeletionSummary {
            unbound_namespace,
            grants_removed,
            documents_removed,
        };
        info!(?summary, "Deleted knowledge base");
        Ok(summary)
    }
}

fn name_conflict(name: &str) -> DomainError {
    DomainError::conflict(format!("You already own a knowledge base named '{}'", name))
}
