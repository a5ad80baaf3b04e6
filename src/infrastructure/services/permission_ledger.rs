//! Permission ledger - sharing grants and effective access

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::domain::identity::UserId;
use crate::domain::knowledge_base::{KnowledgeBase, KnowledgeBaseId};
use crate::domain::sharing::{compute_effective_level, GrantKey, PermissionGrant, PermissionLevel};
use crate::domain::storage::{Storage, StorageEntity};
use crate::domain::DomainError;
use crate::infrastructure::locks::KeyedLocks;

/// Lock key of one knowledge base
///
/// Ledger, binding and catalog changes take it exclusively. Access checks
/// take it shared, so they never see a change halfway through.
pub(crate) fn knowledge_base_lock_key(knowledge_base_id: &KnowledgeBaseId) -> String {
    format!("kb:{}", knowledge_base_id)
}

/// Knowledge base the caller may act on, with the level they hold
#[derive(Debug, Clone)]
pub struct Authorized {
    pub knowledge_base: KnowledgeBase,
    pub level: PermissionLevel,
}

/// Tracks who may do what on each knowledge base
///
/// Access is the union of ownership (implicit admin) and additive grants.
pub struct PermissionLedger {
    knowledge_bases: Arc<dyn Storage<KnowledgeBase>>,
    grants: Arc<dyn Storage<PermissionGrant>>,
    locks: Arc<KeyedLocks>,
}

impl std::fmt::Debug for PermissionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionLedger").finish()
    }
}

impl PermissionLedger {
    pub fn new(
        knowledge_bases: Arc<dyn Storage<KnowledgeBase>>,
        grants: Arc<dyn Storage<PermissionGrant>>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            knowledge_bases,
            grants,
            locks,
        }
    }

    async fn load_knowledge_base(&self, id: &KnowledgeBaseId) -> Result<KnowledgeBase, DomainError> {
        self.knowledge_bases
            .get(id)
            .await?
            .ok_or_else(|| knowledge_base_not_found(id))
    }

    async fn level_on(
        &self,
        knowledge_base: &KnowledgeBase,
        identity: &UserId,
    ) -> Result<Option<PermissionLevel>, DomainError> {
        if knowledge_base.is_owned_by(identity) {
            return Ok(Some(PermissionLevel::Admin));
        }

        let grants = self
            .grants
            .list_by_key_prefix(&GrantKey::grantee_prefix(knowledge_base.id(), identity))
            .await?;

        Ok(compute_effective_level(knowledge_base.owner(), identity, &grants))
    }

    /// Effective level of `identity`: owner → admin, else the highest grant
    pub async fn effective_level(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        identity: &UserId,
    ) -> Result<Option<PermissionLevel>, DomainError> {
        let _guard = self.locks.read(&knowledge_base_lock_key(knowledge_base_id)).await;
        self.effective_level_held(knowledge_base_id, identity).await
    }

    /// [`Self::effective_level`] for a caller already holding the knowledge base lock
    pub(crate) async fn effective_level_held(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        identity: &UserId,
    ) -> Result<Option<PermissionLevel>, DomainError> {
        let knowledge_base = self.load_knowledge_base(knowledge_base_id).await?;
        self.level_on(&knowledge_base, identity).await
    }

    /// Require at least `required` on a knowledge base
    ///
    /// Callers with no access at all get `NotFound`, so existence is not
    /// revealed; callers with some lower access get `Forbidden`.
    pub async fn authorize(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        caller: &UserId,
        required: PermissionLevel,
    ) -> Result<Authorized, DomainError> {
        let _guard = self.locks.read(&knowledge_base_lock_key(knowledge_base_id)).await;
        self.authorize_held(knowledge_base_id, caller, required).await
    }

    /// [`Self::authorize`] for a caller already holding the knowledge base lock
    #[instrument(skip_all, fields(kb = %knowledge_base_id, caller = %caller, required = %required))]
    pub(crate) async fn authorize_held(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        caller: &UserId,
        required: PermissionLevel,
    ) -> Result<Authorized, DomainError> {
        let knowledge_base = self.load_knowledge_base(knowledge_base_id).await?;

        match self.level_on(&knowledge_base, caller).await? {
            None => {
                debug!("Caller has no access; masking as not found");
                Err(knowledge_base_not_found(knowledge_base_id))
            }
            Some(level) if !level.satisfies(required) => Err(DomainError::forbidden(format!(
                "'{}' access is required on knowledge base '{}'",
                required, knowledge_base_id
            ))),
            Some(level) => Ok(Authorized {
                knowledge_base,
                level,
            }),
        }
    }

    /// Grant `level` to `grantee`; the granter must hold admin
    #[instrument(skip_all, fields(kb = %knowledge_base_id, grantee = %grantee, level = %level))]
    pub async fn grant(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        grantee: &UserId,
        level: PermissionLevel,
        granted_by: &UserId,
    ) -> Result<PermissionGrant, DomainError> {
        let _guard = self.locks.lock(&knowledge_base_lock_key(knowledge_base_id)).await;

        let authorized = self
            .authorize_held(knowledge_base_id, granted_by, PermissionLevel::Admin)
            .await?;

        if authorized.knowledge_base.is_owned_by(grantee) {
            return Err(DomainError::validation(
                "The owner already holds admin on their knowledge base",
            ));
        }

        let grant = PermissionGrant::new(
            knowledge_base_id.clone(),
            grantee.clone(),
            level,
            granted_by.clone(),
        );

        let created = self.grants.create(grant).await.map_err(|e| match e {
            DomainError::Conflict { .. } => DomainError::conflict(format!(
                "'{}' already holds a '{}' grant on '{}'",
                grantee, level, knowledge_base_id
            )),
            other => other,
        })?;

        info!(granted_by = %granted_by, "Granted access");
        Ok(created)
    }

    /// Remove every grant of `grantee`; the revoker must hold admin
    ///
    /// Returns the number of grants removed.
    #[instrument(skip_all, fields(kb = %knowledge_base_id, grantee = %grantee))]
    pub async fn revoke(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        grantee: &UserId,
        revoked_by: &UserId,
    ) -> Result<usize, DomainError> {
        let _guard = self.locks.lock(&knowledge_base_lock_key(knowledge_base_id)).await;

        self.authorize_held(knowledge_base_id, revoked_by, PermissionLevel::Admin)
            .await?;

        let grants = self.grants_of(knowledge_base_id, grantee).await?;
        self.delete_lowest_first(grants.iter().collect()).await?;

        info!(revoked_by = %revoked_by, removed = grants.len(), "Revoked access");
        Ok(grants.len())
    }

    /// Replace every grant of `grantee` with a single grant at `level`
    ///
    /// The grantee must already hold a grant; the caller must hold admin.
    #[instrument(skip_all, fields(kb = %knowledge_base_id, grantee = %grantee, level = %level))]
    pub async fn set_level(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        grantee: &UserId,
        level: PermissionLevel,
        changed_by: &UserId,
    ) -> Result<PermissionGrant, DomainError> {
        let _guard = self.locks.lock(&knowledge_base_lock_key(knowledge_base_id)).await;

        self.authorize_held(knowledge_base_id, changed_by, PermissionLevel::Admin)
            .await?;

        let grants = self.grants_of(knowledge_base_id, grantee).await?;

        let kept = match grants.iter().find(|grant| grant.level() == level) {
            Some(existing) => existing.clone(),
            None => {
                self.grants
                    .create(PermissionGrant::new(
                        knowledge_base_id.clone(),
                        grantee.clone(),
                        level,
                        changed_by.clone(),
                    ))
                    .await?
            }
        };

        let replaced = grants.iter().filter(|grant| grant.level() != level).collect();
        self.delete_lowest_first(replaced).await?;

        info!(changed_by = %changed_by, "Changed access level");
        Ok(kept)
    }

    async fn grants_of(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        grantee: &UserId,
    ) -> Result<Vec<PermissionGrant>, DomainError> {
        let grants = self
            .grants
            .list_by_key_prefix(&GrantKey::grantee_prefix(knowledge_base_id, grantee))
            .await?;

        if grants.is_empty() {
            return Err(DomainError::not_found(format!(
                "'{}' holds no grant on '{}'",
                grantee, knowledge_base_id
            )));
        }

        Ok(grants)
    }

    /// Lowest levels go first, so the grantee's maximum only moves on the last delete
    async fn delete_lowest_first(&self, mut grants: Vec<&PermissionGrant>) -> Result<(), DomainError> {
        grants.sort_by_key(|grant| grant.level());

        for grant in grants {
            self.grants.delete(grant.key()).await?;
        }

        Ok(())
    }

    /// Grants on a knowledge base, oldest first; requires admin
    pub async fn list_grants(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        caller: &UserId,
    ) -> Result<Vec<PermissionGrant>, DomainError> {
        let _guard = self.locks.read(&knowledge_base_lock_key(knowledge_base_id)).await;

        self.authorize_held(knowledge_base_id, caller, PermissionLevel::Admin)
            .await?;

        let mut grants = self
            .grants
            .list_by_key_prefix(&GrantKey::knowledge_base_prefix(knowledge_base_id))
            .await?;
        grants.sort_by_key(|grant| grant.granted_at());

        Ok(grants)
    }

    /// Highest granted level of `identity` per knowledge base, ownership excluded
    pub async fn granted_levels(
        &self,
        identity: &UserId,
    ) -> Result<HashMap<KnowledgeBaseId, PermissionLevel>, DomainError> {
        let mut levels: HashMap<KnowledgeBaseId, PermissionLevel> = HashMap::new();

        for grant in self.grants.list().await? {
            if grant.grantee() != identity {
                continue;
            }

            levels
                .entry(grant.knowledge_base_id().clone())
                .and_modify(|level| *level = (*level).max(grant.level()))
                .or_insert(grant.level());
        }

        Ok(levels)
    }

    /// Drop every grant of a knowledge base; the caller holds its lock
    pub(crate) async fn remove_all(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
    ) -> Result<usize, DomainError> {
        let grants = self
            .grants
            .list_by_key_prefix(&GrantKey::knowledge_base_prefix(knowledge_base_id))
            .await?;

        for grant in &grants {
            self.grants.delete(grant.key()).await?;
        }

        Ok(grants.len())
    }
}

pub(crate) fn knowledge_base_not_found(id: &KnowledgeBaseId) -> DomainError {
    DomainError::not_found(format!("Knowledge base '{}' not found", id))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::time::Duration;

    use crate::domain::storage::mock::MockStorage;

    #[tokio::test]
    async fn test_owner_is_admin() {
        let (ledger, _, _) = ledger_with("auto-manuals", "alice").await;

        let level = ledger
            .effective_level(&kb_id("auto-manuals"), &user("alice"))
            .await
            .unwrap();
        assert_eq!(level, Some(PermissionLevel::Admin));
    }

    #[tokio::test]
    async fn test_grant_and_effective_level() {
        let (ledger, _, _) = ledger_with("auto-manuals", "alice").await;
        let kb = kb_id("auto-manuals");

        ledger.grant(&kb, &user("bob"), PermissionLevel::Read, &user("alice")).await.unwrap();
        ledger.grant(&kb, &user("bob"), PermissionLevel::Query, &user("alice")).await.unwrap();

        assert_eq!(
            ledger.effective_level(&kb, &user("bob")).await.unwrap(),
            Some(PermissionLevel::Query)
        );
        assert_eq!(ledger.effective_level(&kb, &user("carol")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_grant_conflicts() {
        let (ledger, _, _) = ledger_with("auto-manuals", "alice").await;
        let kb = kb_id("auto-manuals");

        ledger.grant(&kb, &user("bob"), PermissionLevel::Read, &user("alice")).await.unwrap();
        let result = ledger.grant(&kb, &user("bob"), PermissionLevel::Read, &user("alice")).await;

        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_non_admin_cannot_grant() {
        let (ledger, _, _) = ledger_with("auto-manuals", "alice").await;
        let kb = kb_id("auto-manuals");
        ledger.grant(&kb, &user("bob"), PermissionLevel::Query, &user("alice")).await.unwrap();

        let forbidden = ledger.grant(&kb, &user("carol"), PermissionLevel::Read, &user("bob")).await;
        assert!(matches!(forbidden, Err(DomainError::Forbidden { .. })));

        let masked = ledger.grant(&kb, &user("carol"), PermissionLevel::Read, &user("mallory")).await;
        assert!(matches!(masked, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delegated_admin_can_grant() {
        let (ledger, _, _) = ledger_with("auto-manuals", "alice").await;
        let kb = kb_id("auto-manuals");
        ledger.grant(&kb, &user("bob"), PermissionLevel::Admin, &user("alice")).await.unwrap();

        let grant = ledger.grant(&kb, &user("carol"), PermissionLevel::Read, &user("bob")).await.unwrap();
        assert_eq!(grant.granted_by(), &user("bob"));
    }

    #[tokio::test]
    async fn test_owner_cannot_be_granted() {
        let (ledger, _, _) = ledger_with("auto-manuals", "alice").await;
        let result = ledger
            .grant(&kb_id("auto-manuals"), &user("alice"), PermissionLevel::Read, &user("alice"))
            .await;
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_revoke_removes_all_levels() {
        let (ledger, _, _) = ledger_with("auto-manuals", "alice").await;
        let kb = kb_id("auto-manuals");
        ledger.grant(&kb, &user("bob"), PermissionLevel::Read, &user("alice")).await.unwrap();
        ledger.grant(&kb, &user("bob"), PermissionLevel::Admin, &user("alice")).await.unwrap();

        let removed = ledger.revoke(&kb, &user("bob"), &user("alice")).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(ledger.effective_level(&kb, &user("bob")).await.unwrap(), None);
        assert!(matches!(
            ledger.revoke(&kb, &user("bob"), &user("alice")).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_reads_never_see_a_revoke_halfway() {
        let (_, knowledge_bases, locks) = ledger_with("auto-manuals", "alice").await;
        let ledger = Arc::new(PermissionLedger::new(
            knowledge_bases,
            Arc::new(MockStorage::new().with_write_delay(Duration::from_millis(30))),
            locks,
        ));
        let kb = kb_id("auto-manuals");
        ledger.grant(&kb, &user("bob"), PermissionLevel::Read, &user("alice")).await.unwrap();
        ledger.grant(&kb, &user("bob"), PermissionLevel::Admin, &user("alice")).await.unwrap();

        let revoke = tokio::spawn({
            let ledger = ledger.clone();
            let kb = kb.clone();
            async move { ledger.revoke(&kb, &user("bob"), &user("alice")).await }
        });
        tokio::time::sleep(Duration::from_millis(45)).await;

        // One of two deletes has landed; unlocked scans still see the old maximum
        let scanned = ledger.granted_levels(&user("bob")).await.unwrap();
        assert_eq!(scanned.get(&kb), Some(&PermissionLevel::Admin));

        let during = ledger.effective_level(&kb, &user("bob")).await.unwrap();
        assert_eq!(revoke.await.unwrap().unwrap(), 2);
        assert_eq!(during, None);
    }

    #[tokio::test]
    async fn test_set_level_replaces_grants() {
        let (ledger, _, _) = ledger_with("auto-manuals", "alice").await;
        let kb = kb_id("auto-manuals");
        ledger.grant(&kb, &user("bob"), PermissionLevel::Read, &user("alice")).await.unwrap();
        ledger.grant(&kb, &user("bob"), PermissionLevel::Admin, &user("alice")).await.unwrap();

        let kept = ledger
            .set_level(&kb, &user("bob"), PermissionLevel::Query, &user("alice"))
            .await
            .unwrap();

        assert_eq!(kept.level(), PermissionLevel::Query);
        assert_eq!(
            ledger.effective_level(&kb, &user("bob")).await.unwrap(),
            Some(PermissionLevel::Query)
        );
        assert_eq!(ledger.list_grants(&kb, &user("alice")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_level_keeps_matching_grant() {
        let (ledger, _, _) = ledger_with("auto-manuals", "alice").await;
        let kb = kb_id("auto-manuals");
        let original = ledger.grant(&kb, &user("bob"), PermissionLevel::Read, &user("alice")).await.unwrap();
        ledger.grant(&kb, &user("bob"), PermissionLevel::Query, &user("alice")).await.unwrap();

        let kept = ledger
            .set_level(&kb, &user("bob"), PermissionLevel::Read, &user("alice"))
            .await
            .unwrap();

        assert_eq!(kept.granted_at(), original.granted_at());
        assert_eq!(
            ledger.effective_level(&kb, &user("bob")).await.unwrap(),
            Some(PermissionLevel::Read)
        );
    }

    #[tokio::test]
    async fn test_set_level_rules() {
        let (ledger, _, _) = ledger_with("auto-manuals", "alice").await;
        let kb = kb_id("auto-manuals");
        ledger.grant(&kb, &user("bob"), PermissionLevel::Query, &user("alice")).await.unwrap();

        assert!(matches!(
            ledger.set_level(&kb, &user("carol"), PermissionLevel::Read, &user("alice")).await,
            Err(DomainError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.set_level(&kb, &user("bob"), PermissionLevel::Admin, &user("bob")).await,
            Err(DomainError::Forbidden { .. })
        ));
        assert_eq!(
            ledger.effective_level(&kb, &user("bob")).await.unwrap(),
            Some(PermissionLevel::Query)
        );
    }

    #[tokio::test]
    async fn test_grants_do_not_leak_across_similar_ids() {
        let (ledger, knowledge_bases, _) = ledger_with("kb-1", "alice").await;
        knowledge_bases
            .create(KnowledgeBase::new(kb_id("kb-10"), user("alice"), "Other").unwrap())
            .await
            .unwrap();

        ledger.grant(&kb_id("kb-10"), &user("bob"), PermissionLevel::Admin, &user("alice")).await.unwrap();

        assert_eq!(ledger.effective_level(&kb_id("kb-1"), &user("bob")).await.unwrap(), None);
        assert!(ledger.list_grants(&kb_id("kb-1"), &user("alice")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authorize_masks_and_forbids() {
        let (ledger, _, _) = ledger_with("auto-manuals", "alice").await;
        let kb = kb_id("auto-manuals");
        ledger.grant(&kb, &user("bob"), PermissionLevel::Read, &user("alice")).await.unwrap();

        let ok = ledger.authorize(&kb, &user("bob"), PermissionLevel::Read).await.unwrap();
        assert_eq!(ok.level, PermissionLevel::Read);

        assert!(matches!(
            ledger.authorize(&kb, &user("bob"), PermissionLevel::Query).await,
            Err(DomainError::Forbidden { .. })
        ));
        assert!(matches!(
            ledger.authorize(&kb, &user("eve"), PermissionLevel::Read).await,
            Err(DomainError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.authorize(&kb_id("missing"), &user("alice"), PermissionLevel::Read).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_granted_levels_takes_max_per_kb() {
        let (ledger, _, _) = ledger_with("auto-manuals", "alice").await;
        let kb = kb_id("auto-manuals");
        ledger.grant(&kb, &user("bob"), PermissionLevel::Read, &user("alice")).await.unwrap();
        ledger.grant(&kb, &user("bob"), PermissionLevel::Query, &user("alice")).await.unwrap();

        let levels = ledger.granted_levels(&user("bob")).await.unwrap();
        assert_eq!(levels.get(&kb), Some(&PermissionLevel::Query));
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let (_, knowledge_bases, locks) = ledger_with("auto-manuals", "alice").await;
        let ledger = PermissionLedger::new(
            knowledge_bases,
            Arc::new(MockStorage::new().with_error("disk full")),
            locks,
        );

        let result = ledger.effective_level(&kb_id("auto-manuals"), &user("bob")).await;
        assert!(matches!(result, Err(DomainError::Storage { .. })));
    }
}
