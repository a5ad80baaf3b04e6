//! In-memory storage implementation

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::storage::{Storage, StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Thread-safe in-memory storage
///
/// Entities are kept in key order so prefix scans are range reads. Data is
/// lost when the process terminates.
#[derive(Debug)]
pub struct InMemoryStorage<E>
where
    E: StorageEntity,
{
    entities: RwLock<BTreeMap<String, E>>,
}

impl<E> Default for InMemoryStorage<E>
where
    E: StorageEntity,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> InMemoryStorage<E>
where
    E: StorageEntity,
{
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
        }
    }

    fn read_lock_error<T>(e: std::sync::PoisonError<T>) -> DomainError {
        DomainError::storage(format!("Failed to acquire read lock: {}", e))
    }

    fn write_lock_error<T>(e: std::sync::PoisonError<T>) -> DomainError {
        DomainError::storage(format!("Failed to acquire write lock: {}", e))
    }
}

#[async_trait]
impl<E> Storage<E> for InMemoryStorage<E>
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError> {
        let entities = self.entities.read().map_err(Self::read_lock_error)?;
        Ok(entities.get(key.as_str()).cloned())
    }

    async fn list(&self) -> Result<Vec<E>, DomainError> {
        let entities = self.entities.read().map_err(Self::read_lock_error)?;
        Ok(entities.values().cloned().collect())
    }

    async fn list_by_key_prefix(&self, prefix: &str) -> Result<Vec<E>, DomainError> {
        let entities = self.entities.read().map_err(Self::read_lock_error)?;

        Ok(entities
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, entity)| entity.clone())
            .collect())
    }

    async fn create(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        let mut entities = self.entities.write().map_err(Self::write_lock_error)?;

        if entities.contains_key(&key) {
            return Err(DomainError::conflict(format!(
                "Entity with key '{}' already exists",
                key
            )));
        }

        entities.insert(key, entity.clone());
        Ok(entity)
    }

    async fn update(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        let mut entities = self.entities.write().map_err(Self::write_lock_error)?;

        match entities.get_mut(&key) {
            Some(slot) => {
                *slot = entity.clone();
                Ok(entity)
            }
            None => Err(DomainError::not_found(format!(
                "Entity with key '{}' not found",
                key
            ))),
        }
    }

    async fn save(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        let mut entities = self.entities.write().map_err(Self::write_lock_error)?;

        entities.insert(key, entity.clone());
        Ok(entity)
    }

    async fn delete(&self, key: &E::Key) -> Result<bool, DomainError> {
        let mut entities = self.entities.write().map_err(Self::write_lock_error)?;
        Ok(entities.remove(key.as_str()).is_some())
    }

    async fn exists(&self, key: &E::Key) -> Result<bool, DomainError> {
        let entities = self.entities.read().map_err(Self::read_lock_error)?;
        Ok(entities.contains_key(key.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::binding::{BindingAction, BindingAuditEntry, BindingAuditId, Namespace};
    use crate::domain::identity::UserId;
    use crate::domain::knowledge_base::KnowledgeBaseId;
    use crate::domain::sharing::{GrantKey, PermissionGrant, PermissionLevel};

    fn kb(id: &str) -> KnowledgeBaseId {
        KnowledgeBaseId::new(id).unwrap()
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn grant(kb_id: &str, grantee: &str, level: PermissionLevel) -> PermissionGrant {
        PermissionGrant::new(kb(kb_id), user(grantee), level, user("owner"))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let storage = InMemoryStorage::new();
        let created = storage
            .create(grant("kb-1", "bob", PermissionLevel::Read))
            .await
            .unwrap();

        let fetched = storage.get(created.key()).await.unwrap();
        assert_eq!(fetched, Some(created));
    }

    #[tokio::test]
    async fn test_create_duplicate_conflicts() {
        let storage = InMemoryStorage::new();
        storage.create(grant("kb-1", "bob", PermissionLevel::Read)).await.unwrap();

        let result = storage.create(grant("kb-1", "bob", PermissionLevel::Read)).await;
        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let storage = InMemoryStorage::new();
        let result = storage.update(grant("kb-1", "bob", PermissionLevel::Read)).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_prefix_scan_respects_separator() {
        let storage = InMemoryStorage::new();
        storage.create(grant("kb-1", "bob", PermissionLevel::Read)).await.unwrap();
        storage.create(grant("kb-1", "bob", PermissionLevel::Admin)).await.unwrap();
        storage.create(grant("kb-1", "carol", PermissionLevel::Query)).await.unwrap();
        storage.create(grant("kb-10", "bob", PermissionLevel::Read)).await.unwrap();

        let all = storage
            .list_by_key_prefix(&GrantKey::knowledge_base_prefix(&kb("kb-1")))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let bob = storage
            .list_by_key_prefix(&GrantKey::grantee_prefix(&kb("kb-1"), &user("bob")))
            .await
            .unwrap();
        assert_eq!(bob.len(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = InMemoryStorage::new();
        let entry = BindingAuditEntry::new(
            kb("kb-1"),
            BindingAction::Bound,
            Namespace::new("ns").unwrap(),
            None,
            user("owner"),
        );
        let key = entry.key().clone();
        storage.create(entry).await.unwrap();

        assert!(storage.delete(&key).await.unwrap());
        assert!(!storage.delete(&key).await.unwrap());
        assert!(storage
            .list_by_key_prefix(&BindingAuditId::prefix_for(&kb("kb-1")))
            .await
            .unwrap()
            .is_empty());
    }
}
