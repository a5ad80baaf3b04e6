//! Storage factory for runtime backend selection

use std::str::FromStr;
use std::sync::Arc;

use crate::domain::storage::{Storage, StorageEntity};
use crate::domain::DomainError;

use super::in_memory::InMemoryStorage;
use super::postgres::{connect_pool, PostgresConfig, PostgresStorage};

/// Supported storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    InMemory,
    Postgres,
}

impl FromStr for StorageType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(DomainError::configuration(format!(
                "Unknown storage type '{}'",
                other
            ))),
        }
    }
}

/// Resolved storage configuration
#[derive(Debug, Clone)]
pub enum StorageConfig {
    InMemory,
    Postgres(PostgresConfig),
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self::InMemory
    }

    pub fn postgres(config: PostgresConfig) -> Self {
        Self::Postgres(config)
    }

    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::InMemory => StorageType::InMemory,
            Self::Postgres(_) => StorageType::Postgres,
        }
    }
}

/// Creates one storage per entity type
///
/// Postgres backends share the pool of the first connection made through
/// the same factory.
#[derive(Debug)]
pub struct StorageFactory {
    config: StorageConfig,
    pool: Option<sqlx::PgPool>,
}

impl StorageFactory {
    pub async fn new(config: StorageConfig) -> Result<Self, DomainError> {
        let pool = match &config {
            StorageConfig::InMemory => None,
            StorageConfig::Postgres(pg_config) => Some(connect_pool(pg_config).await?),
        };

        Ok(Self { config, pool })
    }

    pub fn storage_type(&self) -> StorageType {
        self.config.storage_type()
    }

    /// Creates the storage for entity `E`, backed by `table_name` on Postgres
    pub async fn create<E>(&self, table_name: &str) -> Result<Arc<dyn Storage<E>>, DomainError>
    where
        E: StorageEntity + 'static,
    {
        match &self.pool {
            None => Ok(Arc::new(InMemoryStorage::<E>::new())),
            Some(pool) => {
                let storage = PostgresStorage::<E>::new(pool.clone(), table_name)?;
                storage.ensure_table().await?;
                Ok(Arc::new(storage))
            }
        }
    }
}
