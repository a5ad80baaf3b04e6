//! PostgreSQL backend: one `(key, data JSONB)` table per entity type

use std::fmt::Debug;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;

use crate::domain::storage::{Storage, StorageEntity, StorageKey};
use crate::domain::DomainError;

static TABLE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,62}$").unwrap());

/// Pool settings for the Postgres backend
#[derive(Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/kb_access".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Connection URL with any password masked
    pub fn redacted_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };
        let Some((credentials, host)) = rest.rsplit_once('@') else {
            return self.url.clone();
        };

        match credentials.split_once(':') {
            Some((user, _)) => format!("{}://{}:***@{}", scheme, user, host),
            None => self.url.clone(),
        }
    }
}

impl Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("url", &self.redacted_url())
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .finish()
    }
}

/// Opens the pool shared by every entity table
pub async fn connect_pool(config: &PostgresConfig) -> Result<PgPool, DomainError> {
    debug!(url = %config.redacted_url(), "Connecting to PostgreSQL");

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections.min(config.max_connections))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))
}

fn sql_error(operation: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::storage(format!("Failed to {}: {}", operation, e))
}

/// Entities of one type in their own table
///
/// Composite keys such as `kb/grantee/level` are stored verbatim so prefix
/// scans stay on the primary key index.
pub struct PostgresStorage<E>
where
    E: StorageEntity,
{
    pool: PgPool,
    table: String,
    _entity: PhantomData<E>,
}

impl<E> Debug for PostgresStorage<E>
where
    E: StorageEntity,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStorage")
            .field("table", &self.table)
            .finish()
    }
}

impl<E> PostgresStorage<E>
where
    E: StorageEntity,
{
    /// Table names are interpolated into SQL, so only `[a-z][a-z0-9_]*` is accepted
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self, DomainError> {
        let table = table.into();
        if !TABLE_NAME.is_match(&table) {
            return Err(DomainError::configuration(format!(
                "Invalid storage table name '{}'",
                table
            )));
        }

        Ok(Self {
            pool,
            table,
            _entity: PhantomData,
        })
    }

    pub async fn ensure_table(&self) -> Result<(), DomainError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            self.table
        );

        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(sql_error("create table"))?;

        debug!(table = %self.table, "Storage table ready");
        Ok(())
    }

    fn encode(entity: &E) -> Result<serde_json::Value, DomainError> {
        serde_json::to_value(entity)
            .map_err(|e| DomainError::storage(format!("Failed to serialize entity: {}", e)))
    }

    fn decode(row: &PgRow) -> Result<E, DomainError> {
        let data: serde_json::Value = row
            .try_get("data")
            .map_err(sql_error("read row"))?;
        serde_json::from_value(data)
            .map_err(|e| DomainError::storage(format!("Failed to deserialize entity: {}", e)))
    }

    async fn fetch_many(&self, sql: &str, bind: Option<String>) -> Result<Vec<E>, DomainError> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }

        query
            .fetch_all(&self.pool)
            .await
            .map_err(sql_error("list entities"))?
            .iter()
            .map(Self::decode)
            .collect()
    }
}

#[async_trait]
impl<E> Storage<E> for PostgresStorage<E>
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError> {
        let sql = format!("SELECT data FROM {} WHERE key = $1", self.table);

        sqlx::query(&sql)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_error("get entity"))?
            .as_ref()
            .map(Self::decode)
            .transpose()
    }

    async fn list(&self) -> Result<Vec<E>, DomainError> {
        let sql = format!("SELECT data FROM {} ORDER BY key", self.table);
        self.fetch_many(&sql, None).await
    }

    async fn list_by_key_prefix(&self, prefix: &str) -> Result<Vec<E>, DomainError> {
        let sql = format!(
            "SELECT data FROM {} WHERE key LIKE $1 ESCAPE '\\' ORDER BY key",
            self.table
        );
        self.fetch_many(&sql, Some(format!("{}%", escape_like(prefix))))
            .await
    }

    async fn create(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        let sql = format!("INSERT INTO {} (key, data) VALUES ($1, $2)", self.table);

        sqlx::query(&sql)
            .bind(&key)
            .bind(Self::encode(&entity)?)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    DomainError::conflict(format!("Entity with key '{}' already exists", key))
                }
                _ => sql_error("create entity")(e),
            })?;

        Ok(entity)
    }

    async fn update(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        let sql = format!(
            "UPDATE {} SET data = $2, updated_at = NOW() WHERE key = $1",
            self.table
        );

        let result = sqlx::query(&sql)
            .bind(&key)
            .bind(Self::encode(&entity)?)
            .execute(&self.pool)
            .await
            .map_err(sql_error("update entity"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "Entity with key '{}' not found",
                key
            )));
        }

        Ok(entity)
    }

    /// Single-statement upsert instead of the exists-then-write default
    async fn save(&self, entity: E) -> Result<E, DomainError> {
        let sql = format!(
            "INSERT INTO {} (key, data) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
            self.table
        );

        sqlx::query(&sql)
            .bind(entity.key().as_str())
            .bind(Self::encode(&entity)?)
            .execute(&self.pool)
            .await
            .map_err(sql_error("save entity"))?;

        Ok(entity)
    }

    async fn delete(&self, key: &E::Key) -> Result<bool, DomainError> {
        let sql = format!("DELETE FROM {} WHERE key = $1", self.table);

        let result = sqlx::query(&sql)
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_err(sql_error("delete entity"))?;

        Ok(result.rows_affected() > 0)
    }
}

/// Escape LIKE metacharacters so a key prefix matches literally
fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
