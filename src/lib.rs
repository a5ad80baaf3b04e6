//! Knowledge Base Access Gateway
//!
//! Access and synchronization layer in front of an external RAG engine:
//! - Delegated, namespace-scoped tokens for the engine
//! - Knowledge base to namespace bindings with an audit trail
//! - Sharing with read, query and admin levels
//! - Document ingestion state kept consistent with the engine

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use api::state::AppState;
use domain::binding::{BindingAuditEntry, NamespaceBinding};
use domain::document::DocumentRecord;
use domain::engine::EngineTransport;
use domain::knowledge_base::KnowledgeBase;
use domain::sharing::PermissionGrant;
use infrastructure::auth::{JwtTokenSigner, SigningKey, TokenSigner};
use infrastructure::engine::{ExternalEngine, HttpEngineTransport};
use infrastructure::locks::KeyedLocks;
use infrastructure::services::{
    BindingService, CallbackVerifier, IngestionOrchestrator, KnowledgeBaseService,
    NamespaceLimiter, PermissionLedger, QueryRouter, TokenIssuer,
};
use infrastructure::storage::{PostgresConfig, StorageConfig, StorageFactory, StorageType};
use tracing::{info, warn};

/// Create the application state with default configuration
pub async fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_config(&AppConfig::default()).await
}

/// Create the application state from configuration
///
/// Connects the configured storage backend and an HTTP transport to the
/// engine.
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let storage_config = resolve_storage_config(config)?;
    info!(backend = ?storage_config.storage_type(), "Initializing storage");
    let factory = StorageFactory::new(storage_config).await?;

    let transport = HttpEngineTransport::new(
        config.engine.base_url.clone(),
        Duration::from_secs(config.engine.timeout_secs),
    )?;
    info!(base_url = %config.engine.base_url, "Engine transport ready");

    build_app_state(config, &factory, Arc::new(transport)).await
}

/// Wire all services over the given storage and engine transport
pub async fn build_app_state(
    config: &AppConfig,
    factory: &StorageFactory,
    transport: Arc<dyn EngineTransport>,
) -> anyhow::Result<AppState> {
    let knowledge_base_storage = factory.create::<KnowledgeBase>("knowledge_bases").await?;
    let grant_storage = factory.create::<PermissionGrant>("permission_grants").await?;
    let binding_storage = factory.create::<NamespaceBinding>("namespace_bindings").await?;
    let audit_storage = factory.create::<BindingAuditEntry>("binding_audit").await?;
    let document_storage = factory.create::<DocumentRecord>("documents").await?;

    let locks = Arc::new(KeyedLocks::new());
    let engine = Arc::new(ExternalEngine::new(
        transport,
        Duration::from_secs(config.engine.timeout_secs),
    ));

    let ledger = Arc::new(PermissionLedger::new(
        knowledge_base_storage.clone(),
        grant_storage,
        locks.clone(),
    ));
    let bindings = Arc::new(BindingService::new(
        binding_storage,
        audit_storage,
        ledger.clone(),
        locks.clone(),
    ));
    let knowledge_bases = Arc::new(KnowledgeBaseService::new(
        knowledge_base_storage,
        document_storage.clone(),
        ledger.clone(),
        bindings.clone(),
        locks.clone(),
    ));

    let signer = create_token_signer(config)?;
    let issuer = Arc::new(TokenIssuer::new(
        signer,
        bindings.clone(),
        ledger.clone(),
        config.token.lifetime_secs,
    ));

    let orchestrator = Arc::new(IngestionOrchestrator::new(
        document_storage,
        ledger.clone(),
        bindings.clone(),
        issuer.clone(),
        engine.clone(),
        locks,
    ));

    let limiter = Arc::new(NamespaceLimiter::new(
        config.router.max_in_flight_per_namespace,
        Duration::from_millis(config.router.acquire_timeout_ms),
    ));
    let router = Arc::new(QueryRouter::new(issuer.clone(), limiter, engine.clone()));

    let callback_verifier = CallbackVerifier::new(
        config.engine.callback_secret.clone(),
        config.engine.allow_unsigned_callbacks,
    );
    if callback_verifier.accepts_unsigned() {
        warn!("Unsigned engine callbacks are allowed; completion callbacks are not authenticated");
    } else if !callback_verifier.is_enabled() {
        warn!("No engine callback secret configured; completion callbacks will be rejected");
    }

    Ok(AppState {
        knowledge_bases,
        ledger,
        bindings,
        issuer,
        orchestrator,
        router,
        engine,
        callback_verifier,
    })
}

fn resolve_storage_config(config: &AppConfig) -> anyhow::Result<StorageConfig> {
    let settings = &config.storage;

    match StorageType::from_str(&settings.backend)? {
        StorageType::InMemory => Ok(StorageConfig::in_memory()),
        StorageType::Postgres => {
            let url = match &settings.url {
                Some(url) => url.clone(),
                None => std::env::var("DATABASE_URL").map_err(|_| {
                    anyhow::anyhow!("Postgres storage needs storage.url or DATABASE_URL")
                })?,
            };

            Ok(StorageConfig::postgres(PostgresConfig {
                max_connections: settings.max_connections,
                connect_timeout_secs: settings.connect_timeout_secs,
                ..PostgresConfig::new(url)
            }))
        }
    }
}

fn create_token_signer(config: &AppConfig) -> anyhow::Result<Arc<dyn TokenSigner>> {
    let token = &config.token;

    let active = match &token.active_secret {
        Some(secret) => SigningKey::from_base64(token.active_kid.clone(), secret)?,
        None => {
            warn!("No token signing secret configured; using an ephemeral key");
            SigningKey::ephemeral()
        }
    };

    let retired = token
        .retired
        .iter()
        .map(|key| SigningKey::from_base64(key.kid.clone(), &key.secret))
        .collect::<Result<Vec<_>, _>>()?;

    info!(kid = %active.kid(), retired = retired.len(), "Token signer ready");
    Ok(Arc::new(JwtTokenSigner::new(active, retired)?))
}
