use serde::Deserialize;

use crate::infrastructure::observability::MetricsConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Persistence backend selection
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// `memory` or `postgres`
    pub backend: String,
    /// Connection URL; falls back to `DATABASE_URL`
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// External RAG engine
#[derive(Clone, Deserialize)]
pub struct EngineConfig {
    pub base_url: String,
    #[serde(default = "default_engine_timeout_secs")]
    pub timeout_secs: u64,
    /// Shared secret for completion callback signatures
    #[serde(default)]
    pub callback_secret: Option<String>,
    /// Accept unsigned callbacks when no secret is set (local development)
    #[serde(default)]
    pub allow_unsigned_callbacks: bool,
}

/// Delegated token signing
#[derive(Clone, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_token_lifetime_secs")]
    pub lifetime_secs: i64,
    #[serde(default = "default_active_kid")]
    pub active_kid: String,
    /// URL-safe base64 key material; an ephemeral key is used when absent
    #[serde(default)]
    pub active_secret: Option<String>,
    /// Keys still accepted for verification after rotation
    #[serde(default)]
    pub retired: Vec<RetiredKeyConfig>,
}

#[derive(Clone, Deserialize)]
pub struct RetiredKeyConfig {
    pub kid: String,
    pub secret: String,
}

/// Query router backpressure
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_per_namespace: usize,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_engine_timeout_secs() -> u64 {
    30
}

fn default_token_lifetime_secs() -> i64 {
    600
}

fn default_active_kid() -> String {
    "primary".to_string()
}

fn default_max_in_flight() -> usize {
    8
}

fn default_acquire_timeout_ms() -> u64 {
    2_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            url: None,
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: default_engine_timeout_secs(),
            callback_secret: None,
            allow_unsigned_callbacks: false,
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("callback_secret", &self.callback_secret.as_ref().map(|_| "[REDACTED]"))
            .field("allow_unsigned_callbacks", &self.allow_unsigned_callbacks)
            .finish()
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: default_token_lifetime_secs(),
            active_kid: default_active_kid(),
            active_secret: None,
            retired: Vec::new(),
        }
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let retired: Vec<&str> = self.retired.iter().map(|k| k.kid.as_str()).collect();

        f.debug_struct("TokenConfig")
            .field("lifetime_secs", &self.lifetime_secs)
            .field("active_kid", &self.active_kid)
            .field("active_secret", &self.active_secret.as_ref().map(|_| "[REDACTED]"))
            .field("retired", &retired)
            .finish()
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_in_flight_per_namespace: default_max_in_flight(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
