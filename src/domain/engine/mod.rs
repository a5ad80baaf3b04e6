//! External RAG engine transport boundary
//!
//! The engine lives outside the trust boundary. Everything that talks to it
//! goes through [`EngineTransport`], which maps one request to one reply.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// HTTP method used against the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMethod {
    Get,
    Post,
}

impl fmt::Display for EngineMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// One outbound engine call
#[derive(Clone, PartialEq)]
pub struct EngineRequest {
    pub method: EngineMethod,
    pub path: String,
    pub body: Option<Value>,
    /// Delegated token presented as `Authorization: Bearer`
    pub bearer: Option<String>,
}

impl EngineRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: EngineMethod::Get,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: EngineMethod::Post,
            path: path.into(),
            body: Some(body),
            bearer: None,
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

impl fmt::Debug for EngineRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("body", &self.body)
            .field("bearer", &self.bearer.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Raw engine reply; the body may be JSON or plain text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineReply {
    pub status: u16,
    pub body: String,
}

impl EngineReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as JSON, or `None` for plain-text replies
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// The engine could not be reached
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("engine request timed out")]
    Timeout,

    #[error("engine connection failed: {0}")]
    Connect(String),

    #[error("engine request failed: {0}")]
    Other(String),
}

impl From<TransportError> for DomainError {
    fn from(err: TransportError) -> Self {
        DomainError::unavailable(err.to_string())
    }
}

/// Sends requests to the external engine
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EngineTransport: Send + Sync + fmt::Debug {
    async fn send(&self, request: EngineRequest) -> Result<EngineReply, TransportError>;
}
