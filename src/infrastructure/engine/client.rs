//! External RAG engine client
//!
//! Maps engine operations onto [`EngineTransport`] calls and normalizes
//! replies and failures.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::domain::binding::Namespace;
use crate::domain::document::DocumentRecord;
use crate::domain::engine::{EngineReply, EngineRequest, EngineTransport};
use crate::domain::query::NormalizedQuery;
use crate::domain::DomainError;

/// Longest upstream message surfaced to callers
const MAX_UPSTREAM_MESSAGE_LENGTH: usize = 200;

/// Document entry of an `/ingest` request
#[derive(Debug, Clone, Serialize)]
pub struct IngestDocument {
    pub doc_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub metadata: Value,
}

impl From<&DocumentRecord> for IngestDocument {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            doc_id: record.id().as_str().to_string(),
            title: record.name().to_string(),
            url: record.source_url().map(str::to_string),
            metadata: record.metadata().clone(),
        }
    }
}

/// Normalized reply of a query call
#[derive(Debug, Clone, PartialEq)]
pub struct EngineAnswer {
    pub answer: Option<String>,
    pub raw: Value,
}

/// Client for the external engine's endpoints
#[derive(Debug, Clone)]
pub struct ExternalEngine {
    transport: Arc<dyn EngineTransport>,
    timeout: Duration,
}

impl ExternalEngine {
    pub fn new(transport: Arc<dyn EngineTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// `GET /health`
    pub async fn health(&self) -> Result<Value, DomainError> {
        let reply = self.send(EngineRequest::get("/health")).await?;
        Ok(reply.json().unwrap_or_else(|| Value::String(reply.body)))
    }

    /// Route a normalized query for `namespace` with the caller's delegated token
    pub async fn query(
        &self,
        namespace: &Namespace,
        query: &NormalizedQuery,
        bearer: &str,
    ) -> Result<EngineAnswer, DomainError> {
        let (path, mut body) = match query {
            NormalizedQuery::Chat { message } => ("/chat", json!({ "message": message })),
            NormalizedQuery::Conversation { messages } => ("/chat", json!({ "messages": messages })),
            NormalizedQuery::Text { query } => ("/text", json!({ "query": query })),
            NormalizedQuery::Search {
                query,
                top_k,
                threshold,
            } => (
                "/chat",
                json!({
                    "message": search_prompt(query, *top_k),
                    "top_k": top_k,
                    "threshold": threshold,
                }),
            ),
            NormalizedQuery::Initialize => ("/initialize", json!({})),
        };
        body["namespace"] = Value::from(namespace.as_str());

        let reply = self
            .send(EngineRequest::post(path, body).with_bearer(bearer))
            .await?;
        Ok(normalize_answer(reply))
    }

    /// `POST /ingest` for documents of one namespace
    pub async fn ingest(
        &self,
        namespace: &Namespace,
        documents: &[IngestDocument],
        bearer: &str,
    ) -> Result<Value, DomainError> {
        let body = json!({
            "namespace": namespace.as_str(),
            "documents": documents,
        });

        let reply = self
            .send(EngineRequest::post("/ingest", body).with_bearer(bearer))
            .await?;

        Ok(reply.json().unwrap_or(Value::Null))
    }

    async fn send(&self, request: EngineRequest) -> Result<EngineReply, DomainError> {
        let path = request.path.clone();
        debug!(path = %path, "Calling engine");

        let reply = tokio::time::timeout(self.timeout, self.transport.send(request))
            .await
            .map_err(|_| DomainError::unavailable("engine request timed out"))??;

        if !reply.is_success() {
            warn!(path = %path, status = reply.status, "Engine returned an error");
            return Err(DomainError::upstream(reply.status, upstream_message(&reply)));
        }

        Ok(reply)
    }
}

/// Retrieval prompt sent through `/chat` for searches
fn search_prompt(query: &str, top_k: u32) -> String {
    format!(
        "请检索关于'{}'的相关信息，返回前{}个最相关的结果",
        query, top_k
    )
}

fn normalize_answer(reply: EngineReply) -> EngineAnswer {
    match reply.json() {
        Some(raw) => EngineAnswer {
            answer: extract_answer(&raw),
            raw,
        },
        None => EngineAnswer {
            answer: Some(reply.body.clone()),
            raw: Value::String(reply.body),
        },
    }
}

/// First non-empty answer-like field, including OpenAI-style choices
fn extract_answer(raw: &Value) -> Option<String> {
    if let Some(text) = raw.as_str() {
        return Some(text.to_string());
    }

    ["answer", "response", "text", "content", "result"]
        .iter()
        .find_map(|field| raw.get(*field).and_then(Value::as_str))
        .or_else(|| {
            raw.pointer("/choices/0/message/content")
                .and_then(Value::as_str)
        })
        .map(str::to_string)
}

/// Engine error text without echoing large bodies back to callers
fn upstream_message(reply: &EngineReply) -> String {
    let message = reply
        .json()
        .and_then(|body| {
            ["detail", "error", "message"]
                .iter()
                .find_map(|field| body.get(*field).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| reply.body.trim().to_string());

    if message.is_empty() {
        return format!("engine returned HTTP {}", reply.status);
    }

    if message.chars().count() > MAX_UPSTREAM_MESSAGE_LENGTH {
        let truncated: String = message.chars().take(MAX_UPSTREAM_MESSAGE_LENGTH).collect();
        format!("{}...", truncated)
    } else {
        message
    }
}
