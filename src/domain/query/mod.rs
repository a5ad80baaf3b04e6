//! Query domain - request kinds and payload normalization

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::binding::Namespace;
use crate::domain::sharing::PermissionLevel;
use crate::domain::DomainError;

/// Default number of search hits
pub const DEFAULT_TOP_K: u32 = 5;

/// Default minimum relevance for search hits
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Upper bound on `top_k`
pub const MAX_TOP_K: u32 = 50;

/// Kind of engine request a token holder may route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Chat,
    Text,
    Search,
    /// Engine-wide re-initialization
    Initialize,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Text => "text",
            Self::Search => "search",
            Self::Initialize => "initialize",
        }
    }

    /// Minimum token level for this kind
    pub fn required_level(&self) -> PermissionLevel {
        match self {
            Self::Chat | Self::Text | Self::Search => PermissionLevel::Query,
            Self::Initialize => PermissionLevel::Admin,
        }
    }
}

impl FromStr for RequestKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "text" => Ok(Self::Text),
            "search" => Ok(Self::Search),
            "initialize" => Ok(Self::Initialize),
            other => Err(DomainError::not_found(format!(
                "Unknown request kind '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller payload as received; which fields matter depends on the kind
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<Value>>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// A validated request ready to be sent to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedQuery {
    Chat { message: String },
    Conversation { messages: Vec<Value> },
    Text { query: String },
    Search { query: String, top_k: u32, threshold: f64 },
    Initialize,
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl QueryPayload {
    /// Normalize for `kind`
    ///
    /// Chat takes `message`, then `content`, then `messages`. Text and search
    /// require `query`.
    pub fn normalize(&self, kind: RequestKind) -> Result<NormalizedQuery, DomainError> {
        match kind {
            RequestKind::Chat => {
                if let Some(message) = non_blank(self.message.as_ref())
                    .or_else(|| non_blank(self.content.as_ref()))
                {
                    return Ok(NormalizedQuery::Chat { message });
                }

                match &self.messages {
                    Some(messages) if !messages.is_empty() => Ok(NormalizedQuery::Conversation {
                        messages: messages.clone(),
                    }),
                    _ => Err(DomainError::validation(
                        "Missing 'message', 'content' or 'messages'",
                    )),
                }
            }
            RequestKind::Text => Ok(NormalizedQuery::Text {
                query: self.require_query()?,
            }),
            RequestKind::Search => {
                let top_k = self.top_k.unwrap_or(DEFAULT_TOP_K);
                if top_k == 0 || top_k > MAX_TOP_K {
                    return Err(DomainError::validation(format!(
                        "'top_k' must be between 1 and {}",
                        MAX_TOP_K
                    )));
                }

                let threshold = self.threshold.unwrap_or(DEFAULT_THRESHOLD);
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(DomainError::validation(
                        "'threshold' must be between 0.0 and 1.0",
                    ));
                }

                Ok(NormalizedQuery::Search {
                    query: self.require_query()?,
                    top_k,
                    threshold,
                })
            }
            RequestKind::Initialize => Ok(NormalizedQuery::Initialize),
        }
    }

    fn require_query(&self) -> Result<String, DomainError> {
        non_blank(self.query.as_ref()).ok_or_else(|| DomainError::validation("Missing 'query'"))
    }
}

/// Normalized engine answer returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub kind: RequestKind,
    pub namespace: Namespace,
    /// Best-effort answer text extracted from the engine reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Engine reply as JSON, or the plain text wrapped as a string
    pub raw: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> QueryPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_required_levels() {
        assert_eq!(RequestKind::Chat.required_level(), PermissionLevel::Query);
        assert_eq!(RequestKind::Search.required_level(), PermissionLevel::Query);
        assert_eq!(RequestKind::Initialize.required_level(), PermissionLevel::Admin);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("text".parse::<RequestKind>().unwrap(), RequestKind::Text);
        assert!("ingest".parse::<RequestKind>().is_err());
    }

    #[test]
    fn test_chat_field_precedence() {
        let normalized = payload(json!({"content": "b", "message": "a"}))
            .normalize(RequestKind::Chat)
            .unwrap();
        assert_eq!(normalized, NormalizedQuery::Chat { message: "a".into() });

        let normalized = payload(json!({"messages": [{"role": "user", "content": "hi"}]}))
            .normalize(RequestKind::Chat)
            .unwrap();
        assert!(matches!(normalized, NormalizedQuery::Conversation { .. }));

        assert!(payload(json!({})).normalize(RequestKind::Chat).is_err());
    }

    #[test]
    fn test_search_defaults() {
        let normalized = payload(json!({"query": "机油"}))
            .normalize(RequestKind::Search)
            .unwrap();
        assert_eq!(
            normalized,
            NormalizedQuery::Search {
                query: "机油".into(),
                top_k: DEFAULT_TOP_K,
                threshold: DEFAULT_THRESHOLD,
            }
        );
    }

    #[test]
    fn test_search_bounds() {
        assert!(payload(json!({"query": "q", "top_k": 0})).normalize(RequestKind::Search).is_err());
        assert!(payload(json!({"query": "q", "threshold": 1.5})).normalize(RequestKind::Search).is_err());
    }

    #[test]
    fn test_text_requires_query() {
        assert!(payload(json!({"query": "   "})).normalize(RequestKind::Text).is_err());
        assert!(payload(json!({"message": "x"})).normalize(RequestKind::Text).is_err());
    }
}
