//! reqwest-backed engine transport

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::engine::{EngineMethod, EngineReply, EngineRequest, EngineTransport, TransportError};
use crate::domain::DomainError;

/// Engine transport over HTTP
#[derive(Debug, Clone)]
pub struct HttpEngineTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEngineTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}

#[async_trait]
impl EngineTransport for HttpEngineTransport {
    async fn send(&self, request: EngineRequest) -> Result<EngineReply, TransportError> {
        let url = self.url(&request.path);
        debug!(method = %request.method, url = %url, "Sending engine request");

        let mut builder = match request.method {
            EngineMethod::Get => self.client.get(&url),
            EngineMethod::Post => self.client.post(&url),
        };

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;

        Ok(EngineReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_post_with_bearer_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(header("authorization", "Bearer tok"))
            .and(body_json(json!({"message": "hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"answer":"hello"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpEngineTransport::new(server.uri(), Duration::from_secs(5)).unwrap();
        let reply = transport
            .send(EngineRequest::post("/chat", json!({"message": "hi"})).with_bearer("tok"))
            .await
            .unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, r#"{"answer":"hello"}"#);
    }

    #[tokio::test]
    async fn test_error_status_is_a_reply() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let transport = HttpEngineTransport::new(format!("{}/", server.uri()), Duration::from_secs(5)).unwrap();
        let reply = transport.send(EngineRequest::get("/health")).await.unwrap();

        assert_eq!(reply.status, 503);
        assert_eq!(reply.body, "down");
    }

    #[tokio::test]
    async fn test_slow_engine_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport = HttpEngineTransport::new(server.uri(), Duration::from_millis(50)).unwrap();
        let result = transport.send(EngineRequest::get("/health")).await;

        assert_eq!(result.unwrap_err(), TransportError::Timeout);
    }

    #[tokio::test]
    async fn test_unreachable_engine() {
        // Nothing listens on port 9 locally
        let transport = HttpEngineTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let result = transport.send(EngineRequest::get("/health")).await;

        assert!(matches!(
            result,
            Err(TransportError::Connect(_)) | Err(TransportError::Other(_))
        ));
    }
}
