use axum::{middleware, routing::get, Router};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::admin;
use super::health;
use super::middleware::{logging_middleware, metrics_middleware};
use super::state::AppState;
use super::v1;

/// Create a minimal router without state (for probes only)
///
/// `/ready` needs the engine and is not available here.
pub fn create_router() -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/live", get(health::live_check))
        .layer(TraceLayer::new_for_http())
}

/// Create the full router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        // Management API, caller from X-User-Id
        .nest("/api", admin::create_admin_router())
        // Delegated-token queries and engine callbacks
        .nest("/v1", v1::create_v1_router())
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::domain::engine::{EngineReply, MockEngineTransport};
    use crate::infrastructure::storage::{StorageConfig, StorageFactory};

    async fn app_with(transport: MockEngineTransport) -> Router {
        let factory = StorageFactory::new(StorageConfig::in_memory()).await.unwrap();
        let state = crate::build_app_state(&AppConfig::default(), &factory, Arc::new(transport))
            .await
            .unwrap();
        create_router_with_state(state)
    }

    async fn call(app: &Router, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_management_requires_identity() {
        let app = app_with(MockEngineTransport::new()).await;
        let (status, body) = call(&app, "GET", "/api/knowledge-bases", None, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_knowledge_base_lifecycle_over_http() {
        let app = app_with(MockEngineTransport::new()).await;

        let (status, created) = call(
            &app,
            "POST",
            "/api/knowledge-bases",
            Some("alice"),
            Some(json!({ "id": "auto-manuals", "name": "Auto manuals" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["effective_level"], "admin");

        let (status, _) = call(
            &app,
            "POST",
            "/api/knowledge-bases/auto-manuals/binding",
            Some("alice"),
            Some(json!({ "namespace": "manuals-ns" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = call(&app, "GET", "/api/knowledge-bases/auto-manuals", Some("mallory"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, view) = call(&app, "GET", "/api/knowledge-bases/auto-manuals", Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["namespace"], "manuals-ns");
    }

    #[tokio::test]
    async fn test_unbound_submit_is_conflict_with_code() {
        let mut transport = MockEngineTransport::new();
        transport.expect_send().never();
        let app = app_with(transport).await;

        call(
            &app,
            "POST",
            "/api/knowledge-bases",
            Some("alice"),
            Some(json!({ "id": "auto-manuals", "name": "Auto manuals" })),
        )
        .await;
        let (_, document) = call(
            &app,
            "POST",
            "/api/knowledge-bases/auto-manuals/documents",
            Some("alice"),
            Some(json!({ "name": "engine-oil.pdf" })),
        )
        .await;

        let uri = format!("/api/documents/{}/submit", document["id"].as_str().unwrap());
        let (status, body) = call(&app, "POST", &uri, Some("alice"), None).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "not_bound");
    }

    #[tokio::test]
    async fn test_query_with_issued_token() {
        let mut transport = MockEngineTransport::new();
        transport
            .expect_send()
            .withf(|req| req.path == "/text")
            .returning(|_| Ok(EngineReply::new(200, r#"{"response":"ok"}"#)));
        let app = app_with(transport).await;

        call(
            &app,
            "POST",
            "/api/knowledge-bases",
            Some("alice"),
            Some(json!({ "id": "auto-manuals", "name": "Auto manuals" })),
        )
        .await;
        call(
            &app,
            "POST",
            "/api/knowledge-bases/auto-manuals/binding",
            Some("alice"),
            Some(json!({ "namespace": "manuals-ns" })),
        )
        .await;
        let (status, issued) = call(
            &app,
            "POST",
            "/api/tokens",
            Some("alice"),
            Some(json!({ "knowledge_base_id": "auto-manuals", "level": "query" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(issued["namespace"], "manuals-ns");
        assert!(!issued.to_string().contains("auto-manuals"));

        let request = Request::builder()
            .method("POST")
            .uri("/v1/query/text")
            .header("authorization", format!("Bearer {}", issued["token"].as_str().unwrap()))
            .header("content-type", "application/json")
            .body(Body::from(json!({ "query": "机油" }).to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["answer"], "ok");
    }

    #[tokio::test]
    async fn test_edit_routes_over_http() {
        let app = app_with(MockEngineTransport::new()).await;
        call(
            &app,
            "POST",
            "/api/knowledge-bases",
            Some("alice"),
            Some(json!({ "id": "auto-manuals", "name": "Auto manuals" })),
        )
        .await;

        let (status, renamed) = call(
            &app,
            "PATCH",
            "/api/knowledge-bases/auto-manuals",
            Some("alice"),
            Some(json!({ "name": "Service manuals" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renamed["name"], "Service manuals");

        call(
            &app,
            "POST",
            "/api/knowledge-bases/auto-manuals/grants",
            Some("alice"),
            Some(json!({ "grantee": "bob", "level": "admin" })),
        )
        .await;
        let (status, changed) = call(
            &app,
            "PUT",
            "/api/knowledge-bases/auto-manuals/grants/bob",
            Some("alice"),
            Some(json!({ "level": "read" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(changed["level"], "read");

        let (_, document) = call(
            &app,
            "POST",
            "/api/knowledge-bases/auto-manuals/documents",
            Some("alice"),
            Some(json!({ "name": "engine-oil.pdf" })),
        )
        .await;
        let uri = format!("/api/documents/{}", document["id"].as_str().unwrap());

        let (status, _) = call(&app, "DELETE", &uri, Some("bob"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&app, "DELETE", &uri, Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, "GET", &uri, Some("alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unsigned_callback_rejected_by_default() {
        let app = app_with(MockEngineTransport::new()).await;
        let (status, _) = call(
            &app,
            "POST",
            "/v1/ingestion/callback",
            None,
            Some(json!({ "document_id": "doc-1", "status": "succeeded" })),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_query_without_token_is_unauthorized() {
        let app = app_with(MockEngineTransport::new()).await;
        let (status, _) = call(&app, "POST", "/v1/query/chat", None, Some(json!({ "message": "hi" }))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_query_kind_is_not_found() {
        let app = app_with(MockEngineTransport::new()).await;
        let request = Request::builder()
            .method("POST")
            .uri("/v1/query/ingest")
            .header("authorization", "Bearer whatever")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let app = app_with(MockEngineTransport::new()).await;
        let response = app
            .oneshot(Request::builder().uri("/live").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.headers().contains_key("x-request-id"));
    }
}
