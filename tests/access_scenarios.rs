//! End-to-end access scenarios over in-memory storage and a stub engine

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kb_access_gateway::api::AppState;
use kb_access_gateway::build_app_state;
use kb_access_gateway::config::AppConfig;
use kb_access_gateway::domain::binding::Namespace;
use kb_access_gateway::domain::document::{
    CompletionOutcome, CompletionSignal, DocumentState, NewDocument, SignalOutcome,
};
use kb_access_gateway::domain::identity::UserId;
use kb_access_gateway::domain::knowledge_base::KnowledgeBaseId;
use kb_access_gateway::domain::query::{QueryPayload, RequestKind};
use kb_access_gateway::domain::sharing::PermissionLevel;
use kb_access_gateway::domain::token::{TokenRejection, TokenScope};
use kb_access_gateway::domain::DomainError;
use kb_access_gateway::infrastructure::engine::HttpEngineTransport;
use kb_access_gateway::infrastructure::services::CreateKnowledgeBaseRequest;
use kb_access_gateway::infrastructure::storage::{StorageConfig, StorageFactory};

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn kb(id: &str) -> KnowledgeBaseId {
    KnowledgeBaseId::new(id).unwrap()
}

fn ns(value: &str) -> Namespace {
    Namespace::new(value).unwrap()
}

async fn state_for(server: &MockServer) -> AppState {
    state_with(server, |_| {}).await
}

async fn state_with(server: &MockServer, tweak: impl FnOnce(&mut AppConfig)) -> AppState {
    let mut config = AppConfig::default();
    config.engine.base_url = server.uri();
    config.engine.timeout_secs = 5;
    config.engine.callback_secret = Some("callback-secret".into());
    tweak(&mut config);

    let transport = HttpEngineTransport::new(server.uri(), Duration::from_secs(5)).unwrap();
    let factory = StorageFactory::new(StorageConfig::in_memory()).await.unwrap();

    build_app_state(&config, &factory, Arc::new(transport))
        .await
        .unwrap()
}

/// Owner alice with "auto-manuals" bound to "manuals-ns"
async fn auto_manuals(state: &AppState) {
    state
        .knowledge_bases
        .create(
            CreateKnowledgeBaseRequest {
                id: Some("auto-manuals".into()),
                name: "Auto manuals".into(),
                description: Some("Workshop manuals".into()),
            },
            &user("alice"),
        )
        .await
        .unwrap();

    state
        .bindings
        .bind(&kb("auto-manuals"), ns("manuals-ns"), &user("alice"), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn grantee_queries_shared_namespace_but_cannot_share_further() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({
            "top_k": 5,
            "threshold": 0.7,
            "namespace": "manuals-ns"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": "建议每5000公里更换一次机油"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = state_for(&server).await;
    auto_manuals(&state).await;
    state
        .ledger
        .grant(&kb("auto-manuals"), &user("bob"), PermissionLevel::Query, &user("alice"))
        .await
        .unwrap();

    let token = state
        .issuer
        .issue(&user("bob"), TokenScope::Namespace(ns("manuals-ns")), PermissionLevel::Query)
        .await
        .unwrap();
    assert_eq!(token.namespace, ns("manuals-ns"));

    let payload = QueryPayload {
        query: Some("机油".into()),
        ..Default::default()
    };
    let response = state
        .router
        .route(&token.token, RequestKind::Search, &payload)
        .await
        .unwrap();
    assert_eq!(response.answer.as_deref(), Some("建议每5000公里更换一次机油"));
    assert_eq!(response.namespace, ns("manuals-ns"));

    let regrant = state
        .ledger
        .grant(&kb("auto-manuals"), &user("carol"), PermissionLevel::Read, &user("bob"))
        .await;
    assert!(matches!(regrant, Err(DomainError::Forbidden { .. })));
}

#[tokio::test]
async fn submit_without_binding_never_reaches_engine() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let state = state_for(&server).await;
    state
        .knowledge_bases
        .create(
            CreateKnowledgeBaseRequest {
                id: Some("drafts".into()),
                name: "Drafts".into(),
                description: None,
            },
            &user("alice"),
        )
        .await
        .unwrap();

    let document = state
        .orchestrator
        .register(
            &kb("drafts"),
            &user("alice"),
            NewDocument {
                name: "draft.pdf".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = state.orchestrator.submit(document.id(), &user("alice")).await;
    assert!(matches!(result, Err(DomainError::NotBound { .. })));

    let stored = state.orchestrator.get(document.id(), &user("alice")).await.unwrap();
    assert_eq!(stored.state(), DocumentState::Uploaded);
}

#[tokio::test]
async fn document_reaches_queryable_through_signed_callback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .and(body_partial_json(json!({ "namespace": "manuals-ns" })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "accepted": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let state = state_for(&server).await;
    auto_manuals(&state).await;

    let document = state
        .orchestrator
        .register(
            &kb("auto-manuals"),
            &user("alice"),
            NewDocument {
                name: "engine-oil.pdf".into(),
                source_url: Some("https://files.example.com/engine-oil.pdf".into()),
                metadata: Some(json!({ "model": "X3" })),
            },
        )
        .await
        .unwrap();

    let submitted = state.orchestrator.submit(document.id(), &user("alice")).await.unwrap();
    assert_eq!(submitted.state(), DocumentState::Vectorizing);

    let body = serde_json::to_vec(&json!({
        "document_id": document.id().as_str(),
        "status": "succeeded"
    }))
    .unwrap();
    let signature = state.callback_verifier.sign(&body).unwrap();
    assert!(state.callback_verifier.verify(&body, Some(signature.as_str())).is_ok());
    assert!(state.callback_verifier.verify(&body, Some("sha256=00")).is_err());

    let signal: CompletionSignal = serde_json::from_slice(&body).unwrap();
    assert_eq!(signal.outcome, CompletionOutcome::Succeeded);

    let outcome = state.orchestrator.handle_signal(signal.clone()).await.unwrap();
    assert_eq!(outcome, SignalOutcome::Applied(DocumentState::Queryable));
    assert_eq!(
        state.orchestrator.handle_signal(signal).await.unwrap(),
        SignalOutcome::Duplicate
    );
}

#[tokio::test]
async fn deleting_knowledge_base_cascades() {
    let server = MockServer::start().await;
    let state = state_for(&server).await;
    auto_manuals(&state).await;

    state
        .ledger
        .grant(&kb("auto-manuals"), &user("bob"), PermissionLevel::Read, &user("alice"))
        .await
        .unwrap();
    state
        .orchestrator
        .register(
            &kb("auto-manuals"),
            &user("alice"),
            NewDocument {
                name: "brakes.pdf".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let denied = state.knowledge_bases.delete(&kb("auto-manuals"), &user("bob")).await;
    assert!(matches!(denied, Err(DomainError::Forbidden { .. })));

    let summary = state
        .knowledge_bases
        .delete(&kb("auto-manuals"), &user("alice"))
        .await
        .unwrap();
    assert_eq!(summary.unbound_namespace.as_deref(), Some("manuals-ns"));
    assert_eq!(summary.grants_removed, 1);
    assert_eq!(summary.documents_removed, 1);

    assert!(matches!(
        state.knowledge_bases.get(&kb("auto-manuals"), &user("bob")).await,
        Err(DomainError::NotFound { .. })
    ));
    assert!(matches!(
        state.bindings.reverse_resolve(&ns("manuals-ns")).await,
        Err(DomainError::NotBound { .. })
    ));
    assert!(state.knowledge_bases.list_visible(&user("bob")).await.unwrap().is_empty());
}

#[tokio::test]
async fn revoked_grantee_loses_token_issuance() {
    let server = MockServer::start().await;
    let state = state_for(&server).await;
    auto_manuals(&state).await;

    let kb_id = kb("auto-manuals");
    state
        .ledger
        .grant(&kb_id, &user("bob"), PermissionLevel::Query, &user("alice"))
        .await
        .unwrap();
    state
        .ledger
        .grant(&kb_id, &user("bob"), PermissionLevel::Read, &user("alice"))
        .await
        .unwrap();

    assert_eq!(state.ledger.revoke(&kb_id, &user("bob"), &user("alice")).await.unwrap(), 2);
    assert_eq!(state.ledger.effective_level(&kb_id, &user("bob")).await.unwrap(), None);

    let result = state
        .issuer
        .issue(&user("bob"), TokenScope::KnowledgeBase(kb_id), PermissionLevel::Read)
        .await;
    assert!(matches!(result, Err(DomainError::NotFound { .. })));
}

#[tokio::test]
async fn token_expires_exactly_at_expiry() {
    let server = MockServer::start().await;
    let state = state_for(&server).await;
    auto_manuals(&state).await;

    let token = state
        .issuer
        .issue(
            &user("alice"),
            TokenScope::KnowledgeBase(kb("auto-manuals")),
            PermissionLevel::Admin,
        )
        .await
        .unwrap();
    let exp = token.expires_at.timestamp();

    let verified = state.issuer.verify_at(&token.token, exp - 1).unwrap();
    assert_eq!(verified.namespace, ns("manuals-ns"));
    assert_eq!(verified.level, PermissionLevel::Admin);

    assert_eq!(
        state.issuer.verify_at(&token.token, exp).unwrap_err(),
        TokenRejection::Expired
    );
}

#[tokio::test]
async fn query_level_token_cannot_initialize_engine() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let state = state_for(&server).await;
    auto_manuals(&state).await;
    let token = state
        .issuer
        .issue(
            &user("alice"),
            TokenScope::KnowledgeBase(kb("auto-manuals")),
            PermissionLevel::Query,
        )
        .await
        .unwrap();

    let result = state
        .router
        .route(&token.token, RequestKind::Initialize, &QueryPayload::default())
        .await;

    assert!(matches!(
        result,
        Err(DomainError::Unauthorized(TokenRejection::InsufficientLevel))
    ));
}

#[tokio::test]
async fn concurrent_identical_grants_admit_exactly_one() {
    let server = MockServer::start().await;
    let state = state_for(&server).await;
    auto_manuals(&state).await;

    let kb_id = kb("auto-manuals");
    let bob = user("bob");
    let alice = user("alice");
    let attempts = (0..8).map(|_| {
        state
            .ledger
            .grant(&kb_id, &bob, PermissionLevel::Query, &alice)
    });

    let results = join_all(attempts).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, DomainError::Conflict { .. })));
    assert_eq!(state.ledger.list_grants(&kb_id, &alice).await.unwrap().len(), 1);
}

#[tokio::test]
async fn saturated_namespace_sheds_load() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/text"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "response": "slow" }))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let state = state_with(&server, |config| {
        config.router.max_in_flight_per_namespace = 1;
        config.router.acquire_timeout_ms = 50;
    })
    .await;
    auto_manuals(&state).await;

    let token = state
        .issuer
        .issue(
            &user("alice"),
            TokenScope::KnowledgeBase(kb("auto-manuals")),
            PermissionLevel::Query,
        )
        .await
        .unwrap();
    let payload = QueryPayload {
        query: Some("brake fluid".into()),
        ..Default::default()
    };

    let (first, second) = tokio::join!(
        state.router.route(&token.token, RequestKind::Text, &payload),
        state.router.route(&token.token, RequestKind::Text, &payload),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(DomainError::Overloaded { .. }))));
}
