//! Liveness and readiness probes

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::api::types::Json;

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<HealthCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub name: &'static str,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
}

impl HealthResponse {
    fn from_checks(checks: Vec<HealthCheck>, started: Instant) -> Self {
        let status = checks
            .iter()
            .map(|check| check.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
            checks,
            latency_ms: Some(started.elapsed().as_millis() as u64),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.status {
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        }
    }
}

/// Process is up
pub async fn health_check() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION"),
        checks: Vec::new(),
        latency_ms: None,
    };

    (StatusCode::OK, Json(response))
}

/// Dependencies reachable
///
/// Storage failures make the gateway unready. An unreachable engine only
/// degrades it: bindings, grants and token issuance keep working.
pub async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();

    let (storage, engine) = tokio::join!(check_storage(&state), check_engine(&state));
    let response = HealthResponse::from_checks(vec![storage, engine], started);

    (response.status_code(), Json(response))
}

pub async fn live_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn check_storage(state: &AppState) -> HealthCheck {
    let started = Instant::now();

    let (status, message) = match state.bindings.list_all().await {
        Ok(_) => (HealthStatus::Healthy, None),
        Err(e) => {
            tracing::warn!(error = %e, "Storage readiness check failed");
            (HealthStatus::Unhealthy, Some("storage unavailable".to_string()))
        }
    };

    HealthCheck {
        name: "storage",
        status,
        message,
        latency_ms: started.elapsed().as_millis() as u64,
    }
}

async fn check_engine(state: &AppState) -> HealthCheck {
    let started = Instant::now();

    let (status, message) = match state.engine.health().await {
        Ok(_) => (HealthStatus::Healthy, None),
        Err(e) => (HealthStatus::Degraded, Some(e.to_string())),
    };

    HealthCheck {
        name: "rag_engine",
        status,
        message,
        latency_ms: started.elapsed().as_millis() as u64,
    }
}
