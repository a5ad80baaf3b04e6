//! Prometheus metrics infrastructure

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::document::DocumentState;
use crate::domain::query::RequestKind;
use crate::domain::sharing::PermissionLevel;

use super::config::MetricsConfig;

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
});

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Handle to the installed recorder
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Exposition text
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Install the global Prometheus recorder
///
/// Returns `None` when disabled or when a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    let mut builder = PrometheusBuilder::new();
    let buckets = config.sanitized_buckets();
    if !buckets.is_empty() {
        builder = match builder
            .set_buckets_for_metric(Matcher::Full("kb_query_duration_seconds".to_string()), &buckets)
        {
            Ok(builder) => builder,
            Err(e) => {
                tracing::error!(error = %e, "Invalid query duration buckets");
                return None;
            }
        };
    }

    match builder.install_recorder() {
        Ok(handle) => {
            register_default_metrics();
            tracing::info!(path = %config.path, "Prometheus metrics initialized");

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize Prometheus metrics");
            None
        }
    }
}

fn register_default_metrics() {
    gauge!("kb_gateway_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Router serving the exposition text at `path`
pub fn create_metrics_router(metrics: PrometheusMetrics, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    metrics.render()
}

/// Count one HTTP request by surface, route label and status
pub fn record_http_request(
    surface: &'static str,
    method: &str,
    path: &str,
    status: u16,
    duration: Duration,
) {
    let labels = [
        ("surface", surface.to_string()),
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());

    if status >= 500 {
        counter!("http_server_errors_total", &labels).increment(1);
    }
}

/// Count a minted delegated token
pub fn record_token_issued(level: PermissionLevel) {
    counter!("kb_tokens_issued_total", "level" => level.as_str()).increment(1);
}

/// Record a query forwarded to the engine (or refused before it)
pub fn record_query_routed(kind: RequestKind, outcome: &'static str, duration: Duration) {
    let labels = [("kind", kind.as_str()), ("outcome", outcome)];

    counter!("kb_queries_total", &labels).increment(1);
    histogram!("kb_query_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Count a request shed because its namespace was saturated
pub fn record_backpressure(namespace: &str) {
    counter!("kb_queries_shed_total", "namespace" => namespace.to_string()).increment(1);
}

/// Count a document state change
pub fn record_document_transition(from: DocumentState, to: DocumentState) {
    counter!(
        "kb_document_transitions_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Collapse generated ids so labels stay low-cardinality
fn sanitize_path(path: &str) -> String {
    let path = UUID_SEGMENT.replace_all(path, "{id}");
    let path = NUMERIC_SEGMENT.replace_all(&path, "/{id}$1");

    path.chars().take(50).collect()
}
