//! Observability infrastructure - Prometheus metrics

mod config;
mod metrics;

pub use config::{MetricsConfig, DEFAULT_QUERY_BUCKETS};
pub use metrics::{
    create_metrics_router, init_metrics, record_backpressure, record_document_transition,
    record_http_request, record_query_routed, record_token_issued, PrometheusMetrics,
};
