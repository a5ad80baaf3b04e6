//! Metrics settings

use serde::Deserialize;

/// Histogram buckets for engine round trips, in seconds
pub const DEFAULT_QUERY_BUCKETS: [f64; 9] = [0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Prometheus exporter settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Route serving the exposition text
    pub path: String,
    /// Buckets for `kb_query_duration_seconds`; empty keeps exporter summaries
    pub query_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
            query_buckets: DEFAULT_QUERY_BUCKETS.to_vec(),
        }
    }
}

impl MetricsConfig {
    /// Buckets sorted ascending with non-finite and negative bounds dropped
    pub fn sanitized_buckets(&self) -> Vec<f64> {
        let mut buckets: Vec<f64> = self
            .query_buckets
            .iter()
            .copied()
            .filter(|b| b.is_finite() && *b > 0.0)
            .collect();
        buckets.sort_by(f64::total_cmp);
        buckets.dedup();
        buckets
    }
}
