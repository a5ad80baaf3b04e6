//! Engine-facing v1 API: query routing and ingestion callbacks

pub mod callback;
pub mod query;

use axum::{routing::post, Router};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/query/{kind}", post(query::route_query))
        .route("/ingestion/callback", post(callback::ingestion_callback))
}
