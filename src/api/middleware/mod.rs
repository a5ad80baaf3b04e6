//! API middleware components

pub mod auth;
pub mod logging;
pub mod metrics;

pub use auth::{extract_bearer_token, CallerIdentity, DelegatedBearer, USER_ID_HEADER};
pub use logging::logging_middleware;
pub use metrics::metrics_middleware;
