//! Infrastructure layer - External service implementations

pub mod auth;
pub mod engine;
pub mod locks;
pub mod logging;
pub mod observability;
pub mod services;
pub mod storage;
