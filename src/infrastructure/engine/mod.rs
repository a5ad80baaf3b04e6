//! External RAG engine infrastructure

mod client;
mod http_transport;

pub use client::{EngineAnswer, ExternalEngine, IngestDocument};
pub use http_transport::HttpEngineTransport;
