//! Namespace binding domain
//!
//! A binding tells where a knowledge base lives in the external RAG engine.

mod entity;

pub use entity::{
    BindingAction, BindingAuditEntry, BindingAuditId, Namespace, NamespaceBinding,
    MAX_NAMESPACE_LENGTH,
};
