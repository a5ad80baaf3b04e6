//! Knowledge base domain module

mod entity;
mod validation;

pub use entity::{KnowledgeBase, KnowledgeBaseId, KnowledgeBaseView};
pub use validation::{
    validate_knowledge_base_description, validate_knowledge_base_id,
    validate_knowledge_base_name, KnowledgeBaseValidationError, MAX_KB_ID_LENGTH,
};

use crate::domain::DomainError;

impl From<KnowledgeBaseValidationError> for DomainError {
    fn from(err: KnowledgeBaseValidationError) -> Self {
        if err.is_id_error() {
            DomainError::invalid_id(err.to_string())
        } else {
            DomainError::validation(err.to_string())
        }
    }
}
