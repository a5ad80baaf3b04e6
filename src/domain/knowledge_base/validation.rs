//! Knowledge base field rules

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub const MAX_KB_ID_LENGTH: usize = 50;

/// Counted in characters so CJK names get the same room as Latin ones
pub const MAX_KB_NAME_LENGTH: usize = 200;

pub const MAX_KB_DESCRIPTION_LENGTH: usize = 2000;

/// Alphanumerics and inner hyphens; ids are embedded in composite storage keys
static KB_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KnowledgeBaseValidationError {
    #[error("Knowledge base ID cannot be empty")]
    EmptyId,

    #[error("Knowledge base ID too long: {length} characters (max {max})")]
    IdTooLong { length: usize, max: usize },

    #[error("Invalid knowledge base ID '{id}': use letters, digits and inner hyphens")]
    InvalidIdFormat { id: String },

    #[error("Knowledge base name cannot be empty")]
    EmptyName,

    #[error("Knowledge base name too long: {length} characters (max {max})")]
    NameTooLong { length: usize, max: usize },

    #[error("Knowledge base description too long: {length} characters (max {max})")]
    DescriptionTooLong { length: usize, max: usize },
}

impl KnowledgeBaseValidationError {
    /// True when the problem is the identifier rather than a field value
    pub fn is_id_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyId | Self::IdTooLong { .. } | Self::InvalidIdFormat { .. }
        )
    }
}

pub fn validate_knowledge_base_id(id: &str) -> Result<(), KnowledgeBaseValidationError> {
    if id.is_empty() {
        return Err(KnowledgeBaseValidationError::EmptyId);
    }

    if id.len() > MAX_KB_ID_LENGTH {
        return Err(KnowledgeBaseValidationError::IdTooLong {
            length: id.len(),
            max: MAX_KB_ID_LENGTH,
        });
    }

    if !KB_ID_PATTERN.is_match(id) {
        return Err(KnowledgeBaseValidationError::InvalidIdFormat { id: id.to_string() });
    }

    Ok(())
}

pub fn validate_knowledge_base_name(name: &str) -> Result<(), KnowledgeBaseValidationError> {
    if name.trim().is_empty() {
        return Err(KnowledgeBaseValidationError::EmptyName);
    }

    check_length(name, MAX_KB_NAME_LENGTH)
        .map_err(|(length, max)| KnowledgeBaseValidationError::NameTooLong { length, max })
}

pub fn validate_knowledge_base_description(
    description: &str,
) -> Result<(), KnowledgeBaseValidationError> {
    check_length(description, MAX_KB_DESCRIPTION_LENGTH)
        .map_err(|(length, max)| KnowledgeBaseValidationError::DescriptionTooLong { length, max })
}

fn check_length(value: &str, max: usize) -> Result<(), (usize, usize)> {
    let length = value.chars().count();
    if length > max {
        Err((length, max))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(validate_knowledge_base_id("a").is_ok());
        assert!(validate_knowledge_base_id("auto-manuals").is_ok());
        assert!(validate_knowledge_base_id("kb-6f1c2d9e").is_ok());
    }

    #[test]
    fn test_invalid_ids() {
        assert_eq!(
            validate_knowledge_base_id(""),
            Err(KnowledgeBaseValidationError::EmptyId)
        );
        assert!(matches!(
            validate_knowledge_base_id("-leading"),
            Err(KnowledgeBaseValidationError::InvalidIdFormat { .. })
        ));
        assert!(matches!(
            validate_knowledge_base_id("trailing-"),
            Err(KnowledgeBaseValidationError::InvalidIdFormat { .. })
        ));
        assert!(matches!(
            validate_knowledge_base_id("has/slash"),
            Err(KnowledgeBaseValidationError::InvalidIdFormat { .. })
        ));
        assert!(matches!(
            validate_knowledge_base_id(&"a".repeat(51)),
            Err(KnowledgeBaseValidationError::IdTooLong { .. })
        ));
    }

    #[test]
    fn test_name_counts_characters_not_bytes() {
        let name = "汽".repeat(MAX_KB_NAME_LENGTH);
        assert!(validate_knowledge_base_name(&name).is_ok());
        assert!(validate_knowledge_base_name(&format!("{}车", name)).is_err());
        assert_eq!(
            validate_knowledge_base_name("   "),
            Err(KnowledgeBaseValidationError::EmptyName)
        );
    }

    #[test]
    fn test_id_errors_are_classified() {
        assert!(KnowledgeBaseValidationError::EmptyId.is_id_error());
        assert!(!KnowledgeBaseValidationError::EmptyName.is_id_error());
    }
}
