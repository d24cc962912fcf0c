//! Error taxonomy of the registry control plane.
//!
//! Callers pattern-match on [`RegistryError`] to pick a recovery:
//! retry the whole cycle on `VersionConflict`, report everything else.

use thiserror::Error;

use crate::repository::VersionToken;
use crate::resources::{ResourceCategory, ResourceMetadata};
use crate::storage::StoreError;

/// A structural or referential problem with one submitted item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category} `{key}`: {reason}")]
pub struct ValidationError {
    pub category: ResourceCategory,
    pub key: ResourceMetadata,
    pub reason: String,
}

impl ValidationError {
    pub fn new(category: ResourceCategory, key: &ResourceMetadata, reason: impl Into<String>) -> Self {
        Self {
            category,
            key: key.clone(),
            reason: reason.into(),
        }
    }
}

/// Schema parse or merge failure, naming the offending source(s).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("failed to parse schema from source `{source_name}`: {diagnostic}")]
    Parse {
        source_name: String,
        diagnostic: String,
    },

    #[error("`{definition}` is defined differently by sources `{first_source}` and `{second_source}`")]
    Conflict {
        definition: String,
        first_source: String,
        second_source: String,
    },

    #[error("source `{source_name}` extends `{type_name}`, which is not defined as a compatible type")]
    InvalidExtension {
        source_name: String,
        type_name: String,
    },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("policy `{metadata}` failed to compile: {message}")]
    Compile {
        metadata: ResourceMetadata,
        message: String,
    },

    #[error("version conflict: the aggregate moved past version {expected}")]
    VersionConflict { expected: VersionToken },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The task running the update was cancelled, e.g. by runtime shutdown.
    #[error("update was interrupted before it finished")]
    Interrupted,
}

impl RegistryError {
    /// Stable name of the error kind, used in HTTP bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::Validation(_) => "ValidationError",
            RegistryError::Schema(_) => "SchemaError",
            RegistryError::Compile { .. } => "CompileError",
            RegistryError::VersionConflict { .. } => "VersionConflict",
            RegistryError::Storage(_) => "StorageError",
            RegistryError::Interrupted => "Interrupted",
        }
    }
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_item() {
        let err = RegistryError::Validation(vec![
            ValidationError::new(ResourceCategory::Schema, &ResourceMetadata::new("a", "b"), "duplicate key"),
            ValidationError::new(ResourceCategory::Policy, &ResourceMetadata::new("c", "d"), "unknown policy `x`"),
        ]);
        let message = err.to_string();
        assert!(message.contains("schema `a/b`: duplicate key"));
        assert!(message.contains("policy `c/d`: unknown policy `x`"));
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn test_schema_conflict_names_both_sources() {
        let err = SchemaError::Conflict {
            definition: "User".into(),
            first_source: "a/one".into(),
            second_source: "b/two".into(),
        };
        let message = err.to_string();
        assert!(message.contains("a/one") && message.contains("b/two"));
    }
}
