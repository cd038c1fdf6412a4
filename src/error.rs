//! Crate-wide error type for query composition and relation mutations.
//!
//! A single `OrmError` enum covers the whole layer, split along the
//! taxonomy the API guarantees: contract violations (`Usage`,
//! `InvalidArgument`) fail immediately and are never retried, lookup
//! failures (`Schema`, `NotFound`) report what was missing, `Database`
//! carries collaborator failures verbatim, and `Validation` wraps an
//! aggregated [`ValidationResult`](crate::validation::ValidationResult)
//! raised by a terminal validation step.

use crate::validation::ValidationResult;
use std::fmt;

/// Error type for query composition, relation lists and validation.
#[derive(Debug, Clone, PartialEq)]
pub enum OrmError {
    /// Programming-contract violation (wrong clause on a condition group,
    /// mutating an unscoped many-many list, unsaved record where a
    /// persisted one is required, ...). Never a recoverable runtime
    /// condition.
    Usage(String),
    /// Argument outside the accepted domain (negative limit or offset).
    InvalidArgument(String),
    /// Schema metadata lookup failed (unknown entity type or field).
    Schema(String),
    /// The statement execution or persistence collaborator failed.
    Database(String),
    /// A record addressed by ID does not exist.
    NotFound { entity: String, id: String },
    /// Terminal validation step raised an invalid result.
    Validation(ValidationResult),
    /// Configuration could not be loaded.
    Config(String),
}

impl OrmError {
    /// Shorthand for a usage/contract violation.
    pub fn usage(message: impl Into<String>) -> Self {
        OrmError::Usage(message.into())
    }

    /// Shorthand for an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        OrmError::InvalidArgument(message.into())
    }

    /// Shorthand for a schema lookup failure.
    pub fn schema(message: impl Into<String>) -> Self {
        OrmError::Schema(message.into())
    }

    /// Shorthand for a collaborator failure.
    pub fn database(message: impl Into<String>) -> Self {
        OrmError::Database(message.into())
    }
}

impl fmt::Display for OrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrmError::Usage(s) => {
                write!(f, "Usage error: {s}")
            }
            OrmError::InvalidArgument(s) => {
                write!(f, "Invalid argument: {s}")
            }
            OrmError::Schema(s) => {
                write!(f, "Schema error: {s}")
            }
            OrmError::Database(s) => {
                write!(f, "Database error: {s}")
            }
            OrmError::NotFound { entity, id } => {
                write!(f, "Record not found: {entity} #{id}")
            }
            OrmError::Validation(result) => {
                write!(f, "Validation failed: {}", result.summary())
            }
            OrmError::Config(s) => {
                write!(f, "Configuration error: {s}")
            }
        }
    }
}

impl std::error::Error for OrmError {}

impl From<config::ConfigError> for OrmError {
    fn from(err: config::ConfigError) -> Self {
        OrmError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_usage() {
        let err = OrmError::usage("having() called on a WHERE group");
        assert_eq!(
            err.to_string(),
            "Usage error: having() called on a WHERE group"
        );
    }

    #[test]
    fn test_display_not_found() {
        let err = OrmError::NotFound {
            entity: "Comment".to_string(),
            id: "42".to_string(),
        };
        assert_eq!(err.to_string(), "Record not found: Comment #42");
    }

    #[test]
    fn test_variants_compare() {
        assert_eq!(
            OrmError::invalid_argument("negative limit"),
            OrmError::InvalidArgument("negative limit".to_string())
        );
        assert_ne!(
            OrmError::usage("a"),
            OrmError::database("a")
        );
    }
}
