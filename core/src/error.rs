use thiserror::Error;

/// Coarse classification of a [`QueryError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Schema,
    NotFound,
    ConstraintViolation,
    RelationIntegrity,
    TransactionAborted,
    BackendUnavailable,
    Backend,
}

#[derive(Debug, Error)]
pub enum QueryError {
    /// Malformed descriptor, raised before any backend call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Inconsistent schema definition, or a registry lookup of an unknown model.
    /// Descriptors naming an unknown model fail with `Validation`.
    #[error("Schema error: {0}")]
    Schema(String),

    /// An `*OrThrow` operation, or a write addressed by unique key, found no row
    #[error("No {model} record found")]
    NotFound { model: String },

    /// A unique or compound-unique constraint would be violated
    #[error("Unique constraint `{constraint}` failed on {model} ({fields})")]
    ConstraintViolation {
        model: String,
        constraint: String,
        fields: String,
    },

    /// A required relation is unset or a referenced row does not exist
    #[error("Relation integrity error on {model}.{relation}: {message}")]
    RelationIntegrity {
        model: String,
        relation: String,
        message: String,
    },

    /// Timeout, explicit rollback or a failed operation inside a transaction
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    /// The backend could not be reached; the only retryable kind
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Any other backend failure, passed through unchanged
    #[error("Backend error: {0}")]
    Backend(String),
}

impl QueryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(model: impl Into<String>) -> Self {
        Self::NotFound {
            model: model.into(),
        }
    }

    pub fn relation_integrity(
        model: impl Into<String>,
        relation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RelationIntegrity {
            model: model.into(),
            relation: relation.into(),
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Schema(_) => ErrorKind::Schema,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            Self::RelationIntegrity { .. } => ErrorKind::RelationIntegrity,
            Self::TransactionAborted(_) => ErrorKind::TransactionAborted,
            Self::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            Self::Backend(_) => ErrorKind::Backend,
        }
    }

    /// Only `BackendUnavailable` may be retried by the caller
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_backend_unavailable_is_retryable() {
        assert!(QueryError::BackendUnavailable("down".into()).is_retryable());
        assert!(!QueryError::Backend("boom".into()).is_retryable());
        assert!(!QueryError::not_found("Account").is_retryable());
        assert!(!QueryError::validation("bad").is_retryable());
    }

    #[test]
    fn display_names_the_constraint() {
        let err = QueryError::ConstraintViolation {
            model: "Account".into(),
            constraint: "username".into(),
            fields: "username".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unique constraint `username` failed on Account (username)"
        );
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }
}
