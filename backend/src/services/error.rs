//! Engine error taxonomy.

use crate::db::repository::RepositoryError;
use crate::directory::DirectoryError;
use crate::models::CalendarError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors returned by [`CheckinEngine`](super::CheckinEngine) operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Invalid weekday or time zone, missing directory channel. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Directory or store unreachable or timed out.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Another run holds the resource, or the write would duplicate existing data.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored data violates a uniqueness invariant.
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("operation cancelled")]
    Cancelled,

    /// Caller is not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl EngineError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_))
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            e if e.is_unavailable() => EngineError::ProviderUnavailable(e.to_string()),
            RepositoryError::IntegrityError { .. } => EngineError::DataIntegrity(err.to_string()),
            RepositoryError::ConflictError { .. } => EngineError::Conflict(err.to_string()),
            RepositoryError::ConfigurationError { .. } => {
                EngineError::Configuration(err.to_string())
            }
            other => EngineError::Repository(other),
        }
    }
}

impl From<DirectoryError> for EngineError {
    fn from(err: DirectoryError) -> Self {
        EngineError::ProviderUnavailable(err.to_string())
    }
}

impl From<CalendarError> for EngineError {
    fn from(err: CalendarError) -> Self {
        EngineError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_errors_map_to_engine_taxonomy() {
        assert!(EngineError::from(RepositoryError::timeout("slow")).is_unavailable());
        assert!(EngineError::from(RepositoryError::connection("down")).is_unavailable());
        assert!(matches!(
            EngineError::from(RepositoryError::not_found("gone")),
            EngineError::Repository(_)
        ));
        assert!(matches!(
            EngineError::from(RepositoryError::configuration("bad")),
            EngineError::Configuration(_)
        ));
    }
}
