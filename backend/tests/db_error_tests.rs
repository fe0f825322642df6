//! Tests for db::repository::error - error construction, context and classification.

use checkin_backend::db::repository::{ErrorContext, RepositoryError};
use checkin_backend::services::EngineError;

#[test]
fn test_error_context_display() {
    let ctx = ErrorContext::new("create_user")
        .with_entity("user")
        .with_entity_id(42)
        .with_details("duplicate identity")
        .retryable();

    let display = ctx.to_string();
    assert!(display.contains("operation=create_user"));
    assert!(display.contains("entity=user"));
    assert!(display.contains("id=42"));
    assert!(display.contains("details=duplicate identity"));
    assert!(display.contains("retryable=true"));
}

#[test]
fn test_empty_context_display() {
    assert_eq!(ErrorContext::default().to_string(), "[]");
}

#[test]
fn test_connection_and_timeout_are_retryable() {
    assert!(RepositoryError::connection("down").is_retryable());
    assert!(RepositoryError::timeout("slow").is_retryable());
    assert!(!RepositoryError::validation("bad").is_retryable());
    assert!(!RepositoryError::not_found("gone").is_retryable());
}

#[test]
fn test_unavailable_classification() {
    assert!(RepositoryError::connection("down").is_unavailable());
    assert!(RepositoryError::timeout("slow").is_unavailable());
    assert!(!RepositoryError::query("syntax").is_unavailable());
    assert!(!RepositoryError::internal("bug").is_unavailable());
}

#[test]
fn test_with_operation_overrides_context() {
    let err = RepositoryError::not_found("user 9").with_operation("get_user");
    assert_eq!(err.context().operation.as_deref(), Some("get_user"));
    assert!(err.is_not_found());
    assert!(err.to_string().contains("operation=get_user"));
}

#[test]
fn test_engine_error_mapping() {
    let unavailable: EngineError = RepositoryError::connection("down").into();
    assert!(matches!(unavailable, EngineError::ProviderUnavailable(_)));

    let integrity: EngineError = RepositoryError::integrity_with_context(
        "two check-ins",
        ErrorContext::new("find_by_user_and_period"),
    )
    .into();
    assert!(matches!(integrity, EngineError::DataIntegrity(_)));

    let conflict: EngineError =
        RepositoryError::conflict_with_context("duplicate", ErrorContext::new("create_checkin"))
            .into();
    assert!(matches!(conflict, EngineError::Conflict(_)));

    let config: EngineError = RepositoryError::configuration("no url").into();
    assert!(matches!(config, EngineError::Configuration(_)));

    let other: EngineError = RepositoryError::not_found("user 1").into();
    assert!(matches!(other, EngineError::Repository(ref e) if e.is_not_found()));
}
