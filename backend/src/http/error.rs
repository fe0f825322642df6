//! HTTP error handling and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::repository::RepositoryError;
use crate::services::EngineError;

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Invalid request (malformed query or body)
    BadRequest(String),
    Engine(EngineError),
}

impl AppError {
    fn status_and_body(&self) -> (StatusCode, ApiError) {
        match self {
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg))
            }
            AppError::Engine(err) => {
                let msg = err.to_string();
                match err {
                    EngineError::Configuration(_) => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        ApiError::new("CONFIGURATION_ERROR", msg),
                    ),
                    EngineError::ProviderUnavailable(_) => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        ApiError::new("PROVIDER_UNAVAILABLE", msg),
                    ),
                    EngineError::Conflict(_) => {
                        (StatusCode::CONFLICT, ApiError::new("CONFLICT", msg))
                    }
                    EngineError::DataIntegrity(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiError::new("DATA_INTEGRITY", msg),
                    ),
                    EngineError::Cancelled => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        ApiError::new("CANCELLED", msg),
                    ),
                    EngineError::Forbidden(_) => {
                        (StatusCode::FORBIDDEN, ApiError::new("FORBIDDEN", msg))
                    }
                    EngineError::Repository(repo) => repository_status(repo, msg),
                }
            }
        }
    }
}

fn repository_status(err: &RepositoryError, msg: String) -> (StatusCode, ApiError) {
    let body = |code: &str| {
        let api = ApiError::new(code, msg.clone());
        match err.context().operation.as_deref() {
            Some(op) => api.with_details(format!("operation={}", op)),
            None => api,
        }
    };
    match err {
        RepositoryError::NotFound { .. } => (StatusCode::NOT_FOUND, body("NOT_FOUND")),
        RepositoryError::ValidationError { .. } => {
            (StatusCode::BAD_REQUEST, body("VALIDATION_ERROR"))
        }
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            body("REPOSITORY_ERROR"),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_body();
        (status, Json(error)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Engine(err)
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        AppError::Engine(EngineError::from(err))
    }
}
