//! services/api/src/error.rs
//!
//! Defines the startup error type for the API service and the error envelope that
//! every handler failure is rendered into:
//! `{"error": {"code": "...", "message": "...", "details": [...]}}`.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use flashcard_core::{ErrorCode, PortError, SchedulerError, ServiceError};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

/// The primary error type for starting the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Scheduler Error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

//=========================================================================================
// Error Envelope
//=========================================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// A handler failure. Wraps the core's [`ServiceError`] so it can be turned into
/// an HTTP response.
#[derive(Debug)]
pub struct ApiFailure(pub ServiceError);

impl From<ServiceError> for ApiFailure {
    fn from(err: ServiceError) -> Self {
        ApiFailure(err)
    }
}

impl From<PortError> for ApiFailure {
    fn from(err: PortError) -> Self {
        ApiFailure(err.into())
    }
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::AiServiceError => StatusCode::BAD_GATEWAY,
        ErrorCode::AiServiceTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let code = self.0.code();
        if code == ErrorCode::InternalError {
            error!("Request failed: {}", self.0);
        }
        // Internal details stay in the logs.
        let message = match code {
            ErrorCode::InternalError => "An unexpected internal error occurred".to_string(),
            _ => self.0.to_string(),
        };
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: code.as_str().to_string(),
                message,
                details: self.0.details().to_vec(),
            },
        };
        (status_for(code), Json(body)).into_response()
    }
}

pub type HandlerResult<T> = Result<T, ApiFailure>;
