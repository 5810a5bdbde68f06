//! crates/flashcard_core/src/error.rs
//!
//! The error type every workflow in the core returns. Each variant maps to one
//! stable, machine-readable code that the HTTP layer puts on the wire.

use crate::ports::PortError;
use std::fmt;

/// Stable error codes exposed at the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidationError,
    Unauthorized,
    Forbidden,
    NotFound,
    AiServiceError,
    AiServiceTimeout,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AiServiceError => "AI_SERVICE_ERROR",
            ErrorCode::AiServiceTimeout => "AI_SERVICE_TIMEOUT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Only timeouts get a retry affordance; hard failures do not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::AiServiceTimeout)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<String>,
    },
    #[error("Authentication is required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("AI service error: {0}")]
    AiService(String),
    #[error("AI service timed out: {0}")]
    AiServiceTimeout(String),
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn validation_with(message: impl Into<String>, details: Vec<String>) -> Self {
        ServiceError::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::Validation { .. } => ErrorCode::ValidationError,
            ServiceError::Unauthorized => ErrorCode::Unauthorized,
            ServiceError::Forbidden(_) => ErrorCode::Forbidden,
            ServiceError::NotFound(_) => ErrorCode::NotFound,
            ServiceError::AiService(_) => ErrorCode::AiServiceError,
            ServiceError::AiServiceTimeout(_) => ErrorCode::AiServiceTimeout,
            ServiceError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn details(&self) -> &[String] {
        match self {
            ServiceError::Validation { details, .. } => details,
            _ => &[],
        }
    }
}

impl From<PortError> for ServiceError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => ServiceError::NotFound(what),
            PortError::Unauthorized => ServiceError::Unauthorized,
            PortError::Conflict(msg) | PortError::Unexpected(msg) => ServiceError::Internal(msg),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_errors_map_to_boundary_codes() {
        let not_found: ServiceError = PortError::NotFound("collection".into()).into();
        assert_eq!(not_found.code(), ErrorCode::NotFound);

        let conflict: ServiceError = PortError::Conflict("duplicate".into()).into();
        assert_eq!(conflict.code(), ErrorCode::InternalError);
    }

    #[test]
    fn only_timeouts_are_retryable() {
        assert!(ServiceError::AiServiceTimeout("30s".into()).code().is_retryable());
        assert!(!ServiceError::AiService("boom".into()).code().is_retryable());
    }
}
