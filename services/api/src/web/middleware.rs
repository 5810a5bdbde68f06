//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use flashcard_core::{PortError, ServiceError};
use std::sync::Arc;
use tracing::warn;

use crate::error::ApiFailure;
use crate::web::state::AppState;

/// Pulls the caller's credential from a `session=` cookie or a bearer token.
fn credential(headers: &HeaderMap) -> Option<&str> {
    let from_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .find_map(|c| c.trim().strip_prefix("session="))
        });

    from_cookie
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Unknown or expired credentials are a 401. A failing session store is an
/// internal error.
fn auth_failure(err: PortError) -> ApiFailure {
    match err {
        PortError::Unauthorized | PortError::NotFound(_) => {
            warn!("Rejected request with invalid credential: {}", err);
            ApiFailure(ServiceError::Unauthorized)
        }
        other => ApiFailure::from(other),
    }
}

/// Middleware that validates the caller's credential and extracts the owner id.
///
/// If valid, inserts the owner id into request extensions for handlers to use.
/// If invalid or missing, answers 401 with the error envelope before any handler runs.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = credential(req.headers()) else {
        return ApiFailure(ServiceError::Unauthorized).into_response();
    };

    let owner_id = match state.auth.validate_auth_session(token).await {
        Ok(owner_id) => owner_id,
        Err(e) => return auth_failure(e).into_response(),
    };

    req.extensions_mut().insert(owner_id);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_wins_over_bearer_and_blank_tokens_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(credential(&headers), Some("abc"));

        let mut bearer_only = HeaderMap::new();
        bearer_only.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(credential(&bearer_only), Some("xyz"));

        let mut blank = HeaderMap::new();
        blank.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(credential(&blank), None);
    }

    #[test]
    fn store_outages_are_not_reported_as_bad_credentials() {
        use flashcard_core::ErrorCode;

        assert_eq!(auth_failure(PortError::Unauthorized).0.code(), ErrorCode::Unauthorized);
        assert_eq!(
            auth_failure(PortError::NotFound("session".into())).0.code(),
            ErrorCode::Unauthorized
        );
        assert_eq!(
            auth_failure(PortError::Unexpected("connection refused".into())).0.code(),
            ErrorCode::InternalError
        );
    }
}
