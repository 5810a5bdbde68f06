pub mod generation;
pub mod middleware;
pub mod practice;
pub mod proposals;
pub mod protocol;
pub mod rest;
pub mod state;

pub use middleware::require_auth;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use state::AppState;

/// Source text is capped at 10000 characters; this leaves room for multi-byte text.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Builds the API router. Every route sits behind `require_auth`.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generations", post(generation::create_generation_handler))
        .route(
            "/generations/{session_id}/proposals",
            get(generation::list_session_proposals_handler),
        )
        .route(
            "/generations/{session_id}/domain",
            put(generation::update_session_domain_handler),
        )
        .route(
            "/generations/{session_id}/accept",
            post(generation::accept_session_handler),
        )
        .route("/proposals/accept", post(proposals::accept_selected_handler))
        .route("/proposals/reject", post(proposals::reject_handler))
        .route("/proposals/{id}", patch(proposals::edit_proposal_handler))
        .route("/collections/{id}/due", get(practice::due_items_handler))
        .route("/study-items/{id}/answer", post(practice::answer_handler))
        .route("/study-items/{id}/reset", post(practice::reset_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state)
}
