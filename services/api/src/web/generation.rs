//! services/api/src/web/generation.rs
//!
//! Handlers for generation sessions: starting a generation, polling its proposals,
//! relabelling the session and accepting it wholesale into a collection.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use flashcard_core::{ServiceError, SessionId};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiFailure, ErrorEnvelope, HandlerResult};
use crate::web::protocol::{
    AcceptSessionRequest, AcceptanceResponse, ApiJson, GenerateRequest, GenerateResponse,
    ProposalDto, SessionProposalsResponse, UpdateDomainRequest, UpdateDomainResponse,
};
use crate::web::state::AppState;

pub(crate) fn session_id_from_path(raw: &str) -> Result<SessionId, ApiFailure> {
    SessionId::parse(raw)
        .ok_or_else(|| ApiFailure(ServiceError::validation("Invalid session id")))
}

/// Generate flashcard proposals from source text.
///
/// Blocks until the model answers (bounded by the generation timeout) and returns
/// the persisted batch together with its session id.
#[utoipa::path(
    post,
    path = "/generations",
    request_body = GenerateRequest,
    responses(
        (status = 201, description = "Proposals generated", body = GenerateResponse),
        (status = 400, description = "Invalid source text or domain", body = ErrorEnvelope),
        (status = 401, description = "Missing or invalid credential", body = ErrorEnvelope),
        (status = 502, description = "The generation model failed", body = ErrorEnvelope),
        (status = 504, description = "The generation model timed out", body = ErrorEnvelope)
    ),
    tag = "Generations"
)]
pub async fn create_generation_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner_id): Extension<Uuid>,
    ApiJson(body): ApiJson<GenerateRequest>,
) -> HandlerResult<impl IntoResponse> {
    let result = state
        .orchestrator
        .generate(owner_id, &body.source_text, body.domain.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(GenerateResponse::from(result))))
}

/// List the pending proposals of a generation session.
///
/// This is the target clients poll while a generation is in flight.
#[utoipa::path(
    get,
    path = "/generations/{session_id}/proposals",
    params(("session_id" = String, Path, description = "Generation session id")),
    responses(
        (status = 200, description = "Pending proposals, oldest first", body = SessionProposalsResponse),
        (status = 401, description = "Missing or invalid credential", body = ErrorEnvelope)
    ),
    tag = "Generations"
)]
pub async fn list_session_proposals_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner_id): Extension<Uuid>,
    Path(session_id): Path<String>,
) -> HandlerResult<Json<SessionProposalsResponse>> {
    let session_id = session_id_from_path(&session_id)?;
    let proposals = state
        .proposals
        .list_by_session(owner_id, &session_id)
        .await
        .map_err(ApiFailure::from)?;

    Ok(Json(SessionProposalsResponse {
        session_id: session_id.to_string(),
        ready: !proposals.is_empty(),
        proposals: proposals.into_iter().map(ProposalDto::from).collect(),
    }))
}

/// Set (or clear) the domain label on every proposal of a session.
#[utoipa::path(
    put,
    path = "/generations/{session_id}/domain",
    params(("session_id" = String, Path, description = "Generation session id")),
    request_body = UpdateDomainRequest,
    responses(
        (status = 200, description = "Proposals relabelled", body = UpdateDomainResponse),
        (status = 400, description = "Domain too long", body = ErrorEnvelope),
        (status = 404, description = "Session has no proposals", body = ErrorEnvelope)
    ),
    tag = "Generations"
)]
pub async fn update_session_domain_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner_id): Extension<Uuid>,
    Path(session_id): Path<String>,
    ApiJson(body): ApiJson<UpdateDomainRequest>,
) -> HandlerResult<Json<UpdateDomainResponse>> {
    let session_id = session_id_from_path(&session_id)?;
    let updated = state
        .review
        .relabel_session(owner_id, &session_id, body.domain.as_deref())
        .await?;
    Ok(Json(UpdateDomainResponse { updated }))
}

/// Accept every pending proposal of a session into an existing collection.
#[utoipa::path(
    post,
    path = "/generations/{session_id}/accept",
    params(("session_id" = String, Path, description = "Generation session id")),
    request_body = AcceptSessionRequest,
    responses(
        (status = 200, description = "Proposals accepted", body = AcceptanceResponse),
        (status = 403, description = "Collection belongs to someone else", body = ErrorEnvelope),
        (status = 404, description = "Unknown collection or no pending proposals", body = ErrorEnvelope)
    ),
    tag = "Generations"
)]
pub async fn accept_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner_id): Extension<Uuid>,
    Path(session_id): Path<String>,
    ApiJson(body): ApiJson<AcceptSessionRequest>,
) -> HandlerResult<Json<AcceptanceResponse>> {
    let session_id = session_id_from_path(&session_id)?;
    let report = state
        .review
        .accept_session(owner_id, &session_id, body.collection_id)
        .await?;
    info!(
        "Session {} accepted into collection {} ({} items).",
        session_id, report.collection_id, report.accepted_count
    );
    Ok(Json(AcceptanceResponse::from(report)))
}
