//! services/api/src/web/proposals.rs
//!
//! Handlers that review individual proposals: editing, selective acceptance and
//! rejection.

use axum::{
    extract::{Extension, Path, State},
    response::Json,
};
use flashcard_core::{CollectionTarget, ProposalEdit, ServiceError};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ErrorEnvelope, HandlerResult};
use crate::web::protocol::{
    AcceptSelectedRequest, AcceptanceResponse, ApiJson, EditProposalRequest, ProposalDto,
    RejectRequest, RejectResponse,
};
use crate::web::state::AppState;

/// Edit the question, answer or image of a pending proposal.
#[utoipa::path(
    patch,
    path = "/proposals/{id}",
    params(("id" = Uuid, Path, description = "Proposal id")),
    request_body = EditProposalRequest,
    responses(
        (status = 200, description = "Updated proposal", body = ProposalDto),
        (status = 400, description = "Edit violates the length rules", body = ErrorEnvelope),
        (status = 404, description = "No such pending proposal", body = ErrorEnvelope)
    ),
    tag = "Proposals"
)]
pub async fn edit_proposal_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<EditProposalRequest>,
) -> HandlerResult<Json<ProposalDto>> {
    let edit = ProposalEdit {
        question: body.question,
        answer: body.answer,
        image_url: body.image_url,
    };
    let updated = state.review.edit(owner_id, id, edit).await?;
    Ok(Json(updated.into()))
}

/// Accept selected proposals into an existing collection or a new one.
///
/// Ids that are no longer pending are skipped and echoed back in `skipped_ids`.
#[utoipa::path(
    post,
    path = "/proposals/accept",
    request_body = AcceptSelectedRequest,
    responses(
        (status = 200, description = "Proposals accepted", body = AcceptanceResponse),
        (status = 400, description = "No ids, or not exactly one collection target", body = ErrorEnvelope),
        (status = 403, description = "Collection belongs to someone else", body = ErrorEnvelope),
        (status = 404, description = "Nothing selected is pending", body = ErrorEnvelope)
    ),
    tag = "Proposals"
)]
pub async fn accept_selected_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner_id): Extension<Uuid>,
    ApiJson(body): ApiJson<AcceptSelectedRequest>,
) -> HandlerResult<Json<AcceptanceResponse>> {
    let target = match (body.collection_id, body.new_collection_name) {
        (Some(id), None) => CollectionTarget::Existing(id),
        (None, Some(name)) => CollectionTarget::New { name },
        _ => {
            return Err(ServiceError::validation(
                "Provide exactly one of collection_id and new_collection_name",
            )
            .into())
        }
    };
    let report = state
        .review
        .accept_selected(owner_id, &body.proposal_ids, target)
        .await?;
    Ok(Json(report.into()))
}

/// Reject proposals, either marking them rejected or deleting them outright.
#[utoipa::path(
    post,
    path = "/proposals/reject",
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Proposals rejected", body = RejectResponse),
        (status = 401, description = "Missing or invalid credential", body = ErrorEnvelope)
    ),
    tag = "Proposals"
)]
pub async fn reject_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner_id): Extension<Uuid>,
    ApiJson(body): ApiJson<RejectRequest>,
) -> HandlerResult<Json<RejectResponse>> {
    let report = state
        .review
        .reject(owner_id, &body.proposal_ids, body.delete)
        .await?;
    Ok(Json(RejectResponse {
        affected: report.affected,
        deleted: report.deleted,
    }))
}
