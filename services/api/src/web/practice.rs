//! services/api/src/web/practice.rs

use axum::{
    extract::{Extension, Path, State},
    response::Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ErrorEnvelope, HandlerResult};
use crate::web::protocol::{AnswerRequest, ApiJson, DueItemsResponse, StudyItemDto};
use crate::web::state::AppState;

/// Study items of a collection that are due now, most overdue first.
#[utoipa::path(
    get,
    path = "/collections/{id}/due",
    params(("id" = Uuid, Path, description = "Collection id")),
    responses(
        (status = 200, description = "Due items", body = DueItemsResponse),
        (status = 403, description = "Collection belongs to someone else", body = ErrorEnvelope),
        (status = 404, description = "Unknown collection", body = ErrorEnvelope)
    ),
    tag = "Practice"
)]
pub async fn due_items_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner_id): Extension<Uuid>,
    Path(collection_id): Path<Uuid>,
) -> HandlerResult<Json<DueItemsResponse>> {
    let items = state
        .practice
        .due_items(owner_id, collection_id, Utc::now())
        .await?;
    Ok(Json(DueItemsResponse {
        collection_id,
        items: items.into_iter().map(StudyItemDto::from).collect(),
    }))
}

/// Record a practice answer and reschedule the item.
#[utoipa::path(
    post,
    path = "/study-items/{id}/answer",
    params(("id" = Uuid, Path, description = "Study item id")),
    request_body = AnswerRequest,
    responses(
        (status = 200, description = "Rescheduled item", body = StudyItemDto),
        (status = 403, description = "Item belongs to someone else", body = ErrorEnvelope),
        (status = 404, description = "Unknown item", body = ErrorEnvelope)
    ),
    tag = "Practice"
)]
pub async fn answer_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner_id): Extension<Uuid>,
    Path(item_id): Path<Uuid>,
    ApiJson(body): ApiJson<AnswerRequest>,
) -> HandlerResult<Json<StudyItemDto>> {
    let item = state
        .practice
        .answer(owner_id, item_id, body.is_correct, Utc::now())
        .await?;
    Ok(Json(item.into()))
}

/// Send an item back to learning, due immediately.
#[utoipa::path(
    post,
    path = "/study-items/{id}/reset",
    params(("id" = Uuid, Path, description = "Study item id")),
    responses(
        (status = 200, description = "Reset item", body = StudyItemDto),
        (status = 404, description = "Unknown item", body = ErrorEnvelope)
    ),
    tag = "Practice"
)]
pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner_id): Extension<Uuid>,
    Path(item_id): Path<Uuid>,
) -> HandlerResult<Json<StudyItemDto>> {
    let item = state.practice.reset(owner_id, item_id, Utc::now()).await?;
    Ok(Json(item.into()))
}
