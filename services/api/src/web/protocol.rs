//! services/api/src/web/protocol.rs
//!
//! Defines the JSON request and response bodies exchanged between clients and the
//! API server, plus the conversions from core domain types.

use axum::extract::{rejection::JsonRejection, FromRequest};
use chrono::{DateTime, Utc};
use flashcard_core::domain::{Proposal, SessionId, StudyItem};
use flashcard_core::review::AcceptanceReport;
use flashcard_core::{GenerationResult, PortError, ProposalStatus, ServiceError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiFailure;

/// `Json` extractor whose rejections use the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiFailure))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiFailure {
    fn from(rejection: JsonRejection) -> Self {
        ApiFailure(ServiceError::validation_with(
            "Malformed request body",
            vec![rejection.body_text()],
        ))
    }
}

//=========================================================================================
// Requests
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema)]
pub struct GenerateRequest {
    /// Text to turn into flashcards, 100 to 10000 characters.
    pub source_text: String,
    pub domain: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UpdateDomainRequest {
    pub domain: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AcceptSessionRequest {
    pub collection_id: Uuid,
}

/// Exactly one of `collection_id` and `new_collection_name` must be set.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AcceptSelectedRequest {
    pub proposal_ids: Vec<Uuid>,
    pub collection_id: Option<Uuid>,
    pub new_collection_name: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RejectRequest {
    pub proposal_ids: Vec<Uuid>,
    #[serde(default)]
    pub delete: bool,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct EditProposalRequest {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AnswerRequest {
    pub is_correct: bool,
}

//=========================================================================================
// Responses
//=========================================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProposalDto {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub question: String,
    pub answer: String,
    pub image_url: Option<String>,
    pub domain: Option<String>,
    pub session_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Proposal> for ProposalDto {
    fn from(p: Proposal) -> Self {
        Self {
            id: p.id,
            owner_id: p.owner_id,
            question: p.question,
            answer: p.answer,
            image_url: p.image_url,
            domain: p.domain,
            session_id: p.session_id.to_string(),
            status: p.status.as_str().to_string(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Rebuilds the domain proposal on the client side of the wire.
impl TryFrom<ProposalDto> for Proposal {
    type Error = PortError;

    fn try_from(dto: ProposalDto) -> Result<Self, Self::Error> {
        let session_id = SessionId::parse(&dto.session_id)
            .ok_or_else(|| PortError::Unexpected("proposal has an invalid session id".to_string()))?;
        let status = dto
            .status
            .parse::<ProposalStatus>()
            .map_err(PortError::Unexpected)?;
        Ok(Proposal {
            id: dto.id,
            owner_id: dto.owner_id,
            question: dto.question,
            answer: dto.answer,
            image_url: dto.image_url,
            domain: dto.domain,
            session_id,
            status,
            created_at: dto.created_at,
            updated_at: dto.updated_at,
        })
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct GenerateResponse {
    pub session_id: String,
    pub proposals: Vec<ProposalDto>,
    pub detected_domain: Option<String>,
    pub count: usize,
}

impl From<GenerationResult> for GenerateResponse {
    fn from(result: GenerationResult) -> Self {
        Self {
            session_id: result.session_id.to_string(),
            proposals: result.proposals.into_iter().map(ProposalDto::from).collect(),
            detected_domain: result.detected_domain,
            count: result.count,
        }
    }
}

/// Pending proposals of a session. `ready` flips to true the moment the batch exists.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SessionProposalsResponse {
    pub session_id: String,
    pub ready: bool,
    pub proposals: Vec<ProposalDto>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UpdateDomainResponse {
    pub updated: u64,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct StudyItemDto {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub question: String,
    pub answer: String,
    pub image_url: Option<String>,
    pub status: String,
    pub due_date: DateTime<Utc>,
    pub interval: u32,
    pub consecutive_correct: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StudyItem> for StudyItemDto {
    fn from(item: StudyItem) -> Self {
        Self {
            id: item.id,
            collection_id: item.collection_id,
            question: item.question,
            answer: item.answer,
            image_url: item.image_url,
            status: item.schedule.status.as_str().to_string(),
            due_date: item.schedule.due_date,
            interval: item.schedule.interval,
            consecutive_correct: item.schedule.consecutive_correct,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AcceptanceResponse {
    pub collection_id: Uuid,
    pub accepted_count: usize,
    pub items: Vec<StudyItemDto>,
    pub skipped_ids: Vec<Uuid>,
    pub status_update_pending: bool,
}

impl From<AcceptanceReport> for AcceptanceResponse {
    fn from(report: AcceptanceReport) -> Self {
        Self {
            collection_id: report.collection_id,
            accepted_count: report.accepted_count,
            items: report.items.into_iter().map(StudyItemDto::from).collect(),
            skipped_ids: report.skipped_ids,
            status_update_pending: report.status_update_pending,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RejectResponse {
    pub affected: u64,
    pub deleted: bool,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct DueItemsResponse {
    pub collection_id: Uuid,
    pub items: Vec<StudyItemDto>,
}
