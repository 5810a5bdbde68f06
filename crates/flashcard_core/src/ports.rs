//! crates/flashcard_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use crate::domain::{
    Collection, GenerationOutput, NewProposal, NewStudyItem, Proposal, ProposalEdit,
    ProposalStatus, Schedule, SessionId, StudyItem,
};
use async_trait::async_trait;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Failure modes of the generation collaborator. Each one is distinguishable so the
/// boundary can offer a retry specifically for timeouts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("generation service failed: {0}")]
    Upstream(String),
    #[error("generation service returned malformed output: {0}")]
    Malformed(String),
    #[error("generation service timed out")]
    Timeout,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persistence for proposals. Every operation is scoped to an owner, and every
/// status-changing operation only touches rows that are still `pending`.
#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Inserts the whole batch as `pending` in one atomic write.
    async fn insert_batch(&self, proposals: Vec<NewProposal>) -> PortResult<Vec<Proposal>>;

    /// Pending proposals for a session, oldest first.
    async fn list_by_session(&self, owner_id: Uuid, session_id: &SessionId)
        -> PortResult<Vec<Proposal>>;

    /// Pending proposals among `ids`, oldest first. Unknown, foreign and resolved ids
    /// are simply absent from the result.
    async fn list_pending(&self, owner_id: Uuid, ids: &[Uuid]) -> PortResult<Vec<Proposal>>;

    /// Edits content fields of a pending proposal. `NotFound` if the proposal does not
    /// exist, belongs to someone else, or is no longer pending.
    async fn update(&self, owner_id: Uuid, id: Uuid, edit: ProposalEdit) -> PortResult<Proposal>;

    /// Relabels every pending proposal of a session. Returns the number of rows touched.
    async fn update_domain_for_session(
        &self,
        owner_id: Uuid,
        session_id: &SessionId,
        domain: Option<&str>,
    ) -> PortResult<u64>;

    /// Moves pending proposals to `status`. Rows that are already resolved are left
    /// alone. Returns the number of rows that actually transitioned.
    async fn bulk_set_status(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
        status: ProposalStatus,
    ) -> PortResult<u64>;

    /// Deletes the owner's pending proposals among `ids`. Resolved rows are left alone.
    async fn bulk_delete(&self, owner_id: Uuid, ids: &[Uuid]) -> PortResult<u64>;
}

#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn get_collection(&self, collection_id: Uuid) -> PortResult<Collection>;

    async fn create_collection(&self, owner_id: Uuid, name: &str) -> PortResult<Collection>;
}

#[async_trait]
pub trait StudyItemStore: Send + Sync {
    /// Inserts all items in one atomic batch; either every item exists afterwards or none.
    async fn insert_items(&self, items: Vec<NewStudyItem>) -> PortResult<Vec<StudyItem>>;

    async fn get_item(&self, item_id: Uuid) -> PortResult<StudyItem>;

    async fn list_items(&self, collection_id: Uuid) -> PortResult<Vec<StudyItem>>;

    async fn save_schedule(&self, item_id: Uuid, schedule: &Schedule) -> PortResult<StudyItem>;
}

/// Resolves an opaque caller credential to an owner identity.
#[async_trait]
pub trait AuthSessionStore: Send + Sync {
    async fn validate_auth_session(&self, token: &str) -> PortResult<Uuid>;
}

/// The external AI text-generation collaborator. Treated as untrusted: its output is
/// validated candidate by candidate by the orchestrator.
#[async_trait]
pub trait FlashcardGenerationService: Send + Sync {
    async fn generate_flashcards(
        &self,
        source_text: &str,
        domain_hint: Option<&str>,
    ) -> Result<GenerationOutput, GenerationError>;
}

/// The single query the polling protocol issues on each tick:
/// "do proposals exist for this session yet?"
#[async_trait]
pub trait SessionCheck: Send + Sync {
    async fn fetch_proposals(&self, session_id: &SessionId) -> PortResult<Vec<Proposal>>;
}
