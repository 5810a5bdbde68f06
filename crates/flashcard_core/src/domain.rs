//! crates/flashcard_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Content Bounds
//=========================================================================================

/// Inclusive character bounds for submitted source text.
pub const SOURCE_TEXT_MIN_CHARS: usize = 100;
pub const SOURCE_TEXT_MAX_CHARS: usize = 10_000;

/// Inclusive character bounds for a proposal's question.
pub const QUESTION_MIN_CHARS: usize = 50;
pub const QUESTION_MAX_CHARS: usize = 10_000;

/// Inclusive character bounds for a proposal's answer.
pub const ANSWER_MIN_CHARS: usize = 1;
pub const ANSWER_MAX_CHARS: usize = 500;

pub const DOMAIN_MAX_CHARS: usize = 100;
pub const COLLECTION_NAME_MAX_CHARS: usize = 100;

const SESSION_ID_MAX_CHARS: usize = 128;

/// Number of leading characters of the source text mixed into a session id.
const SESSION_TEXT_FRAGMENT_CHARS: usize = 100;

/// Returns true if `text` has between `min` and `max` characters (inclusive).
pub fn char_len_within(text: &str, min: usize, max: usize) -> bool {
    let len = text.chars().count();
    len >= min && len <= max
}

//=========================================================================================
// Generation Session
//=========================================================================================

/// Opaque key grouping the proposals produced by one generation call.
///
/// There is no session row; the id is only ever stored as a tag on proposals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Derives a fresh session id from the call's timestamp, owner, a random nonce
    /// and the leading fragment of the submitted text.
    pub fn generate(owner_id: Uuid, source_text: &str, now: DateTime<Utc>) -> Self {
        let fragment: String = source_text.chars().take(SESSION_TEXT_FRAGMENT_CHARS).collect();
        let nonce = Uuid::new_v4();

        let mut hasher = blake3::Hasher::new();
        hasher.update(&now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        hasher.update(owner_id.as_bytes());
        hasher.update(nonce.as_bytes());
        hasher.update(fragment.as_bytes());

        Self(format!("gen_{}", hasher.finalize().to_hex()))
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().count() > SESSION_ID_MAX_CHARS {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//=========================================================================================
// Proposals
//=========================================================================================

/// Review state of a proposal. `Accepted` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalStatus::Pending)
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProposalStatus::Pending),
            "accepted" => Ok(ProposalStatus::Accepted),
            "rejected" => Ok(ProposalStatus::Rejected),
            other => Err(format!("unknown proposal status '{}'", other)),
        }
    }
}

/// An AI-generated question/answer draft awaiting review.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub question: String,
    pub answer: String,
    pub image_url: Option<String>,
    pub domain: Option<String>,
    pub session_id: SessionId,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A proposal that has passed validation but has not been persisted yet.
/// Stores always insert these as `pending`.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub owner_id: Uuid,
    pub question: String,
    pub answer: String,
    pub image_url: Option<String>,
    pub domain: Option<String>,
    pub session_id: SessionId,
}

/// Content fields a reviewer may change while a proposal is still pending.
#[derive(Debug, Clone, Default)]
pub struct ProposalEdit {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub image_url: Option<String>,
}

impl ProposalEdit {
    pub fn is_empty(&self) -> bool {
        self.question.is_none() && self.answer.is_none() && self.image_url.is_none()
    }
}

//=========================================================================================
// Generation Collaborator Boundary
//=========================================================================================

/// One raw question/answer pair as returned by the generation collaborator.
/// Nothing about it is trusted until the orchestrator has validated it.
#[derive(Debug, Clone, Default)]
pub struct GenerationCandidate {
    pub question: String,
    pub answer: String,
    pub domain: Option<String>,
}

/// The parsed output of a single generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    pub candidates: Vec<GenerationCandidate>,
    pub detected_domain: Option<String>,
}

/// What the orchestrator hands back after a successful generation call.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub session_id: SessionId,
    pub proposals: Vec<Proposal>,
    pub detected_domain: Option<String>,
    pub count: usize,
}

//=========================================================================================
// Collections and Study Items
//=========================================================================================

/// The grouping container (deck) for study items. Owned by exactly one user.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Where accepted proposals should land.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionTarget {
    Existing(Uuid),
    New { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StudyStatus {
    Learning,
    Mastered,
}

impl StudyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyStatus::Learning => "learning",
            StudyStatus::Mastered => "mastered",
        }
    }
}

impl FromStr for StudyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learning" => Ok(StudyStatus::Learning),
            "mastered" => Ok(StudyStatus::Mastered),
            other => Err(format!("unknown study status '{}'", other)),
        }
    }
}

/// The scheduling state of a study item. `due_date` and `interval` always travel
/// together; the scheduler is the only thing that produces new values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub status: StudyStatus,
    pub due_date: DateTime<Utc>,
    /// Interval in days.
    pub interval: u32,
    pub consecutive_correct: u32,
}

/// A committed, reviewable question/answer pair inside a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyItem {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub question: String,
    pub answer: String,
    pub image_url: Option<String>,
    pub schedule: Schedule,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStudyItem {
    pub collection_id: Uuid,
    pub question: String,
    pub answer: String,
    pub image_url: Option<String>,
    pub schedule: Schedule,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_do_not_collide_for_identical_input() {
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let text = "a".repeat(150);

        let first = SessionId::generate(owner, &text, now);
        let second = SessionId::generate(owner, &text, now);

        assert_ne!(first, second);
        assert!(first.as_str().starts_with("gen_"));
    }

    #[test]
    fn session_id_parse_rejects_blank_and_oversized() {
        assert!(SessionId::parse("   ").is_none());
        assert!(SessionId::parse(&"x".repeat(129)).is_none());
        assert_eq!(SessionId::parse(" gen_abc ").unwrap().as_str(), "gen_abc");
    }

    #[test]
    fn char_bounds_count_characters_not_bytes() {
        // Four multi-byte characters.
        assert!(char_len_within("éééé", 4, 4));
        assert!(!char_len_within("", 1, 500));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            ProposalStatus::Pending,
            ProposalStatus::Accepted,
            ProposalStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<ProposalStatus>().unwrap(), status);
        }
        assert!("archived".parse::<StudyStatus>().is_err());
    }
}
