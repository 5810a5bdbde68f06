//! crates/flashcard_core/src/generation.rs
//!
//! The generation session orchestrator: validates a text submission, calls the
//! generation collaborator under a deadline, filters its candidates and persists the
//! survivors as one batch of pending proposals tagged with a fresh session id.

use crate::domain::{
    char_len_within, GenerationCandidate, GenerationOutput, GenerationResult, NewProposal,
    SessionId, ANSWER_MAX_CHARS, ANSWER_MIN_CHARS, DOMAIN_MAX_CHARS, QUESTION_MAX_CHARS,
    QUESTION_MIN_CHARS, SOURCE_TEXT_MAX_CHARS, SOURCE_TEXT_MIN_CHARS,
};
use crate::error::{ServiceError, ServiceResult};
use crate::ports::{FlashcardGenerationService, GenerationError, ProposalStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GenerationOrchestrator {
    generator: Arc<dyn FlashcardGenerationService>,
    proposals: Arc<dyn ProposalStore>,
    timeout: Duration,
}

impl GenerationOrchestrator {
    pub fn new(
        generator: Arc<dyn FlashcardGenerationService>,
        proposals: Arc<dyn ProposalStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            proposals,
            timeout,
        }
    }

    /// Runs one generation call end to end. Nothing is persisted unless at least one
    /// candidate survives validation, and then everything is persisted in one batch.
    pub async fn generate(
        &self,
        owner_id: Uuid,
        source_text: &str,
        domain: Option<&str>,
    ) -> ServiceResult<GenerationResult> {
        validate_source(source_text, domain)?;
        let domain = domain.map(str::trim).filter(|d| !d.is_empty());

        let session_id = SessionId::generate(owner_id, source_text, Utc::now());
        info!(
            "Starting generation session {} for owner {} ({} chars).",
            session_id,
            owner_id,
            source_text.chars().count()
        );

        let output = self.call_generator(source_text, domain).await?;
        let detected_domain = output
            .detected_domain
            .clone()
            .or_else(|| domain.map(str::to_string));
        let drafts = build_proposals(owner_id, &session_id, domain, output);
        if drafts.is_empty() {
            warn!(
                "Generation session {} produced no usable candidates.",
                session_id
            );
            return Err(ServiceError::validation(
                "The generated content contained no usable flashcards",
            ));
        }

        let proposals = self.proposals.insert_batch(drafts).await.map_err(|e| {
            error!(
                "Failed to persist proposals for session {}: {:?}",
                session_id, e
            );
            ServiceError::Internal("Failed to save generated proposals".to_string())
        })?;

        info!(
            "Generation session {} stored {} proposals.",
            session_id,
            proposals.len()
        );
        Ok(GenerationResult {
            count: proposals.len(),
            session_id,
            proposals,
            detected_domain,
        })
    }

    async fn call_generator(
        &self,
        source_text: &str,
        domain: Option<&str>,
    ) -> ServiceResult<GenerationOutput> {
        let call = self.generator.generate_flashcards(source_text, domain);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(GenerationError::Timeout)) | Err(_) => {
                error!("Generation collaborator exceeded {:?}.", self.timeout);
                Err(ServiceError::AiServiceTimeout(format!(
                    "No response within {} seconds",
                    self.timeout.as_secs()
                )))
            }
            Ok(Err(GenerationError::Malformed(detail))) => {
                error!("Generation collaborator returned malformed output: {}", detail);
                Err(ServiceError::AiService(
                    "The AI service returned an unreadable response".to_string(),
                ))
            }
            Ok(Err(GenerationError::Upstream(detail))) => {
                error!("Generation collaborator failed: {}", detail);
                Err(ServiceError::AiService(
                    "The AI service could not generate flashcards".to_string(),
                ))
            }
        }
    }
}

/// Rejects source text and domain hints outside their bounds before any work happens.
pub fn validate_source(source_text: &str, domain: Option<&str>) -> ServiceResult<()> {
    let mut details = Vec::new();
    let len = source_text.chars().count();
    if len < SOURCE_TEXT_MIN_CHARS {
        details.push(format!(
            "source text must be at least {} characters (got {})",
            SOURCE_TEXT_MIN_CHARS, len
        ));
    } else if len > SOURCE_TEXT_MAX_CHARS {
        details.push(format!(
            "source text must be at most {} characters (got {})",
            SOURCE_TEXT_MAX_CHARS, len
        ));
    }
    if let Some(domain) = domain {
        if domain.chars().count() > DOMAIN_MAX_CHARS {
            details.push(format!(
                "domain must be at most {} characters",
                DOMAIN_MAX_CHARS
            ));
        }
    }

    if details.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::validation_with("Invalid generation request", details))
    }
}

/// Trims a candidate and checks its bounds. `None` means the candidate is dropped.
fn normalize_candidate(candidate: GenerationCandidate) -> Option<GenerationCandidate> {
    let question = candidate.question.trim();
    let answer = candidate.answer.trim();
    if !char_len_within(question, QUESTION_MIN_CHARS, QUESTION_MAX_CHARS)
        || !char_len_within(answer, ANSWER_MIN_CHARS, ANSWER_MAX_CHARS)
    {
        return None;
    }
    Some(GenerationCandidate {
        question: question.to_string(),
        answer: answer.to_string(),
        domain: candidate.domain,
    })
}

fn usable_domain(domain: Option<String>) -> Option<String> {
    domain
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty() && d.chars().count() <= DOMAIN_MAX_CHARS)
}

fn build_proposals(
    owner_id: Uuid,
    session_id: &SessionId,
    requested_domain: Option<&str>,
    output: GenerationOutput,
) -> Vec<NewProposal> {
    let total = output.candidates.len();
    let drafts: Vec<NewProposal> = output
        .candidates
        .into_iter()
        .filter_map(normalize_candidate)
        .map(|candidate| {
            let domain = requested_domain
                .map(str::to_string)
                .or_else(|| usable_domain(candidate.domain))
                .or_else(|| usable_domain(output.detected_domain.clone()));
            NewProposal {
                owner_id,
                question: candidate.question,
                answer: candidate.answer,
                image_url: None,
                domain,
                session_id: session_id.clone(),
            }
        })
        .collect();

    if drafts.len() < total {
        warn!(
            "Dropped {} of {} candidates in session {} that failed validation.",
            total - drafts.len(),
            total,
            session_id
        );
    }
    drafts
}
