//! services/api/src/adapters/generation_llm.rs
//!
//! This module contains the adapter for the flashcard-generating LLM.
//! It implements the `FlashcardGenerationService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = r#"You are a study assistant that turns source material into flashcards.

Write question/answer pairs that test understanding of the material, not trivia about its wording.

Rules:
- Each question must be a complete, self-contained question of at least 50 characters.
- Each answer must be short: one word, a phrase, or at most two sentences (never more than 500 characters).
- Cover the most important ideas first. Produce between 3 and 15 flashcards.
- Label each flashcard with a short topic (the subject area, e.g. "Cell Biology").
- Also report the overall topic of the material as "detected_domain".

Respond with JSON only, no prose and no markdown, in exactly this shape:
{"flashcards": [{"question": "...", "correct_answer": "...", "domain": "..."}], "detected_domain": "..."}"#;

const USER_INPUT_TEMPLATE: &str = r#"TOPIC HINT: {domain}

SOURCE MATERIAL:
---
{text}
---"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use flashcard_core::domain::{GenerationCandidate, GenerationOutput};
use flashcard_core::ports::{FlashcardGenerationService, GenerationError};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::info;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("code fence pattern is valid")
});

//=========================================================================================
// Wire Format of the Model's Reply
//=========================================================================================

#[derive(Deserialize)]
struct RawReply {
    flashcards: Vec<RawFlashcard>,
    #[serde(default)]
    detected_domain: Option<String>,
}

/// Fields are optional so one incomplete card does not sink the whole reply; the
/// orchestrator drops cards that fail validation.
#[derive(Deserialize)]
struct RawFlashcard {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    correct_answer: Option<String>,
    #[serde(default)]
    domain: Option<String>,
}

/// Parses the model's reply text into candidates. Anything that is not the expected
/// JSON object is malformed.
pub fn parse_reply(raw: &str) -> Result<GenerationOutput, GenerationError> {
    let body = match CODE_FENCE.captures(raw) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => raw.trim(),
    };
    let reply: RawReply =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;

    let candidates = reply
        .flashcards
        .into_iter()
        .map(|card| GenerationCandidate {
            question: card.question.unwrap_or_default(),
            answer: card.correct_answer.unwrap_or_default(),
            domain: card.domain,
        })
        .collect();
    Ok(GenerationOutput {
        candidates,
        detected_domain: reply.detected_domain.filter(|d| !d.trim().is_empty()),
    })
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `FlashcardGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiGenerationAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerationAdapter {
    /// Creates a new `OpenAiGenerationAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

fn upstream(e: OpenAIError) -> GenerationError {
    GenerationError::Upstream(e.to_string())
}

//=========================================================================================
// `FlashcardGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl FlashcardGenerationService for OpenAiGenerationAdapter {
    async fn generate_flashcards(
        &self,
        source_text: &str,
        domain_hint: Option<&str>,
    ) -> Result<GenerationOutput, GenerationError> {
        let user_input = USER_INPUT_TEMPLATE
            .replace("{domain}", domain_hint.unwrap_or("none, detect it"))
            .replace("{text}", source_text);

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(upstream)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_input)
                .build()
                .map_err(upstream)?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(upstream)?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self.client.chat().create(request).await.map_err(upstream)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                GenerationError::Malformed("the model returned no text content".to_string())
            })?;

        let output = parse_reply(&content)?;
        info!(
            "Generation model returned {} candidates (detected domain: {:?}).",
            output.candidates.len(),
            output.detected_domain
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json_and_tolerates_missing_fields() {
        let raw = r#"```json
{"flashcards": [
  {"question": "Why do plants need chlorophyll for photosynthesis to happen?", "correct_answer": "It absorbs light", "domain": "Botany"},
  {"question": "Incomplete card without an answer field at all, oddly enough?"}
], "detected_domain": "Biology"}
```"#;

        let output = parse_reply(raw).unwrap();

        assert_eq!(output.candidates.len(), 2);
        assert_eq!(output.candidates[0].answer, "It absorbs light");
        assert_eq!(output.candidates[0].domain.as_deref(), Some("Botany"));
        assert_eq!(output.candidates[1].answer, "");
        assert_eq!(output.detected_domain.as_deref(), Some("Biology"));
    }

    #[test]
    fn prose_is_malformed() {
        let err = parse_reply("Sure! Here are some flashcards: ...").unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[test]
    fn missing_flashcards_array_is_malformed() {
        let err = parse_reply(r#"{"detected_domain": "History"}"#).unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }
}
