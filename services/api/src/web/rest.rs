//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification.

use crate::error::{ErrorBody, ErrorEnvelope};
use crate::web::{generation, practice, proposals, protocol::*};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

struct SessionAuth;

impl Modify for SessionAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("session"))),
            );
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        generation::create_generation_handler,
        generation::list_session_proposals_handler,
        generation::update_session_domain_handler,
        generation::accept_session_handler,
        proposals::edit_proposal_handler,
        proposals::accept_selected_handler,
        proposals::reject_handler,
        practice::due_items_handler,
        practice::answer_handler,
        practice::reset_handler,
    ),
    components(
        schemas(
            GenerateRequest,
            GenerateResponse,
            ProposalDto,
            SessionProposalsResponse,
            UpdateDomainRequest,
            UpdateDomainResponse,
            AcceptSessionRequest,
            AcceptSelectedRequest,
            AcceptanceResponse,
            RejectRequest,
            RejectResponse,
            EditProposalRequest,
            StudyItemDto,
            DueItemsResponse,
            AnswerRequest,
            ErrorEnvelope,
            ErrorBody,
        )
    ),
    modifiers(&SessionAuth),
    security(("session_cookie" = []), ("bearer" = [])),
    tags(
        (name = "Generations", description = "Generate flashcard proposals from source text."),
        (name = "Proposals", description = "Review generated proposals before they become study items."),
        (name = "Practice", description = "Spaced-repetition practice over study items.")
    )
)]
pub struct ApiDoc;
