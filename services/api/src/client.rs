//! services/api/src/client.rs
//!
//! HTTP client for the API: submits source text and implements the polling check
//! against `GET /generations/{session_id}/proposals`.

use async_trait::async_trait;
use flashcard_core::{PortError, PortResult, Proposal, SessionCheck, SessionId};
use reqwest::{Response, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::error::ErrorEnvelope;
use crate::web::protocol::{GenerateRequest, GenerateResponse, SessionProposalsResponse};

/// Per-request deadline for every storage round-trip made through the API.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{status} {code}: {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },
}

/// A thin client bound to one API base URL and one credential.
#[derive(Clone)]
pub struct GenerationClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl GenerationClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Starts a generation. The server answers once the batch is persisted, or with
    /// the error envelope.
    pub async fn submit(
        &self,
        source_text: &str,
        domain: Option<&str>,
    ) -> Result<GenerateResponse, ClientError> {
        let body = GenerateRequest {
            source_text: source_text.to_string(),
            domain: domain.map(str::to_string),
        };
        let response = self
            .http
            .post(self.url("/generations"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }

    pub async fn session_proposals(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionProposalsResponse, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/generations/{}/proposals", session_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }
}

/// Passes 2xx responses through and turns anything else into [`ClientError::Api`].
async fn expect_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => (envelope.error.code, envelope.error.message),
        Err(_) => ("UNKNOWN".to_string(), text),
    };
    Err(ClientError::Api {
        status,
        code,
        message,
    })
}

//=========================================================================================
// Polling Check over HTTP
//=========================================================================================

/// The polling check backed by the API.
#[derive(Clone)]
pub struct HttpSessionCheck {
    client: GenerationClient,
}

impl HttpSessionCheck {
    pub fn new(client: GenerationClient) -> Self {
        Self { client }
    }
}

fn to_port_error(err: ClientError) -> PortError {
    match err {
        ClientError::Api { status, .. } if status == StatusCode::UNAUTHORIZED => {
            PortError::Unauthorized
        }
        ClientError::Api {
            status, message, ..
        } if status == StatusCode::NOT_FOUND => PortError::NotFound(message),
        other => PortError::Unexpected(other.to_string()),
    }
}

#[async_trait]
impl SessionCheck for HttpSessionCheck {
    async fn fetch_proposals(&self, session_id: &SessionId) -> PortResult<Vec<Proposal>> {
        let response = self
            .client
            .session_proposals(session_id)
            .await
            .map_err(to_port_error)?;
        debug!(
            "Session {} check returned {} proposals.",
            session_id,
            response.proposals.len()
        );
        response
            .proposals
            .into_iter()
            .map(Proposal::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_and_missing_map_to_port_errors() {
        let unauthorized = ClientError::Api {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED".to_string(),
            message: "Unauthorized".to_string(),
        };
        assert_eq!(to_port_error(unauthorized), PortError::Unauthorized);

        let missing = ClientError::Api {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".to_string(),
            message: "gone".to_string(),
        };
        assert_eq!(to_port_error(missing), PortError::NotFound("gone".to_string()));

        let server = ClientError::Api {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: "boom".to_string(),
        };
        assert!(matches!(to_port_error(server), PortError::Unexpected(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = GenerationClient::new("http://localhost:3000/", "token").unwrap();
        assert_eq!(client.url("/generations"), "http://localhost:3000/generations");
    }
}
