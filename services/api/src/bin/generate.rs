//! services/api/src/bin/generate.rs
//!
//! Command-line client: submits a text file for generation, then polls the session
//! until its proposals are visible and prints them.

use api_lib::client::{GenerationClient, HttpSessionCheck};
use api_lib::config::ClientConfig;
use flashcard_core::{spawn_poll, SessionId};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env()?;
    let source_text = std::fs::read_to_string(&config.source_file)?;
    let client = GenerationClient::new(&config.api_base_url, &config.auth_token)?;

    info!(
        "Submitting {} ({} chars) to {}.",
        config.source_file,
        source_text.chars().count(),
        config.api_base_url
    );
    let submitted = client.submit(&source_text, config.domain.as_deref()).await?;
    let session_id = SessionId::parse(&submitted.session_id)
        .ok_or("server returned an invalid session id")?;
    info!(
        "Session {} created with {} proposals.",
        session_id, submitted.count
    );

    let check = Arc::new(HttpSessionCheck::new(client));
    let handle = spawn_poll(check, session_id.clone(), config.poll_config());
    let outcome = handle
        .wait_with(|status| info!("[{:>3}%] {}", status.progress, status.status_message))
        .await;

    match outcome {
        Some(status) if status.done => {
            let proposals = status.proposals.unwrap_or_default();
            println!("Session {}: {} proposals", session_id, proposals.len());
            for (n, p) in proposals.iter().enumerate() {
                println!(
                    "\n{}. [{}] {}\n   -> {}",
                    n + 1,
                    p.domain.as_deref().unwrap_or("no domain"),
                    p.question,
                    p.answer
                );
            }
            Ok(())
        }
        Some(status) => {
            let reason = status
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| status.status_message.clone());
            error!("Polling session {} failed: {}", session_id, reason);
            Err(reason.into())
        }
        None => Err("polling stopped before reaching a result".into()),
    }
}
