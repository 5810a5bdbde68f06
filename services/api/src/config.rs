//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use flashcard_core::PollConfig;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When absent the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub openai_api_key: String,
    pub generation_model: String,
    pub generation_timeout: Duration,
    pub mastery_threshold: u32,
    pub interval_floor_days: u32,
    pub interval_max_days: u32,
    pub cors_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            log_level: Level::INFO,
            openai_api_key: String::new(),
            generation_model: "gpt-4o-mini".to_string(),
            generation_timeout: Duration::from_secs(30),
            mastery_threshold: 5,
            interval_floor_days: 1,
            interval_max_days: 365,
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Self::default();

        let openai_api_key = required_var("OPENAI_API_KEY")?;

        // --- Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", defaults.bind_address)?;
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Generation Collaborator ---
        let generation_model =
            std::env::var("GENERATION_MODEL").unwrap_or(defaults.generation_model);
        let generation_timeout = Duration::from_secs(parse_var(
            "GENERATION_TIMEOUT_SECS",
            defaults.generation_timeout.as_secs(),
        )?);

        // --- Scheduler ---
        let mastery_threshold = parse_var("MASTERY_THRESHOLD", defaults.mastery_threshold)?;
        let interval_floor_days = parse_var("INTERVAL_FLOOR_DAYS", defaults.interval_floor_days)?;
        let interval_max_days = parse_var("INTERVAL_MAX_DAYS", defaults.interval_max_days)?;

        let cors_origin = std::env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin);

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            generation_model,
            generation_timeout,
            mastery_threshold,
            interval_floor_days,
            interval_max_days,
            cors_origin,
        })
    }
}

/// Settings for the `generate` command-line client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub auth_token: String,
    pub source_file: String,
    pub domain: Option<String>,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let poll_defaults = PollConfig::default();

        let api_base_url =
            std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let auth_token = required_var("AUTH_TOKEN")?;
        let source_file = required_var("SOURCE_FILE")?;
        let domain = std::env::var("DOMAIN").ok().filter(|d| !d.trim().is_empty());
        let poll_interval = Duration::from_millis(parse_var(
            "POLL_INTERVAL_MS",
            poll_defaults.check_interval.as_millis() as u64,
        )?);
        let poll_timeout = Duration::from_secs(parse_var(
            "POLL_TIMEOUT_SECS",
            poll_defaults.timeout.as_secs(),
        )?);

        Ok(Self {
            api_base_url,
            auth_token,
            source_file,
            domain,
            poll_interval,
            poll_timeout,
        })
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            check_interval: self.poll_interval,
            timeout: self.poll_timeout,
            ..PollConfig::default()
        }
    }
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

/// Parses an optional environment variable, falling back to `default` when unset.
pub(crate) fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let value: u32 = parse_var("FLASHCARDS_TEST_SURELY_UNSET_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn unparsable_values_name_the_variable() {
        std::env::set_var("FLASHCARDS_TEST_BAD_NUMBER", "many");
        let err = parse_var::<u32>("FLASHCARDS_TEST_BAD_NUMBER", 1).unwrap_err();
        assert!(err.to_string().contains("FLASHCARDS_TEST_BAD_NUMBER"));
    }

    #[test]
    fn server_config_requires_an_openai_key() {
        std::env::remove_var("OPENAI_API_KEY");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(name) if name == "OPENAI_API_KEY"));
    }

    #[test]
    fn blank_required_variables_are_missing() {
        std::env::set_var("FLASHCARDS_TEST_BLANK_TOKEN", "   ");
        let err = required_var("FLASHCARDS_TEST_BLANK_TOKEN").unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(name) if name == "FLASHCARDS_TEST_BLANK_TOKEN"));
    }
}
