//! OpenAI client configuration with sensible defaults.

use crate::error::{Result, TubeqaError};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default HTTP timeout for OpenAI API requests (5 minutes).
///
/// Per-capability budgets in [`crate::config::NetworkSettings`] are enforced
/// above this and are usually tighter.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Create an OpenAI client with the default timeout.
pub fn create_client() -> Result<Client<OpenAIConfig>> {
    create_client_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create an OpenAI client with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TubeqaError::Config(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Client::with_config(OpenAIConfig::default()).with_http_client(http_client))
}
