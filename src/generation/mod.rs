//! Completion clients used to answer questions from retrieved context.
//!
//! Both adapters issue a single non-streaming request per prompt. A response that parses but
//! lacks the answer field is reported as [`Completion::text`] = `None` so the query service can
//! degrade to a placeholder instead of failing the request.

mod ollama;
mod openai;

pub use ollama::OllamaCompletionClient;
pub use openai::OpenAiCompatibleClient;

use crate::config::{Config, LlmProvider};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionClientError {
    /// Provider was unreachable or rejected the connection.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response was not valid JSON.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Provider did not answer within the configured timeout.
    #[error("Completion request timed out after {0:?}")]
    Timeout(Duration),
    /// Client could not be constructed from the current configuration.
    #[error("Completion provider misconfigured: {0}")]
    Misconfigured(String),
}

/// Outcome of a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Generated text, or `None` when the provider omitted it.
    pub text: Option<String>,
}

/// Interface implemented by completion providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate an answer for a fully assembled prompt.
    async fn complete(&self, prompt: &str) -> Result<Completion, CompletionClientError>;
}

/// Build the completion client selected by `LLM_PROVIDER`.
pub fn get_completion_client(
    config: &Config,
) -> Result<Box<dyn CompletionClient + Send + Sync>, CompletionClientError> {
    let timeout = Duration::from_secs(config.llm_timeout_secs);
    let base_url = config.llm_base_url();
    tracing::debug!(
        provider = ?config.llm_provider,
        model = %config.llm_model,
        base_url = %base_url,
        "Building completion client"
    );
    match config.llm_provider {
        LlmProvider::Ollama => Ok(Box::new(OllamaCompletionClient::new(
            base_url,
            config.llm_model.clone(),
            timeout,
        )?)),
        LlmProvider::Groq | LlmProvider::OpenAI => {
            let api_key = config.llm_api_key.as_deref().ok_or_else(|| {
                CompletionClientError::Misconfigured("GROQ_API_KEY is not set".into())
            })?;
            Ok(Box::new(OpenAiCompatibleClient::new(
                &base_url,
                api_key,
                config.llm_model.clone(),
                timeout,
            )?))
        }
    }
}

/// Map transport failures onto the error taxonomy shared by both adapters.
pub(crate) fn transport_error(
    error: &reqwest::Error,
    endpoint: &str,
    timeout: Duration,
) -> CompletionClientError {
    if error.is_timeout() {
        CompletionClientError::Timeout(timeout)
    } else {
        CompletionClientError::ProviderUnavailable(format!("failed to reach {endpoint}: {error}"))
    }
}

/// Trim a generated answer, treating blank output as missing.
pub(crate) fn normalize_answer(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
