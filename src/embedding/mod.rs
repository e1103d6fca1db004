//! Embedding client abstraction and adapters.
//!
//! Three backends implement [`EmbeddingClient`]:
//!
//! - [`OllamaEmbeddingClient`] talks to a local Ollama runtime through `ollama-rs`.
//! - [`OpenAiEmbeddingClient`] posts to any OpenAI-compatible `/embeddings` endpoint.
//! - [`HashingEmbeddingClient`] is deterministic and in-process, for offline runs and tests.

mod hashing;
mod ollama;
mod openai;

pub use hashing::HashingEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be constructed from the current configuration.
    #[error("Embedding provider misconfigured: {0}")]
    Misconfigured(String),
    /// Provider did not answer within the configured timeout.
    #[error("Embedding request timed out after {0:?}")]
    Timeout(Duration),
    /// Provider returned a different number of vectors than inputs.
    #[error("Embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
    /// Provider returned vectors of an unexpected size.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured via `EMBEDDING_DIMENSION`.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient {
    /// Produce an embedding vector for each supplied chunk of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Model identifier recorded alongside persisted indexes.
    fn model_name(&self) -> &str;
}

/// Reject a provider batch whose vector count or width disagrees with the request.
pub(crate) fn check_batch(
    expected_count: usize,
    dimension: usize,
    vectors: &[Vec<f32>],
) -> Result<(), EmbeddingClientError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingClientError::CountMismatch {
            expected: expected_count,
            actual: vectors.len(),
        });
    }
    if let Some(vector) = vectors.iter().find(|vector| vector.len() != dimension) {
        return Err(EmbeddingClientError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Build an embedding client suitable for the supplied configuration.
pub fn get_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient + Send + Sync>, EmbeddingClientError> {
    let timeout = Duration::from_secs(config.embedding_timeout_secs);
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Building embedding client"
    );
    match config.embedding_provider {
        EmbeddingProvider::Hash => Ok(Box::new(HashingEmbeddingClient::new(
            config.embedding_dimension,
        ))),
        EmbeddingProvider::Ollama => Ok(Box::new(OllamaEmbeddingClient::new(
            &config.ollama_url,
            config.embedding_model.clone(),
            config.embedding_dimension,
            timeout,
        )?)),
        EmbeddingProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                EmbeddingClientError::Misconfigured("OPENAI_API_KEY is not set".into())
            })?;
            Ok(Box::new(OpenAiEmbeddingClient::new(
                &api_key,
                &config.openai_base_url,
                config.embedding_model.clone(),
                config.embedding_dimension,
                timeout,
            )?))
        }
    }
}
