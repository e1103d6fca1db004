use super::{EmbeddingClient, EmbeddingClientError, check_batch};
use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::GenerateEmbeddingsRequest;
use reqwest::Url;
use std::time::Duration;

/// Embedding client backed by a local Ollama runtime.
pub struct OllamaEmbeddingClient {
    ollama: Ollama,
    model: String,
    dimension: usize,
    timeout: Duration,
}

impl OllamaEmbeddingClient {
    /// Build a client for the Ollama instance at `base_url` (e.g. `http://127.0.0.1:11434`).
    ///
    /// Responses must carry one vector of `dimension` floats per input.
    pub fn new(
        base_url: &str,
        model: String,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        let (host, port) = split_host_port(base_url)?;
        tracing::debug!(host = %host, port, model = %model, "Initialized Ollama embedding client");
        Ok(Self {
            ollama: Ollama::new(host, port),
            model,
            dimension,
            timeout,
        })
    }
}

/// Split a base URL into the `scheme://host` and port pair `ollama-rs` expects.
fn split_host_port(base_url: &str) -> Result<(String, u16), EmbeddingClientError> {
    let url = Url::parse(base_url).map_err(|error| {
        EmbeddingClientError::Misconfigured(format!("invalid OLLAMA_URL '{base_url}': {error}"))
    })?;
    let host = url.host_str().ok_or_else(|| {
        EmbeddingClientError::Misconfigured(format!("OLLAMA_URL '{base_url}' has no host"))
    })?;
    let port = url.port_or_known_default().unwrap_or(11434);
    Ok((format!("{}://{host}", url.scheme()), port))
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        let request = GenerateEmbeddingsRequest::new(self.model.clone(), texts.into());
        let response = tokio::time::timeout(self.timeout, self.ollama.generate_embeddings(request))
            .await
            .map_err(|_| EmbeddingClientError::Timeout(self.timeout))?
            .map_err(|error| {
                let detail = error.to_string();
                if detail.contains("not found") {
                    EmbeddingClientError::GenerationFailed(format!(
                        "embedding model '{}' not found; run `ollama pull {}`",
                        self.model, self.model
                    ))
                } else {
                    EmbeddingClientError::GenerationFailed(detail)
                }
            })?;

        check_batch(expected, self.dimension, &response.embeddings)?;
        Ok(response.embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
