use super::{EmbeddingClient, EmbeddingClientError, check_batch};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Embedding client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbeddingClient {
    http: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbeddingClient {
    /// Build a client for `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| {
                EmbeddingClientError::Misconfigured("invalid OPENAI_API_KEY".into())
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .user_agent("pdf-query/embeddings")
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| EmbeddingClientError::Misconfigured(error.to_string()))?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self {
            http,
            endpoint,
            model,
            dimension,
            timeout,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .http
            .post(&self.endpoint)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: &texts,
            })
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    EmbeddingClientError::Timeout(self.timeout)
                } else {
                    EmbeddingClientError::GenerationFailed(format!(
                        "failed to reach {}: {error}",
                        self.endpoint
                    ))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "embeddings endpoint returned {status}: {body}"
            )));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::GenerationFailed(format!(
                "failed to decode embeddings response: {error}"
            ))
        })?;
        parsed.data.sort_by_key(|entry| entry.index);
        let vectors: Vec<Vec<f32>> = parsed
            .data
            .into_iter()
            .map(|entry| entry.embedding)
            .collect();
        check_batch(texts.len(), self.dimension, &vectors)?;
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn client_for(server: &MockServer) -> OpenAiEmbeddingClient {
        OpenAiEmbeddingClient::new(
            "test-key",
            &server.url("/v1"),
            "text-embedding-3-small".into(),
            2,
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn orders_vectors_by_response_index() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer test-key");
                then.status(200).json_body(json!({
                    "data": [
                        { "embedding": [0.0, 1.0], "index": 1 },
                        { "embedding": [1.0, 0.0], "index": 0 }
                    ]
                }));
            })
            .await;

        let vectors = client_for(&server)
            .generate_embeddings(vec!["first".into(), "second".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(429).body("slow down");
            })
            .await;

        let error = client_for(&server)
            .generate_embeddings(vec!["text".into()])
            .await
            .expect_err("error status");

        assert!(
            matches!(&error, EmbeddingClientError::GenerationFailed(message) if message.contains("429"))
        );
    }

    #[tokio::test]
    async fn rejects_short_responses() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(json!({
                    "data": [{ "embedding": [1.0], "index": 0 }]
                }));
            })
            .await;

        let error = client_for(&server)
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .expect_err("count mismatch");

        assert!(matches!(
            error,
            EmbeddingClientError::CountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn rejects_vectors_of_unexpected_width() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(json!({
                    "data": [{ "embedding": [0.1, 0.2, 0.3], "index": 0 }]
                }));
            })
            .await;

        let error = client_for(&server)
            .generate_embeddings(vec!["a".into()])
            .await
            .expect_err("dimension mismatch");

        assert!(matches!(
            error,
            EmbeddingClientError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }
}
