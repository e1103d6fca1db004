use super::{Completion, CompletionClient, CompletionClientError, normalize_answer, transport_error};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;

/// Completion client for Ollama's `/api/generate` endpoint.
pub struct OllamaCompletionClient {
    http: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaCompletionClient {
    /// Build a client for the Ollama runtime at `base_url`.
    pub fn new(
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, CompletionClientError> {
        let http = Client::builder()
            .user_agent("pdf-query/answer")
            .timeout(timeout)
            .build()
            .map_err(|error| CompletionClientError::Misconfigured(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionClient for OllamaCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<Completion, CompletionClientError> {
        let endpoint = self.endpoint();
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .http
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|error| transport_error(&error, &endpoint, self.timeout))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CompletionClientError::ProviderUnavailable(format!(
                "Ollama endpoint {endpoint} returned 404 (is model '{}' pulled?)",
                self.model
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: Value = response.json().await.map_err(|error| {
            CompletionClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        let text = normalize_answer(body.get("response").and_then(Value::as_str));
        if text.is_none() {
            tracing::warn!(model = %self.model, "Ollama response carried no answer text");
        }
        Ok(Completion { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client_for(server: &MockServer) -> OllamaCompletionClient {
        OllamaCompletionClient::new(server.base_url(), "llama3".into(), Duration::from_secs(5))
            .expect("client")
    }

    #[tokio::test]
    async fn returns_trimmed_answer() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": "  The sky is blue. ",
                    "done": true
                }));
            })
            .await;

        let completion = client_for(&server).complete("prompt").await.expect("answer");

        mock.assert_async().await;
        assert_eq!(completion.text.as_deref(), Some("The sky is blue."));
    }

    #[tokio::test]
    async fn missing_response_field_is_not_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({ "done": true }));
            })
            .await;

        let completion = client_for(&server).complete("prompt").await.expect("answer");
        assert!(completion.text.is_none());
    }

    #[tokio::test]
    async fn server_error_is_generation_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client_for(&server)
            .complete("prompt")
            .await
            .expect_err("error response");
        assert!(
            matches!(&error, CompletionClientError::GenerationFailed(message) if message.contains("500"))
        );
    }
}
