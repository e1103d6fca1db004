use super::{Completion, CompletionClient, CompletionClientError, normalize_answer, transport_error};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use std::time::Duration;

/// Completion client for OpenAI-compatible `/chat/completions` endpoints (Groq, OpenAI, ...).
pub struct OpenAiCompatibleClient {
    http: Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OpenAiCompatibleClient {
    /// Build a client for `base_url` (e.g. `https://api.groq.com/openai/v1`).
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: String,
        timeout: Duration,
    ) -> Result<Self, CompletionClientError> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| CompletionClientError::Misconfigured("invalid API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .user_agent("pdf-query/answer")
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| CompletionClientError::Misconfigured(error.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model,
            timeout,
        })
    }
}

/// Pull `choices[0].message.content` out of a chat completion body, if present.
fn extract_answer(body: &Value) -> Option<String> {
    normalize_answer(
        body.get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str),
    )
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<Completion, CompletionClientError> {
        let payload = json!({
            "model": self.model,
            "temperature": 0.0,
            "stream": false,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });

        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|error| transport_error(&error, &self.endpoint, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionClientError::GenerationFailed(format!(
                "{} returned {status}: {body}",
                self.endpoint
            )));
        }

        let body: Value = response.json().await.map_err(|error| {
            CompletionClientError::InvalidResponse(format!(
                "failed to decode chat completion: {error}"
            ))
        })?;

        let text = extract_answer(&body);
        if text.is_none() {
            tracing::warn!(model = %self.model, "Chat completion carried no message content");
        }
        Ok(Completion { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client_for(server: &MockServer) -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new(
            &server.url("/openai/v1"),
            "gsk-test",
            "llama3-8b-8192".into(),
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn sends_prompt_and_reads_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/v1/chat/completions")
                    .header("authorization", "Bearer gsk-test")
                    .body_contains("What color is the sky?");
                then.status(200).json_body(json!({
                    "choices": [
                        { "index": 0, "message": { "role": "assistant", "content": "Blue." } }
                    ]
                }));
            })
            .await;

        let completion = client_for(&server)
            .complete("Question: What color is the sky?")
            .await
            .expect("answer");

        mock.assert_async().await;
        assert_eq!(completion.text.as_deref(), Some("Blue."));
    }

    #[tokio::test]
    async fn empty_choices_yield_missing_answer() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/openai/v1/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let completion = client_for(&server).complete("prompt").await.expect("answer");
        assert!(completion.text.is_none());
    }

    #[tokio::test]
    async fn unauthorized_is_generation_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/openai/v1/chat/completions");
                then.status(401).body("invalid api key");
            })
            .await;

        let error = client_for(&server)
            .complete("prompt")
            .await
            .expect_err("unauthorized");
        assert!(
            matches!(&error, CompletionClientError::GenerationFailed(message) if message.contains("401"))
        );
    }

    #[test]
    fn extract_answer_ignores_blank_content() {
        let body = json!({ "choices": [{ "message": { "content": "   " } }] });
        assert!(extract_answer(&body).is_none());
    }
}
