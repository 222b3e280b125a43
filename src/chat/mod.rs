//! Chat-model client abstraction and the OpenAI-backed adapter.
//!
//! The answer pipeline talks to the model through `invoke(system, user)`;
//! model identity and provider are configuration, not part of the contract.

use crate::config::get_config;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced while calling the chat model.
#[derive(Debug, Error)]
pub enum ChatClientError {
    /// Provider was unreachable.
    #[error("Chat provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Chat completion failed: {0}")]
    CompletionFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed chat response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by chat-model providers.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a system instruction plus one user message and return the raw
    /// response text.
    async fn invoke(&self, system: &str, user: &str) -> Result<String, ChatClientError>;
}

/// OpenAI-compatible chat-completions adapter.
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatClient {
    /// Construct an adapter from the loaded configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.openai_model.clone(),
        )
    }

    /// Construct an adapter against an explicit endpoint, used by tests.
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        let http = Client::builder()
            .user_agent("policyqa/chat")
            .build()
            .expect("Failed to construct reqwest::Client for chat completions");
        Self {
            http,
            base_url,
            api_key,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn invoke(&self, system: &str, user: &str) -> Result<String, ChatClientError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            // Low temperature keeps answers anchored to the retrieved context.
            "temperature": 0.1,
        });

        tracing::debug!(model = %self.model, "Invoking chat model");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                ChatClientError::ProviderUnavailable(format!(
                    "failed to reach chat endpoint at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatClientError::CompletionFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|error| ChatClientError::InvalidResponse(error.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                ChatClientError::InvalidResponse("response contained no choices".to_string())
            })?;

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn invoke_returns_trimmed_message_content() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(serde_json::json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "  Answer text.  " } }
                    ]
                }));
            })
            .await;

        let client =
            OpenAiChatClient::new(server.base_url(), "test-key".into(), "gpt-4o-mini".into());
        let content = client.invoke("system", "user").await.expect("completion");
        assert_eq!(content, "Answer text.");
    }

    #[tokio::test]
    async fn invoke_rejects_empty_choice_list() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .json_body(serde_json::json!({ "choices": [] }));
            })
            .await;

        let client =
            OpenAiChatClient::new(server.base_url(), "test-key".into(), "gpt-4o-mini".into());
        let error = client.invoke("system", "user").await.unwrap_err();
        assert!(matches!(error, ChatClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn invoke_surfaces_provider_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(500).body("upstream exploded");
            })
            .await;

        let client =
            OpenAiChatClient::new(server.base_url(), "test-key".into(), "gpt-4o-mini".into());
        let error = client.invoke("system", "user").await.unwrap_err();
        assert!(matches!(error, ChatClientError::CompletionFailed(_)));
    }
}
