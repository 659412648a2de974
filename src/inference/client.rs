//! Ollama HTTP client
//!
//! Talks to a locally running inference server over its JSON API:
//! `POST /api/chat` for replies and `GET /api/tags` for available models.
//! Responses are requested unstreamed; one call yields one reply.

use crate::chat::models::ChatMessage;
use crate::inference::{InferenceError, InferenceService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Address the server listens on by default
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// HTTP client for the inference server
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

impl OllamaClient {
    /// Create a client for the given base URL
    ///
    /// The request timeout bounds a whole chat call; models served locally
    /// can take minutes on large prompts, so callers should be generous.
    ///
    /// # Arguments
    /// * `base_url` - Server address, with or without a trailing slash
    /// * `request_timeout` - Upper bound on one whole request
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl InferenceService for OllamaClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatMessage, InferenceError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model,
            messages,
            stream: false,
        };

        debug!(
            model = %model,
            message_count = messages.len(),
            "Sending chat request"
        );

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            return Err(InferenceError::Status(status.as_u16(), body));
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            InferenceError::InvalidResponse(format!("{} - body: {}", e, body))
        })?;

        debug!(
            model = %model,
            reply_len = parsed.message.content.len(),
            "Received chat response"
        );

        Ok(parsed.message)
    }

    async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            return Err(InferenceError::Status(status.as_u16(), body));
        }

        let body = response.text().await?;
        let parsed: TagsResponse = serde_json::from_str(&body).map_err(|e| {
            InferenceError::InvalidResponse(format!("{} - body: {}", e, body))
        })?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::MessageRole;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use serial_test::serial;

    fn test_client(base_url: &str) -> OllamaClient {
        OllamaClient::new(base_url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = test_client("http://myserver:11434/");
        assert_eq!(client.base_url, "http://myserver:11434");
    }

    #[test]
    fn test_chat_request_serialization() {
        let messages = vec![
            ChatMessage::new(MessageRole::System, "Be brief".to_string()),
            ChatMessage::new(MessageRole::User, "Hello".to_string()),
        ];
        let request = ChatRequest {
            model: "m1",
            messages: &messages,
            stream: false,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"stream\":false"));
        assert!(json.contains("\"model\":\"m1\""));
        assert!(json.contains("\"role\":\"system\""));
    }

    #[tokio::test]
    #[serial]
    async fn test_chat_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "model": "m1",
                "stream": false,
            })))
            .with_status(200)
            .with_body(r#"{"message": {"role": "assistant", "content": "Hi there"}}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let messages = vec![ChatMessage::new(MessageRole::User, "Hello".to_string())];
        let reply = client.chat("m1", &messages).await.unwrap();

        mock.assert_async().await;
        assert_eq!(reply.role, "assistant");
        assert_eq!(reply.content, "Hi there");
    }

    #[tokio::test]
    #[serial]
    async fn test_chat_error_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .with_status(500)
            .with_body(r#"{"error": "model failed to load"}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let messages = vec![ChatMessage::new(MessageRole::User, "Hello".to_string())];
        let result = client.chat("m1", &messages).await;

        mock.assert_async().await;
        match result {
            Err(InferenceError::Status(status, body)) => {
                assert_eq!(status, 500);
                assert!(body.contains("model failed to load"));
            }
            other => panic!("Expected Status error, got: {:?}", other),
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_chat_invalid_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body("this is not json")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let messages = vec![ChatMessage::new(MessageRole::User, "Hello".to_string())];
        let result = client.chat("m1", &messages).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(InferenceError::InvalidResponse(_))));
    }

    #[tokio::test]
    #[serial]
    async fn test_list_models() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(
                r#"{"models": [{"name": "llama3.1:latest", "size": 4}, {"name": "mistral:7b"}]}"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let models = client.list_models().await.unwrap();

        mock.assert_async().await;
        assert_eq!(models, vec!["llama3.1:latest".to_string(), "mistral:7b".to_string()]);
    }

    #[tokio::test]
    #[serial]
    async fn test_list_models_error_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/tags")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let result = client.list_models().await;

        mock.assert_async().await;
        assert!(matches!(result, Err(InferenceError::Status(404, _))));
    }

    #[tokio::test]
    async fn test_chat_connection_refused() {
        // Nothing listens on this port
        let client = test_client("http://127.0.0.1:1");
        let messages = vec![ChatMessage::new(MessageRole::User, "Hello".to_string())];
        let result = client.chat("m1", &messages).await;
        assert!(matches!(result, Err(InferenceError::Request(_))));
    }
}
