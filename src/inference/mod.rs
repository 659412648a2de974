//! Model inference
//!
//! The trait boundary to the model service, the HTTP client implementation
//! for a locally running Ollama server, and the supervisor for the server
//! process itself.

pub mod client;
pub mod server;

use crate::chat::models::ChatMessage;
use async_trait::async_trait;
use thiserror::Error;

pub use client::OllamaClient;
pub use server::ServerProcess;

/// Errors from the model inference service
///
/// These are opaque to the chat core: a failed request is reported to the
/// caller and never retried automatically.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// HTTP transport failed (connection refused, timeout, ...)
    #[error("Request to inference server failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Inference server returned status {0}: {1}")]
    Status(u16, String),

    /// Response body could not be interpreted
    #[error("Invalid inference response: {0}")]
    InvalidResponse(String),

    /// Server process could not be started
    #[error("Failed to start inference server: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A model service that produces one assistant reply per call
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Send a full message transcript and get the next assistant message
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatMessage, InferenceError>;

    /// List the model names the server has available
    async fn list_models(&self) -> Result<Vec<String>, InferenceError>;
}
