//! Error types and error handling for the application
//!
//! Every fallible operation on chats surfaces one of these variants. All of
//! them are recoverable at the session boundary; only failure to open the
//! backing database at startup aborts the process.

use thiserror::Error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum ChatError {
    /// A chat with the given name already exists
    #[error("Chat already exists: {0}")]
    DuplicateName(String),

    /// No chat with the given name is stored
    #[error("Chat not found: {0}")]
    NotFound(String),

    /// The submitted prompt was empty or whitespace-only
    #[error("Prompt is empty")]
    EmptyPrompt,

    /// An imported chat document failed structural validation
    #[error("Malformed chat document: {0}")]
    MalformedImport(String),

    /// The chat already has a reply request outstanding
    #[error("A reply is already pending for chat: {0}")]
    ReplyPending(String),

    /// The inference service failed to produce a reply
    #[error("Inference error: {0}")]
    Inference(#[from] crate::inference::InferenceError),

    /// Internal error (catch-all for storage, I/O and serialization failures)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
