//! Conversation session management
//!
//! The session manager drives chat records through their lifecycle:
//! creating or loading them, appending user turns, requesting and recording
//! assistant replies, and writing every durable change back through the
//! database. It owns no background state and is cheap to clone, so
//! dispatcher workers can carry their own handle.

use crate::chat::codec;
use crate::chat::db::ChatDb;
use crate::chat::models::{ChatMessage, ChatRecord, MessageRole};
use crate::error::ChatError;
use crate::inference::InferenceService;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// One completed model reply with its measured latency
#[derive(Debug, Clone)]
pub struct AssistantReply {
    /// Text of the reply
    pub content: String,
    /// Wall-clock seconds the service call took
    pub elapsed_secs: f64,
}

/// Orchestrates chat records between the user, storage and the model
#[derive(Clone)]
pub struct SessionManager {
    db: ChatDb,
    service: Arc<dyn InferenceService>,
}

impl SessionManager {
    /// Create a session manager over a database and an inference service
    pub fn new(db: ChatDb, service: Arc<dyn InferenceService>) -> Self {
        Self { db, service }
    }

    /// Create a brand-new chat and persist it immediately
    ///
    /// Fails with `DuplicateName` when the name is already taken.
    pub async fn start_new_conversation(&self, name: &str) -> Result<ChatRecord, ChatError> {
        let record = ChatRecord::new(name.to_string());
        self.db.create(&record).await?;
        info!(name = %name, "Started new chat");
        Ok(record)
    }

    /// Load an existing chat by name
    pub async fn load_conversation(&self, name: &str) -> Result<ChatRecord, ChatError> {
        let record = self.db.read(name).await?;
        debug!(
            name = %name,
            message_count = record.messages.len(),
            "Loaded chat"
        );
        Ok(record)
    }

    /// Append the user's next turn to the in-memory record
    ///
    /// Rejects empty or whitespace-only prompts. The turn is not persisted
    /// here; durability happens when the matching reply is recorded.
    pub fn submit_user_turn(&self, record: &mut ChatRecord, prompt: &str) -> Result<(), ChatError> {
        if prompt.trim().is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        record
            .messages
            .push(ChatMessage::new(MessageRole::User, prompt.to_string()));
        Ok(())
    }

    /// Ask the inference service for the next reply to a record
    ///
    /// When the record carries instructions they are prepended as a system
    /// message for this call only; the record itself is untouched. Latency
    /// is measured around the service call.
    pub async fn request_assistant_reply(
        &self,
        record: &ChatRecord,
        model: &str,
    ) -> Result<AssistantReply, ChatError> {
        let mut outbound = Vec::with_capacity(record.messages.len() + 1);
        if !record.instructions.is_empty() {
            outbound.push(ChatMessage::new(
                MessageRole::System,
                record.instructions.clone(),
            ));
        }
        outbound.extend(record.messages.iter().cloned());

        debug!(
            name = %record.name,
            model = %model,
            message_count = outbound.len(),
            "Requesting assistant reply"
        );

        let started = Instant::now();
        let reply = self.service.chat(model, &outbound).await?;
        let elapsed_secs = started.elapsed().as_secs_f64();

        info!(
            name = %record.name,
            model = %model,
            secs = elapsed_secs,
            "Assistant reply received"
        );

        Ok(AssistantReply {
            content: reply.content,
            elapsed_secs,
        })
    }

    /// Append a finished assistant reply and persist the record
    ///
    /// The message, its latency and the model that produced it are appended
    /// together so the parallel sequences never drift. This is the point
    /// where the whole turn becomes durable.
    pub async fn record_assistant_reply(
        &self,
        record: &mut ChatRecord,
        model: &str,
        reply: AssistantReply,
    ) -> Result<(), ChatError> {
        let AssistantReply {
            content,
            elapsed_secs,
        } = reply;

        record
            .messages
            .push(ChatMessage::new(MessageRole::Assistant, content));
        record.reply_times.push(elapsed_secs);
        record.addressed_models.push(model.to_string());

        self.db.update(record).await?;
        debug!(name = %record.name, "Recorded assistant reply");
        Ok(())
    }

    /// Empty a chat's transcript while keeping its instructions
    pub async fn clear_conversation(&self, record: &mut ChatRecord) -> Result<(), ChatError> {
        record.messages.clear();
        record.reply_times.clear();
        record.addressed_models.clear();

        self.db.update(record).await?;
        info!(name = %record.name, "Cleared chat");
        Ok(())
    }

    /// Replace a chat's instruction text and persist it
    pub async fn set_instructions(
        &self,
        record: &mut ChatRecord,
        text: &str,
    ) -> Result<(), ChatError> {
        record.instructions = text.to_string();
        self.db.update(record).await?;
        debug!(name = %record.name, "Updated instructions");
        Ok(())
    }

    /// Delete a stored chat; deleting a missing name is not an error
    pub async fn delete_conversation(&self, name: &str) -> Result<(), ChatError> {
        self.db.delete(name).await?;
        info!(name = %name, "Deleted chat");
        Ok(())
    }

    /// Names of all stored chats
    pub async fn list_conversations(&self) -> Result<Vec<String>, ChatError> {
        self.db.list_names().await
    }

    /// Serialize a chat to its portable document form
    pub fn export_conversation(&self, record: &ChatRecord) -> Result<String, ChatError> {
        codec::export(record)
    }

    /// Validate a chat document and store it as a new chat
    ///
    /// Nothing is stored when validation fails or the name is already
    /// taken; the caller's state is unchanged in either case.
    pub async fn import_conversation(&self, text: &str) -> Result<ChatRecord, ChatError> {
        let record = codec::import(text)?;
        self.db.create(&record).await?;
        info!(
            name = %record.name,
            message_count = record.messages.len(),
            "Imported chat"
        );
        Ok(record)
    }

    /// Model names the inference service reports as available
    pub async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        Ok(self.service.list_models().await?)
    }
}
