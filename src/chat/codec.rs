//! Chat import/export
//!
//! Converts between a [`ChatRecord`] and the portable JSON chat document.
//! The document carries the five fields `name`, `messages`, `reply_times`,
//! `addressed_models` and `instructions`; creation time is not exported, an
//! import is stamped as created when it happens.
//!
//! Import validates the document structurally before any record is built,
//! short-circuiting on the first violation. A failed import never produces
//! a partial record, and import never repairs data.

use crate::chat::models::{ChatMessage, ChatRecord};
use crate::error::ChatError;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Keys every chat document must carry
const REQUIRED_KEYS: [&str; 5] = [
    "name",
    "messages",
    "reply_times",
    "addressed_models",
    "instructions",
];

#[derive(Serialize)]
struct ChatDocument<'a> {
    name: &'a str,
    messages: &'a [ChatMessage],
    reply_times: &'a [f64],
    addressed_models: &'a [String],
    instructions: &'a str,
}

/// Serialize a chat to its portable JSON document
pub fn export(record: &ChatRecord) -> Result<String, ChatError> {
    let document = ChatDocument {
        name: &record.name,
        messages: &record.messages,
        reply_times: &record.reply_times,
        addressed_models: &record.addressed_models,
        instructions: &record.instructions,
    };

    serde_json::to_string_pretty(&document)
        .map_err(|e| ChatError::Internal(anyhow::anyhow!("Failed to serialize chat: {}", e)))
}

/// Parse and validate a chat document, producing a fresh record
///
/// Validation order: the document must be a JSON object, carry all required
/// keys, have a well-formed message transcript, have array-valued reply
/// times and addressed models, and those two arrays must be the same
/// length. The first violation wins and nothing is constructed until the
/// whole document has passed.
pub fn import(text: &str) -> Result<ChatRecord, ChatError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ChatError::MalformedImport(format!("not valid JSON: {}", e)))?;

    let document = value.as_object().ok_or_else(|| {
        ChatError::MalformedImport("top-level value is not an object".to_string())
    })?;

    for key in REQUIRED_KEYS {
        if !document.contains_key(key) {
            return Err(ChatError::MalformedImport(format!(
                "missing required key '{}'",
                key
            )));
        }
    }

    let messages = document["messages"]
        .as_array()
        .ok_or_else(|| ChatError::MalformedImport("'messages' is not an array".to_string()))?;
    for (i, entry) in messages.iter().enumerate() {
        let message = entry.as_object().ok_or_else(|| {
            ChatError::MalformedImport(format!("message {} is not an object", i))
        })?;
        if !has_text(message.get("role")) {
            return Err(ChatError::MalformedImport(format!(
                "message {} is missing a non-empty 'role'",
                i
            )));
        }
        if !has_text(message.get("content")) {
            return Err(ChatError::MalformedImport(format!(
                "message {} is missing a non-empty 'content'",
                i
            )));
        }
    }

    let reply_times = document["reply_times"]
        .as_array()
        .ok_or_else(|| ChatError::MalformedImport("'reply_times' is not an array".to_string()))?;
    let addressed_models = document["addressed_models"].as_array().ok_or_else(|| {
        ChatError::MalformedImport("'addressed_models' is not an array".to_string())
    })?;

    if reply_times.len() != addressed_models.len() {
        return Err(ChatError::MalformedImport(format!(
            "{} reply times but {} addressed models",
            reply_times.len(),
            addressed_models.len()
        )));
    }

    let name = document["name"]
        .as_str()
        .ok_or_else(|| ChatError::MalformedImport("'name' is not a string".to_string()))?;
    let instructions = document["instructions"]
        .as_str()
        .ok_or_else(|| ChatError::MalformedImport("'instructions' is not a string".to_string()))?;

    let mut record = ChatRecord::new(name.to_string());
    for message in messages {
        // Shape was validated above, so the string casts cannot fail
        record.messages.push(ChatMessage {
            role: message["role"].as_str().unwrap_or_default().to_string(),
            content: message["content"].as_str().unwrap_or_default().to_string(),
        });
    }
    for (i, time) in reply_times.iter().enumerate() {
        record.reply_times.push(time.as_f64().ok_or_else(|| {
            ChatError::MalformedImport(format!("reply time {} is not a number", i))
        })?);
    }
    for (i, model) in addressed_models.iter().enumerate() {
        record.addressed_models.push(
            model
                .as_str()
                .ok_or_else(|| {
                    ChatError::MalformedImport(format!("addressed model {} is not a string", i))
                })?
                .to_string(),
        );
    }
    record.instructions = instructions.to_string();

    Ok(record)
}

/// Write a chat document to a file as UTF-8 JSON
pub fn write_to_file<P: AsRef<Path>>(record: &ChatRecord, path: P) -> Result<(), ChatError> {
    let json = export(record)?;
    std::fs::write(path.as_ref(), json)
        .map_err(|e| ChatError::Internal(anyhow::anyhow!("Failed to write chat file: {}", e)))?;
    Ok(())
}

/// Read and validate a chat document from a file
pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<ChatRecord, ChatError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ChatError::Internal(anyhow::anyhow!("Failed to read chat file: {}", e)))?;
    import(&text)
}

fn has_text(value: Option<&Value>) -> bool {
    matches!(value.and_then(Value::as_str), Some(s) if !s.is_empty())
}
