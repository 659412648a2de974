//! Chat database operations
//!
//! Handles all database interactions for stored chats. Each chat is one row
//! keyed by its unique name; the array-valued fields are JSON-encoded into
//! TEXT columns and decoded losslessly on read.

use crate::chat::models::{ChatMessage, ChatRecord};
use crate::error::ChatError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

/// A stored chat row with the array columns still JSON-encoded
#[derive(FromRow)]
struct ChatRow {
    name: String,
    created_at: i64,
    messages: String,
    reply_times: String,
    addressed_models: String,
    instructions: String,
}

impl ChatRow {
    fn decode(self) -> Result<ChatRecord, ChatError> {
        let messages: Vec<ChatMessage> = decode_column(&self.messages, &self.name, "messages")?;
        let reply_times: Vec<f64> = decode_column(&self.reply_times, &self.name, "reply_times")?;
        let addressed_models: Vec<String> =
            decode_column(&self.addressed_models, &self.name, "addressed_models")?;

        Ok(ChatRecord {
            name: self.name,
            created_at: self.created_at,
            messages,
            reply_times,
            addressed_models,
            instructions: self.instructions,
        })
    }
}

fn decode_column<T: serde::de::DeserializeOwned>(
    raw: &str,
    name: &str,
    column: &str,
) -> Result<T, ChatError> {
    serde_json::from_str(raw).map_err(|e| {
        ChatError::Internal(anyhow::anyhow!(
            "Corrupt {} column for chat '{}': {}",
            column,
            name,
            e
        ))
    })
}

fn encode_column<T: serde::Serialize>(value: &T) -> Result<String, ChatError> {
    serde_json::to_string(value)
        .map_err(|e| ChatError::Internal(anyhow::anyhow!("Failed to encode chat column: {}", e)))
}

/// Database connection pool for chat storage
#[derive(Clone)]
pub struct ChatDb {
    pool: SqlitePool,
}

impl ChatDb {
    /// Initialize database connection pool
    ///
    /// Creates the database file (and its parent directory) when missing and
    /// runs the idempotent schema migration.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    ///
    /// # Returns
    /// * `Ok(ChatDb)` if successful
    /// * `Err(ChatError)` if the database could not be opened
    pub async fn new(db_path: &str) -> Result<Self, ChatError> {
        // Ensure parent directory exists
        if let Some(parent) = PathBuf::from(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ChatError::Internal(anyhow::anyhow!("Failed to create db directory: {}", e))
            })?;
        }

        // SQLite connection string format: sqlite://path/to/db.db
        let connection_string = if db_path.starts_with("sqlite:") {
            db_path.to_string()
        } else {
            format!("sqlite:{}", db_path)
        };

        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| ChatError::Internal(anyhow::anyhow!("Invalid database path: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                ChatError::Internal(anyhow::anyhow!("Failed to connect to database: {}", e))
            })?;

        info!("Connected to SQLite database at: {}", db_path);

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), ChatError> {
        info!("Running database migrations...");

        let migration_sql = include_str!("../../migrations/001_create_chats.sql");

        // Remove comments (lines starting with --) and normalize whitespace
        let mut cleaned_sql = String::new();
        for line in migration_sql.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }
            let without_comments = if let Some(comment_pos) = trimmed.find("--") {
                &trimmed[..comment_pos]
            } else {
                trimmed
            };
            cleaned_sql.push_str(without_comments.trim());
            cleaned_sql.push(' ');
        }

        let statements: Vec<&str> = cleaned_sql
            .split(';')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        for statement in statements {
            if let Err(e) = sqlx::query(statement).execute(&self.pool).await {
                // The ALTER TABLE upgrade step fails once the column exists
                if e.to_string().contains("duplicate column name") {
                    debug!("Skipping already-applied migration statement");
                    continue;
                }
                return Err(ChatError::Internal(anyhow::anyhow!(
                    "Migration failed: {} - Statement: {}",
                    e,
                    statement.chars().take(100).collect::<String>()
                )));
            }
        }

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Insert a new chat
    ///
    /// Fails with `DuplicateName` when the name is already taken; the stored
    /// row is unchanged by the failed attempt.
    pub async fn create(&self, record: &ChatRecord) -> Result<(), ChatError> {
        let messages = encode_column(&record.messages)?;
        let reply_times = encode_column(&record.reply_times)?;
        let addressed_models = encode_column(&record.addressed_models)?;

        sqlx::query(
            "INSERT INTO chats (name, created_at, messages, reply_times, addressed_models, instructions) VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(&record.name)
        .bind(record.created_at)
        .bind(messages)
        .bind(reply_times)
        .bind(addressed_models)
        .bind(&record.instructions)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return ChatError::DuplicateName(record.name.clone());
                }
            }
            ChatError::Internal(anyhow::anyhow!("Failed to create chat: {}", e))
        })?;

        debug!("Created chat: {}", record.name);
        Ok(())
    }

    /// Fetch a chat by name
    pub async fn read(&self, name: &str) -> Result<ChatRecord, ChatError> {
        let row = sqlx::query_as::<_, ChatRow>(
            "SELECT name, created_at, messages, reply_times, addressed_models, instructions FROM chats WHERE name = ?"
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ChatError::Internal(anyhow::anyhow!("Failed to fetch chat: {}", e)))?;

        match row {
            Some(row) => row.decode(),
            None => Err(ChatError::NotFound(name.to_string())),
        }
    }

    /// Overwrite the mutable fields of an existing chat
    ///
    /// `name` and `created_at` never change after creation. Updating a name
    /// that is not stored fails with `NotFound`.
    pub async fn update(&self, record: &ChatRecord) -> Result<(), ChatError> {
        let messages = encode_column(&record.messages)?;
        let reply_times = encode_column(&record.reply_times)?;
        let addressed_models = encode_column(&record.addressed_models)?;

        let result = sqlx::query(
            "UPDATE chats SET messages = ?, reply_times = ?, addressed_models = ?, instructions = ? WHERE name = ?"
        )
        .bind(messages)
        .bind(reply_times)
        .bind(addressed_models)
        .bind(&record.instructions)
        .bind(&record.name)
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::Internal(anyhow::anyhow!("Failed to update chat: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(ChatError::NotFound(record.name.clone()));
        }

        debug!("Updated chat: {}", record.name);
        Ok(())
    }

    /// Delete a chat; deleting a missing name is a no-op
    pub async fn delete(&self, name: &str) -> Result<(), ChatError> {
        sqlx::query("DELETE FROM chats WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::Internal(anyhow::anyhow!("Failed to delete chat: {}", e)))?;

        debug!("Deleted chat: {}", name);
        Ok(())
    }

    /// List the names of all stored chats, in no guaranteed order
    pub async fn list_names(&self) -> Result<Vec<String>, ChatError> {
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM chats")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ChatError::Internal(anyhow::anyhow!("Failed to list chats: {}", e)))?;

        Ok(names)
    }

    /// Delete every stored chat
    pub async fn clear_all(&self) -> Result<(), ChatError> {
        sqlx::query("DELETE FROM chats")
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::Internal(anyhow::anyhow!("Failed to clear chats: {}", e)))?;

        info!("Cleared all chats");
        Ok(())
    }

    /// Drop and recreate the schema, discarding all stored chats
    pub async fn reset_schema(&self) -> Result<(), ChatError> {
        sqlx::query("DROP TABLE IF EXISTS chats")
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::Internal(anyhow::anyhow!("Failed to drop chats table: {}", e)))?;

        self.run_migrations().await?;

        info!("Database schema reset");
        Ok(())
    }
}
