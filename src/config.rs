//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat storage configuration
    pub storage: StorageConfig,
    /// Inference service configuration
    pub inference: InferenceConfig,
    /// Inference server process configuration
    pub server: ServerConfig,
    /// Background dispatch configuration
    pub dispatch: DispatchConfig,
}

/// Chat storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub db_path: String,
}

/// Inference service configuration
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base URL of the inference server
    pub base_url: String,
    /// Request timeout in seconds; local models can be slow on large prompts
    pub request_timeout_secs: u64,
    /// Model addressed until the user picks another one
    pub default_model: String,
}

/// Inference server process configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Spawn the server on startup when true
    pub autostart: bool,
    /// Command used to launch the server
    pub command: String,
    /// Arguments passed to the command
    pub args: Vec<String>,
    /// Seconds to wait after spawning before the first request
    pub startup_wait_secs: u64,
    /// Seconds to wait for the server to exit before killing it
    pub shutdown_grace_secs: u64,
}

/// Background dispatch configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of concurrent inference requests
    pub workers: usize,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            storage: StorageConfig {
                db_path: env::var("LLAMA_DESK_DB").unwrap_or_else(|_| {
                    // Default to ~/.llama-desk or current directory
                    if let Some(home) = env::var_os("HOME") {
                        format!("{}/.llama-desk/chats.db", home.to_string_lossy())
                    } else {
                        ".llama-desk/chats.db".to_string()
                    }
                }),
            },
            inference: InferenceConfig {
                base_url: env::var("OLLAMA_URL")
                    .unwrap_or_else(|_| crate::inference::client::DEFAULT_BASE_URL.to_string()),
                request_timeout_secs: env::var("OLLAMA_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(300),
                default_model: env::var("LLAMA_DESK_MODEL")
                    .unwrap_or_else(|_| "llama3.1".to_string()),
            },
            server: ServerConfig {
                autostart: env::var("OLLAMA_AUTOSTART")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(false),
                command: env::var("OLLAMA_COMMAND").unwrap_or_else(|_| "ollama".to_string()),
                args: env::var("OLLAMA_SERVE_ARGS")
                    .map(|args| args.split_whitespace().map(String::from).collect())
                    .unwrap_or_else(|_| vec!["serve".to_string()]),
                startup_wait_secs: env::var("OLLAMA_STARTUP_WAIT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(3),
                shutdown_grace_secs: env::var("OLLAMA_SHUTDOWN_GRACE_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(2),
            },
            dispatch: DispatchConfig {
                workers: env::var("LLAMA_DESK_WORKERS")
                    .ok()
                    .and_then(|w| w.parse().ok())
                    .unwrap_or(2),
            },
        }
    }
}
