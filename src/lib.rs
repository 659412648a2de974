//! llama-desk library
//!
//! Chat persistence, import/export, session management and inference
//! plumbing for a local-model chat client. The interactive binary lives in
//! `src/main.rs`.

pub mod chat;
pub mod config;
pub mod error;
pub mod inference;
pub mod session;
