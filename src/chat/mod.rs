//! Chat module
//!
//! Chat records, their SQLite storage, and the portable JSON chat document
//! codec used for import/export.

pub mod codec;
pub mod db;
pub mod models;

pub use db::ChatDb;
pub use models::{ChatMessage, ChatRecord, MessageRole};
