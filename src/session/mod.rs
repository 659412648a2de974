//! Conversation sessions
//!
//! The session manager drives chat records through their lifecycle; the
//! dispatcher runs inference requests on background workers.

pub mod dispatch;
pub mod manager;

pub use dispatch::{ReplyDispatcher, ReplyOutcome};
pub use manager::{AssistantReply, SessionManager};
