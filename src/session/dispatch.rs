//! Background reply dispatch
//!
//! Runs inference requests on a small pool of worker tasks so the
//! interactive loop never blocks on the model. At most one request per chat
//! may be outstanding at a time; requests for different chats run
//! concurrently up to the worker bound.

use crate::chat::models::ChatRecord;
use crate::error::ChatError;
use crate::session::manager::{AssistantReply, SessionManager};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{debug, warn};

/// Outcome of one background inference request
///
/// Carries the transcript snapshot the request was dispatched with, so the
/// receiver can record the reply against exactly what the model saw.
#[derive(Debug)]
pub struct ReplyOutcome {
    /// The chat as it was dispatched, without the reply applied yet
    pub record: ChatRecord,
    /// Model that was addressed
    pub model: String,
    /// The reply, or the error the service produced
    pub result: Result<AssistantReply, ChatError>,
}

/// Bounded worker pool for inference requests
pub struct ReplyDispatcher {
    manager: SessionManager,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    outcomes: mpsc::Sender<ReplyOutcome>,
}

impl ReplyDispatcher {
    /// Create a dispatcher with `workers` concurrent request slots
    ///
    /// Returns the dispatcher and the channel on which outcomes arrive.
    pub fn new(
        manager: SessionManager,
        workers: usize,
    ) -> (Self, mpsc::Receiver<ReplyOutcome>) {
        let (tx, rx) = mpsc::channel(32);
        let dispatcher = Self {
            manager,
            permits: Arc::new(Semaphore::new(workers)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            outcomes: tx,
        };
        (dispatcher, rx)
    }

    /// Whether a chat currently has a request outstanding
    pub async fn is_pending(&self, name: &str) -> bool {
        self.in_flight.lock().await.contains(name)
    }

    /// Queue a background reply request for a chat
    ///
    /// Snapshots the record as it is now; the caller applies the outcome
    /// when it arrives on the channel. Fails with `ReplyPending` when the
    /// chat already has a request outstanding.
    pub async fn dispatch(&self, record: &ChatRecord, model: &str) -> Result<(), ChatError> {
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(record.name.clone()) {
                return Err(ChatError::ReplyPending(record.name.clone()));
            }
        }

        debug!(name = %record.name, model = %model, "Dispatching reply request");

        let manager = self.manager.clone();
        let permits = Arc::clone(&self.permits);
        let in_flight = Arc::clone(&self.in_flight);
        let outcomes = self.outcomes.clone();
        let snapshot = record.clone();
        let model = model.to_string();

        tokio::spawn(async move {
            let result = match permits.acquire().await {
                Ok(_permit) => manager.request_assistant_reply(&snapshot, &model).await,
                Err(_) => Err(ChatError::Internal(anyhow::anyhow!(
                    "Dispatcher worker pool is shut down"
                ))),
            };

            // The in-flight slot must be free before the outcome is visible,
            // so the receiver can immediately dispatch a follow-up
            in_flight.lock().await.remove(&snapshot.name);

            let outcome = ReplyOutcome {
                record: snapshot,
                model,
                result,
            };
            if outcomes.send(outcome).await.is_err() {
                warn!("Reply outcome dropped: receiver closed");
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::db::ChatDb;
    use crate::chat::models::{ChatMessage, MessageRole};
    use crate::inference::{InferenceError, InferenceService};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Service that sleeps before answering, to keep requests in flight
    struct SlowService {
        delay: Duration,
    }

    #[async_trait]
    impl InferenceService for SlowService {
        async fn chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
        ) -> Result<ChatMessage, InferenceError> {
            tokio::time::sleep(self.delay).await;
            Ok(ChatMessage::new(MessageRole::Assistant, "ok".to_string()))
        }

        async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
            Ok(Vec::new())
        }
    }

    struct FailingService;

    #[async_trait]
    impl InferenceService for FailingService {
        async fn chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
        ) -> Result<ChatMessage, InferenceError> {
            Err(InferenceError::InvalidResponse("boom".to_string()))
        }

        async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
            Ok(Vec::new())
        }
    }

    async fn create_manager(
        service: Arc<dyn InferenceService>,
    ) -> (SessionManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = ChatDb::new(db_path.to_str().unwrap()).await.unwrap();
        (SessionManager::new(db, service), temp_dir)
    }

    #[tokio::test]
    async fn test_second_dispatch_for_same_chat_is_rejected() {
        let service = Arc::new(SlowService {
            delay: Duration::from_millis(200),
        });
        let (manager, _temp_dir) = create_manager(service).await;
        let record = manager.start_new_conversation("Demo").await.unwrap();
        let (dispatcher, mut outcomes) = ReplyDispatcher::new(manager, 2);

        dispatcher.dispatch(&record, "m1").await.unwrap();
        assert!(dispatcher.is_pending("Demo").await);

        match dispatcher.dispatch(&record, "m1").await {
            Err(ChatError::ReplyPending(name)) => assert_eq!(name, "Demo"),
            other => panic!("Expected ReplyPending, got: {:?}", other),
        }

        // After the outcome arrives the chat can dispatch again
        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.record.name, "Demo");
        assert!(!dispatcher.is_pending("Demo").await);
        dispatcher.dispatch(&record, "m1").await.unwrap();
        outcomes.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_outcome_carries_reply_and_snapshot() {
        let service = Arc::new(SlowService {
            delay: Duration::from_millis(10),
        });
        let (manager, _temp_dir) = create_manager(service).await;
        let mut record = manager.start_new_conversation("Demo").await.unwrap();
        manager.submit_user_turn(&mut record, "Hello").unwrap();
        let (dispatcher, mut outcomes) = ReplyDispatcher::new(manager, 2);

        dispatcher.dispatch(&record, "m1").await.unwrap();
        let outcome = outcomes.recv().await.unwrap();

        assert_eq!(outcome.model, "m1");
        assert_eq!(outcome.record.messages.len(), 1);
        let reply = outcome.result.unwrap();
        assert_eq!(reply.content, "ok");
        assert!(reply.elapsed_secs >= 0.0);
    }

    #[tokio::test]
    async fn test_failure_outcome_clears_in_flight() {
        let (manager, _temp_dir) = create_manager(Arc::new(FailingService)).await;
        let record = manager.start_new_conversation("Demo").await.unwrap();
        let (dispatcher, mut outcomes) = ReplyDispatcher::new(manager, 2);

        dispatcher.dispatch(&record, "m1").await.unwrap();
        let outcome = outcomes.recv().await.unwrap();

        assert!(matches!(outcome.result, Err(ChatError::Inference(_))));
        assert!(!dispatcher.is_pending("Demo").await);
        dispatcher.dispatch(&record, "m1").await.unwrap();
        outcomes.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_different_chats_run_concurrently() {
        let service = Arc::new(SlowService {
            delay: Duration::from_millis(400),
        });
        let (manager, _temp_dir) = create_manager(service).await;
        let first = manager.start_new_conversation("first").await.unwrap();
        let second = manager.start_new_conversation("second").await.unwrap();
        let (dispatcher, mut outcomes) = ReplyDispatcher::new(manager, 2);

        let started = std::time::Instant::now();
        dispatcher.dispatch(&first, "m1").await.unwrap();
        dispatcher.dispatch(&second, "m1").await.unwrap();
        outcomes.recv().await.unwrap();
        outcomes.recv().await.unwrap();

        // Two 400ms requests on two workers overlap
        assert!(
            started.elapsed() < Duration::from_millis(750),
            "Requests did not run concurrently: {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn test_single_worker_serializes_requests() {
        let service = Arc::new(SlowService {
            delay: Duration::from_millis(150),
        });
        let (manager, _temp_dir) = create_manager(service).await;
        let first = manager.start_new_conversation("first").await.unwrap();
        let second = manager.start_new_conversation("second").await.unwrap();
        let (dispatcher, mut outcomes) = ReplyDispatcher::new(manager, 1);

        let started = std::time::Instant::now();
        dispatcher.dispatch(&first, "m1").await.unwrap();
        dispatcher.dispatch(&second, "m1").await.unwrap();
        outcomes.recv().await.unwrap();
        outcomes.recv().await.unwrap();

        assert!(
            started.elapsed() >= Duration::from_millis(300),
            "Requests overlapped despite a single worker: {:?}",
            started.elapsed()
        );
    }
}
