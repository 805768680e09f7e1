//! Persistence layer interface.
//!
//! A session-keyed, trait-based contract so the core can be tested
//! against an in-memory fake without a database.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Message, Session, Summary};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Durable record of sessions, messages, pins, and summaries.
/// All operations are idempotent under identical arguments keyed by
/// message/summary id; a batched append lands all messages or none.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn create_session(
        &self,
        name: Option<String>,
        project_root: Option<String>,
    ) -> Result<Session, PersistenceError>;

    async fn append_message(&self, message: &Message) -> Result<(), PersistenceError>;

    async fn append_messages_batch(&self, messages: &[Message]) -> Result<(), PersistenceError>;

    async fn set_pin(&self, message_id: Uuid, pinned: bool) -> Result<(), PersistenceError>;

    async fn load_messages(
        &self,
        session_id: Uuid,
        since: Option<chrono::DateTime<chrono::Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, PersistenceError>;

    async fn search(
        &self,
        session_id: Option<Uuid>,
        query: &str,
    ) -> Result<Vec<Message>, PersistenceError>;

    async fn add_summary(&self, summary: &Summary) -> Result<(), PersistenceError>;

    async fn latest_summary(&self, session_id: Uuid) -> Result<Option<Summary>, PersistenceError>;
}
