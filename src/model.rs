//! Core data model: participants, messages, sessions, summaries, tool calls.
//!
//! Mirrors the invariants in the orchestration spec: messages are
//! append-only and strictly ordered by creation time within a session;
//! `pinned` is the only attribute that may change after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A configured model acting as a group-chat member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub color: String,
    pub enabled: bool,
    /// Per-model token budget for context assembly.
    pub max_tokens: u32,
    pub temperature: f32,
}

/// One of the four roles a message can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// Token/cost accounting attached to a generated message.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_estimate: f64,
}

/// A single schema-validated tool call emitted by a model mid-generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The outcome of executing a `ToolInvocation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub invocation_id: String,
    pub content: String,
    pub is_error: bool,
}

/// An immutable, append-only record within a session.
///
/// `pinned` is the one field that may be mutated after creation (via
/// `Persistence::set_pin`); everything else is fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    /// The participant that authored this message, for `assistant`/`tool`.
    pub author: Option<String>,
    pub content: String,
    pub tool_invocations: Vec<ToolInvocation>,
    pub tool_results: Vec<ToolResult>,
    pub usage: Usage,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    /// Set when a turn was cancelled mid-stream; the content up to that
    /// point is still persisted, marked as incomplete.
    pub truncated: bool,
}

impl Message {
    pub fn new_user(session_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role: Role::User,
            author: None,
            content: content.into(),
            tool_invocations: Vec::new(),
            tool_results: Vec::new(),
            usage: Usage::default(),
            pinned: false,
            created_at: Utc::now(),
            truncated: false,
        }
    }

    pub fn new_assistant(session_id: Uuid, author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role: Role::Assistant,
            author: Some(author.into()),
            content: content.into(),
            tool_invocations: Vec::new(),
            tool_results: Vec::new(),
            usage: Usage::default(),
            pinned: false,
            created_at: Utc::now(),
            truncated: false,
        }
    }

    pub fn new_tool(session_id: Uuid, author: impl Into<String>, results: Vec<ToolResult>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role: Role::Tool,
            author: Some(author.into()),
            content: String::new(),
            tool_invocations: Vec::new(),
            tool_results: results,
            usage: Usage::default(),
            pinned: false,
            created_at: Utc::now(),
            truncated: false,
        }
    }

    pub fn new_system(session_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role: Role::System,
            author: None,
            content: content.into(),
            tool_invocations: Vec::new(),
            tool_results: Vec::new(),
            usage: Usage::default(),
            pinned: false,
            created_at: Utc::now(),
            truncated: false,
        }
    }
}

/// A logical conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub name: Option<String>,
    pub project_root: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub archived: bool,
}

impl Session {
    pub fn new(name: Option<String>, project_root: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            project_root,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
            archived: false,
        }
    }
}

/// Kind of summary: incremental (covers a subrange) or full (the whole
/// history up to this point).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryKind {
    Incremental,
    Full,
}

/// A compressed textual stand-in for a contiguous range of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: SummaryKind,
    pub content: String,
    pub first_message_id: Uuid,
    pub last_message_id: Uuid,
    pub token_count: u32,
    pub created_at: DateTime<Utc>,
}

/// The evaluator's verdict for one participant in one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerDecision {
    pub participant_id: String,
    pub should_speak: bool,
    pub confidence: f32,
    pub reason: String,
    pub forced: bool,
}

impl SpeakerDecision {
    pub fn forced_speak(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            should_speak: true,
            confidence: 1.0,
            reason: "forced".into(),
            forced: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_unique() {
        let sid = Uuid::new_v4();
        let a = Message::new_user(sid, "hi");
        let b = Message::new_user(sid, "hi");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn new_session_is_not_archived() {
        let s = Session::new(None, None);
        assert!(!s.archived);
        assert_eq!(s.created_at, s.updated_at);
    }
}
