//! `ensemble`: a conversation orchestration core for a multi-model AI
//! coding assistant — mention parsing and routing, parallel speaker
//! election, per-participant context assembly, sequential turn execution
//! with a tool-calling loop, and persistence with rolling summarization.

pub mod context;
pub mod cost;
pub mod excerpts;
pub mod mentions;
pub mod model;
pub mod persistence;
pub mod provider;
pub mod speaker;
pub mod summarizer;
pub mod tools;
pub mod turn;

pub mod config;

pub use model::{
    Message, Participant, Role, Session, SpeakerDecision, Summary, SummaryKind, ToolInvocation,
    ToolResult, Usage,
};
pub use turn::{Event, TurnError, TurnExecutor, TurnExecutorConfig};
