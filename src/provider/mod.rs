//! Model Client collaborator interface.
//!
//! The core depends only on this trait. Transport, retry, and wire-format
//! translation belong to the implementation, not the core: one generic
//! trait object per configured participant, rather than one fixed
//! provider per file.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::model::ToolInvocation;

/// A chat message in the wire format the model client expects, already
/// translated from the core's `Message` by the Context Assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

/// A tool the model is allowed to call this turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Non-streaming generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub messages: Vec<WireMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolUse,
    Length,
}

/// Token accounting returned alongside a response.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A complete, non-streamed model response.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<ToolInvocation>,
    pub usage: ModelUsage,
    pub finish_reason: FinishReason,
}

/// One chunk of a streamed response.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    TextDelta(String),
    ToolCallStart { id: String, name: String },
    ToolCallArgsDelta { id: String, delta: String },
    ToolCallEnd { id: String },
    Done(ModelResponse),
    Error(String),
}

/// The Model Client collaborator: every provider implements `generate`,
/// `generate_stream`, `count_tokens`, `is_available`. Retry, backoff, and
/// wire translation are this trait's business, not the core's.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> anyhow::Result<ModelResponse>;

    async fn generate_stream(
        &self,
        request: GenerateRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamChunk>>;

    /// Token counting may use model-provided utilities and is allowed to
    /// be synchronous.
    fn count_tokens(&self, text: &str) -> u32;

    fn is_available(&self) -> bool;
}
