//! The Turn Executor's event stream: a closed, tagged sum of variants
//! consumed by the UI collaborator.
//!
//! Generalized from a single-model chat stream to a multi-participant
//! one: every variant that can occur mid-response carries a
//! `participant` field, and the evaluation/announcement phase gets its
//! own dedicated variants.

use serde::{Deserialize, Serialize};

use crate::model::{ToolInvocation, ToolResult};
use crate::provider::ModelResponse;
use crate::tools::PermissionLevel;

/// The taxonomy of recoverable vs. fatal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Authentication,
    RateLimit,
    Validation,
    Permission,
    Parse,
    TurnLimit,
    Fatal,
}

/// One event in the turn's totally-ordered stream; emission is
/// serialized even though internal tasks run in parallel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "THINKING")]
    Thinking,

    #[serde(rename = "EVALUATING")]
    Evaluating { participant: String },

    #[serde(rename = "WILL_SPEAK")]
    WillSpeak { participant: String, confidence: f32, reason: String },

    #[serde(rename = "WILL_STAY_SILENT")]
    WillStaySilent { participant: String, reason: String },

    #[serde(rename = "RESPONSE_START")]
    ResponseStart { participant: String },

    #[serde(rename = "RESPONSE_CHUNK")]
    ResponseChunk { participant: String, text: String },

    #[serde(rename = "RESPONSE_COMPLETE")]
    ResponseComplete {
        participant: String,
        #[serde(skip)]
        response: Option<ModelResponse>,
    },

    #[serde(rename = "TOOL_CALL")]
    ToolCall { participant: String, invocation: ToolInvocation },

    #[serde(rename = "TOOL_EXECUTING")]
    ToolExecuting { participant: String, invocation_id: String },

    #[serde(rename = "TOOL_PERMISSION_REQUEST")]
    ToolPermissionRequest {
        participant: String,
        invocation: ToolInvocation,
        #[serde(skip)]
        level: Option<PermissionLevel>,
    },

    #[serde(rename = "TOOL_RESULT")]
    ToolResult { participant: String, result: ToolResult },

    #[serde(rename = "ERROR")]
    Error {
        participant: Option<String>,
        kind: ErrorKind,
        message: String,
        recoverable: bool,
    },

    #[serde(rename = "TURN_COMPLETE")]
    TurnComplete,
}
