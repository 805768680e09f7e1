//! Tool loop: for one speaker whose model returned a tool-use finish
//! reason, execute invocations, collect results, re-prompt the model,
//! and repeat until a normal completion or the iteration limit.
//!
//! Validate → execute → smart-excerpt → continue loop, capped at a
//! fixed iteration count, driven through the `ModelClient` /
//! `ToolRegistry` / `PermissionManager` interfaces.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use tokio::sync::{mpsc, oneshot};

use crate::model::{Message, ToolInvocation, ToolResult};
use crate::provider::{GenerateRequest, ModelClient, ModelResponse, StreamChunk, WireMessage};
use crate::tools::{PermissionDecision, PermissionLevel, PermissionManager, ToolRegistry};
use crate::turn::events::{ErrorKind, Event};

/// Default cap on tool-loop iterations for one speaker.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Default per-call tool execution deadline.
pub const DEFAULT_TOOL_DEADLINE: Duration = Duration::from_secs(30);

/// The UI collaborator's answer to a pending tool permission request.
#[derive(Debug, Clone, Copy)]
pub struct PermissionReply {
    pub allow: bool,
    pub remember_for_session: bool,
}

/// Asks the UI collaborator to resolve a pending permission request and
/// awaits its reply. The core blocks cooperatively on this at its next
/// suspension point.
pub type PermissionRequestSender = mpsc::Sender<(Event, oneshot::Sender<PermissionReply>)>;

/// Everything the tool loop needs beyond the conversation itself.
pub struct ToolLoopContext {
    pub session_id: Uuid,
    pub participant: String,
    pub client: Arc<dyn ModelClient>,
    pub registry: Arc<ToolRegistry>,
    pub permissions: Arc<dyn PermissionManager>,
    pub tool_deadline: Duration,
    pub max_iterations: usize,
}

fn validate_args(parameters: &serde_json::Value, args: &serde_json::Value) -> Result<(), String> {
    let Some(required) = parameters.get("required").and_then(|v| v.as_array()) else {
        return Ok(());
    };
    let Some(obj) = args.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };
    for field in required {
        let Some(name) = field.as_str() else { continue };
        if !obj.contains_key(name) {
            return Err(format!("missing required argument \"{name}\""));
        }
    }
    Ok(())
}

async fn resolve_permission(
    ctx: &ToolLoopContext,
    invocation: &ToolInvocation,
    level: PermissionLevel,
    events: &mpsc::Sender<Event>,
    requests: Option<&PermissionRequestSender>,
) -> PermissionDecision {
    let decision = ctx
        .permissions
        .check(ctx.session_id, &ctx.participant, &invocation.name, level)
        .await;

    if decision != PermissionDecision::Ask {
        return decision;
    }

    let request_event = Event::ToolPermissionRequest {
        participant: ctx.participant.clone(),
        invocation: invocation.clone(),
        level: Some(level),
    };

    let Some(requests) = requests else {
        // No UI collaborator wired up: the conservative answer is deny,
        // since approving without a UI to ask would defeat the point of
        // the permission level in the first place.
        let _ = events.send(request_event).await;
        return PermissionDecision::Deny;
    };

    let _ = events.send(request_event).await;
    let (reply_tx, reply_rx) = oneshot::channel();
    if requests.send((Event::Thinking, reply_tx)).await.is_err() {
        return PermissionDecision::Deny;
    }
    match reply_rx.await {
        Ok(reply) => {
            ctx.permissions.record(ctx.session_id, &invocation.name, reply.allow);
            if reply.allow {
                PermissionDecision::Approve
            } else {
                PermissionDecision::Deny
            }
        }
        Err(_) => PermissionDecision::Deny,
    }
}

async fn execute_one_invocation(
    ctx: &ToolLoopContext,
    invocation: &ToolInvocation,
    events: &mpsc::Sender<Event>,
    requests: Option<&PermissionRequestSender>,
) -> ToolResult {
    let _ = events
        .send(Event::ToolCall { participant: ctx.participant.clone(), invocation: invocation.clone() })
        .await;

    let Some(descriptor) = ctx.registry.descriptor(&invocation.name) else {
        let result = ToolResult {
            invocation_id: invocation.id.clone(),
            content: "unknown_tool".to_string(),
            is_error: true,
        };
        let _ = events
            .send(Event::ToolResult { participant: ctx.participant.clone(), result: result.clone() })
            .await;
        return result;
    };

    if let Err(reason) = validate_args(&descriptor.parameters, &invocation.arguments) {
        let result = ToolResult { invocation_id: invocation.id.clone(), content: reason, is_error: true };
        let _ = events
            .send(Event::ToolResult { participant: ctx.participant.clone(), result: result.clone() })
            .await;
        return result;
    }

    match resolve_permission(ctx, invocation, descriptor.permission_level, events, requests).await {
        PermissionDecision::Deny => {
            let result = ToolResult {
                invocation_id: invocation.id.clone(),
                content: "permission denied".to_string(),
                is_error: true,
            };
            let _ = events
                .send(Event::ToolResult { participant: ctx.participant.clone(), result: result.clone() })
                .await;
            result
        }
        PermissionDecision::Approve => {
            let _ = events
                .send(Event::ToolExecuting {
                    participant: ctx.participant.clone(),
                    invocation_id: invocation.id.clone(),
                })
                .await;

            let outcome = ctx
                .registry
                .execute(&invocation.name, &invocation.arguments, ctx.tool_deadline)
                .await;

            let result = match outcome {
                Ok(content) => ToolResult { invocation_id: invocation.id.clone(), content, is_error: false },
                Err(reason) => ToolResult { invocation_id: invocation.id.clone(), content: reason, is_error: true },
            };

            let _ = events
                .send(Event::ToolResult { participant: ctx.participant.clone(), result: result.clone() })
                .await;
            result
        }
        // Ask should have been resolved by resolve_permission already;
        // treated as a denial if it somehow falls through.
        PermissionDecision::Ask => ToolResult {
            invocation_id: invocation.id.clone(),
            content: "permission denied".to_string(),
            is_error: true,
        },
    }
}

/// Re-prompt the model as a fresh streaming call, draining chunks into
/// `ResponseChunk` events exactly as the initial call does, so post-tool
/// continuation text reaches the UI collaborator incrementally instead of
/// arriving as one block on the next iteration.
async fn stream_continuation(
    client: &Arc<dyn ModelClient>,
    participant: &str,
    request: GenerateRequest,
    events: &mpsc::Sender<Event>,
) -> anyhow::Result<ModelResponse> {
    let mut rx = client.generate_stream(request).await?;
    let mut text = String::new();

    loop {
        let Some(chunk) = rx.recv().await else {
            anyhow::bail!("stream ended without a completion");
        };
        match chunk {
            StreamChunk::TextDelta(delta) => {
                if !delta.is_empty() {
                    text.push_str(&delta);
                    let _ = events
                        .send(Event::ResponseChunk { participant: participant.to_string(), text: delta })
                        .await;
                }
            }
            StreamChunk::ToolCallStart { .. }
            | StreamChunk::ToolCallArgsDelta { .. }
            | StreamChunk::ToolCallEnd { .. } => {
                // Full tool-call shape arrives authoritatively in `Done`.
            }
            StreamChunk::Done(mut response) => {
                if response.text.is_empty() {
                    response.text = text;
                }
                return Ok(response);
            }
            StreamChunk::Error(message) => anyhow::bail!(message),
        }
    }
}

/// The outcome of running the tool loop to completion for one speaker.
pub struct ToolLoopOutcome {
    pub final_response: ModelResponse,
    pub tool_messages: Vec<Message>,
    pub hit_iteration_limit: bool,
}

/// Run the tool loop starting from a model response that requested tool
/// use. `base_request` is the `GenerateRequest` used for the speaker's
/// most recent call; each iteration appends the tool results and calls
/// the model again with `reassemble` supplying a freshly-assembled
/// request (so context reflects the new tool-role message, per §4.3).
pub async fn run_tool_loop(
    ctx: &ToolLoopContext,
    mut current_response: ModelResponse,
    mut reassemble: impl FnMut(&[Message]) -> GenerateRequest,
    events: mpsc::Sender<Event>,
    requests: Option<PermissionRequestSender>,
) -> ToolLoopOutcome {
    let mut tool_messages = Vec::new();
    let mut iterations = 0;
    let mut hit_limit = false;

    loop {
        if current_response.tool_calls.is_empty() {
            break;
        }

        if iterations >= ctx.max_iterations {
            hit_limit = true;
            let _ = events
                .send(Event::Error {
                    participant: Some(ctx.participant.clone()),
                    kind: ErrorKind::TurnLimit,
                    message: "tool iteration limit reached".to_string(),
                    recoverable: true,
                })
                .await;
            break;
        }
        iterations += 1;

        let mut results = Vec::new();
        for invocation in &current_response.tool_calls {
            let result = execute_one_invocation(ctx, invocation, &events, requests.as_ref()).await;
            results.push(result);
        }

        let tool_message = Message::new_tool(ctx.session_id, ctx.participant.clone(), results);
        tool_messages.push(tool_message);

        let request = reassemble(&tool_messages);
        current_response = match stream_continuation(&ctx.client, &ctx.participant, request, &events).await {
            Ok(response) => response,
            Err(e) => {
                let _ = events
                    .send(Event::Error {
                        participant: Some(ctx.participant.clone()),
                        kind: ErrorKind::Transport,
                        message: e.to_string(),
                        recoverable: true,
                    })
                    .await;
                break;
            }
        };
    }

    ToolLoopOutcome { final_response: current_response, tool_messages, hit_iteration_limit: hit_limit }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolInvocation;
    use crate::provider::{FinishReason, ModelUsage, StreamChunk};
    use crate::tools::builtin::ReadFileTool;
    use crate::tools::permission::DefaultPermissionManager;
    use async_trait::async_trait;

    struct ScriptedClient {
        responses: std::sync::Mutex<Vec<ModelResponse>>,
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn generate(&self, _request: GenerateRequest) -> anyhow::Result<ModelResponse> {
            let mut responses = self.responses.lock().unwrap();
            Ok(responses.remove(0))
        }

        async fn generate_stream(
            &self,
            _request: GenerateRequest,
        ) -> anyhow::Result<mpsc::Receiver<StreamChunk>> {
            let response = self.responses.lock().unwrap().remove(0);
            let (tx, rx) = mpsc::channel(8);
            tokio::spawn(async move {
                let _ = tx.send(StreamChunk::Done(response)).await;
            });
            Ok(rx)
        }

        fn count_tokens(&self, text: &str) -> u32 {
            text.len() as u32
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn plain_response(text: &str) -> ModelResponse {
        ModelResponse {
            text: text.to_string(),
            tool_calls: Vec::new(),
            usage: ModelUsage::default(),
            finish_reason: FinishReason::Stop,
        }
    }

    fn tool_call_response(invocation: ToolInvocation) -> ModelResponse {
        ModelResponse {
            text: String::new(),
            tool_calls: vec![invocation],
            usage: ModelUsage::default(),
            finish_reason: FinishReason::ToolUse,
        }
    }

    #[tokio::test]
    async fn unknown_tool_short_circuits_without_permission_check() {
        let registry = Arc::new(ToolRegistry::new());
        let permissions = Arc::new(DefaultPermissionManager::new());
        let client = Arc::new(ScriptedClient {
            responses: std::sync::Mutex::new(vec![plain_response("done")]),
        });

        let ctx = ToolLoopContext {
            session_id: Uuid::new_v4(),
            participant: "claude".to_string(),
            client: client.clone(),
            registry,
            permissions,
            tool_deadline: Duration::from_secs(1),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        };

        let invocation = ToolInvocation { id: "1".to_string(), name: "does_not_exist".to_string(), arguments: serde_json::json!({}) };
        let start = tool_call_response(invocation);

        let (tx, mut rx) = mpsc::channel(32);
        let outcome = run_tool_loop(&ctx, start, |_| GenerateRequest {
            messages: vec![WireMessage { role: "user".to_string(), content: "continue".to_string() }],
            tools: Vec::new(),
            max_tokens: 100,
            temperature: 0.0,
        }, tx, None).await;

        assert_eq!(outcome.final_response.text, "done");
        assert!(!outcome.hit_iteration_limit);

        let mut saw_unknown = false;
        while let Ok(event) = rx.try_recv() {
            if let Event::ToolResult { result, .. } = event {
                if result.content == "unknown_tool" {
                    saw_unknown = true;
                }
            }
        }
        assert!(saw_unknown);
    }

    #[tokio::test]
    async fn safe_tool_executes_without_asking() {
        let mut registry = ToolRegistry::new();
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "hi").await.unwrap();
        registry.register(Arc::new(ReadFileTool { cwd: dir.path().to_path_buf() }));

        let permissions = Arc::new(DefaultPermissionManager::new());
        let client = Arc::new(ScriptedClient {
            responses: std::sync::Mutex::new(vec![plain_response("ok")]),
        });

        let ctx = ToolLoopContext {
            session_id: Uuid::new_v4(),
            participant: "claude".to_string(),
            client,
            registry: Arc::new(registry),
            permissions,
            tool_deadline: Duration::from_secs(1),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        };

        let invocation = ToolInvocation {
            id: "1".to_string(),
            name: "read_file".to_string(),
            arguments: serde_json::json!({"path": "a.txt"}),
        };
        let start = tool_call_response(invocation);

        let (tx, mut rx) = mpsc::channel(32);
        let outcome = run_tool_loop(&ctx, start, |_| GenerateRequest {
            messages: vec![WireMessage { role: "user".to_string(), content: "continue".to_string() }],
            tools: Vec::new(),
            max_tokens: 100,
            temperature: 0.0,
        }, tx, None).await;

        assert_eq!(outcome.final_response.text, "ok");

        let mut saw_success = false;
        while let Ok(event) = rx.try_recv() {
            if let Event::ToolResult { result, .. } = event {
                if !result.is_error && result.content == "hi" {
                    saw_success = true;
                }
            }
        }
        assert!(saw_success);
    }

    #[tokio::test]
    async fn dangerous_tool_without_ui_collaborator_is_denied() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(crate::tools::builtin::RunShellTool { cwd: std::env::temp_dir() }));
        let permissions = Arc::new(DefaultPermissionManager::new());
        let client = Arc::new(ScriptedClient {
            responses: std::sync::Mutex::new(vec![plain_response("ok")]),
        });

        let ctx = ToolLoopContext {
            session_id: Uuid::new_v4(),
            participant: "claude".to_string(),
            client,
            registry: Arc::new(registry),
            permissions,
            tool_deadline: Duration::from_secs(1),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        };

        let invocation = ToolInvocation {
            id: "1".to_string(),
            name: "run_shell".to_string(),
            arguments: serde_json::json!({"command": "echo hi"}),
        };
        let start = tool_call_response(invocation);

        let (tx, mut rx) = mpsc::channel(32);
        let _ = run_tool_loop(&ctx, start, |_| GenerateRequest {
            messages: vec![WireMessage { role: "user".to_string(), content: "continue".to_string() }],
            tools: Vec::new(),
            max_tokens: 100,
            temperature: 0.0,
        }, tx, None).await;

        let mut saw_denied = false;
        while let Ok(event) = rx.try_recv() {
            if let Event::ToolResult { result, .. } = event {
                if result.is_error && result.content == "permission denied" {
                    saw_denied = true;
                }
            }
        }
        assert!(saw_denied);
    }

    #[tokio::test]
    async fn iteration_limit_stops_the_loop() {
        let mut registry = ToolRegistry::new();
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "hi").await.unwrap();
        registry.register(Arc::new(ReadFileTool { cwd: dir.path().to_path_buf() }));
        let permissions = Arc::new(DefaultPermissionManager::new());

        // Always return another tool call so the loop never stops
        // naturally; the limit must be what ends it.
        let invocation = ToolInvocation {
            id: "1".to_string(),
            name: "read_file".to_string(),
            arguments: serde_json::json!({"path": "a.txt"}),
        };
        let mut responses = Vec::new();
        for _ in 0..20 {
            responses.push(tool_call_response(invocation.clone()));
        }
        let client = Arc::new(ScriptedClient { responses: std::sync::Mutex::new(responses) });

        let ctx = ToolLoopContext {
            session_id: Uuid::new_v4(),
            participant: "claude".to_string(),
            client,
            registry: Arc::new(registry),
            permissions,
            tool_deadline: Duration::from_secs(1),
            max_iterations: 3,
        };

        let start = tool_call_response(invocation);
        let (tx, _rx) = mpsc::channel(64);
        let outcome = run_tool_loop(&ctx, start, |_| GenerateRequest {
            messages: vec![WireMessage { role: "user".to_string(), content: "continue".to_string() }],
            tools: Vec::new(),
            max_tokens: 100,
            temperature: 0.0,
        }, tx, None).await;

        assert!(outcome.hit_iteration_limit);
        assert_eq!(outcome.tool_messages.len(), 3);
    }
}
