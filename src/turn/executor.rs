//! Turn Executor: the outer state machine of a turn.
//!
//! Drives mention parsing, the Speaker Evaluator, the Turn Manager's
//! ordering, and one Tool Loop per speaker, emitting a single
//! totally-ordered event stream. Phase transitions are recorded against
//! a small state enum, one collaborator call per phase, wrapping an
//! agentic loop per speaker: keep calling the model, handling tool
//! calls, until a plain completion. Generalized from "one fixed model,
//! one phase sequence" to "N participants, a serial speaker loop, a
//! tool loop per speaker."

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::assemble_context;
use crate::cost::{CostTracker, PricingTable};
use crate::mentions::parse_mentions;
use crate::model::{Message, Participant, SpeakerDecision, Summary};
use crate::persistence::{PersistenceError, PersistenceStore};
use crate::provider::{GenerateRequest, ModelClient, ModelResponse, StreamChunk};
use crate::speaker::evaluate_speakers;
use crate::summarizer::maybe_summarize;
use crate::tools::ToolRegistry;
use crate::tools::PermissionManager;
use crate::turn::events::{ErrorKind, Event};
use crate::turn::manager::{order_speakers, OrderingStrategy, RotationState};
use crate::turn::tool_loop::{
    run_tool_loop, PermissionRequestSender, ToolLoopContext, DEFAULT_MAX_ITERATIONS,
    DEFAULT_TOOL_DEADLINE,
};

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("unknown participant {0}")]
    UnknownParticipant(String),
}

/// Tunables the core consumes as configuration inputs, resolved by a
/// collaborator and handed to the executor as-is.
#[derive(Debug, Clone)]
pub struct TurnExecutorConfig {
    pub evaluation_deadline: Duration,
    pub silence_threshold: f32,
    pub tool_deadline: Duration,
    pub max_tool_iterations: usize,
    pub ordering_strategy: OrderingStrategy,
    pub fixed_order: Vec<String>,
    pub summarization_enabled: bool,
    pub summarization_threshold: u32,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for TurnExecutorConfig {
    fn default() -> Self {
        Self {
            evaluation_deadline: crate::speaker::DEFAULT_EVALUATION_DEADLINE,
            silence_threshold: crate::speaker::DEFAULT_SILENCE_THRESHOLD,
            tool_deadline: DEFAULT_TOOL_DEADLINE,
            max_tool_iterations: DEFAULT_MAX_ITERATIONS,
            ordering_strategy: OrderingStrategy::Confidence,
            fixed_order: Vec::new(),
            summarization_enabled: true,
            summarization_threshold: crate::summarizer::DEFAULT_SUMMARIZATION_THRESHOLD,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

fn build_system_prompt(participant: &Participant, tool_names: &[String]) -> String {
    let tool_line = if tool_names.is_empty() {
        "You have no tools available this turn.".to_string()
    } else {
        format!("Tools available to you: {}.", tool_names.join(", "))
    };
    format!(
        "You are {} (id: {}), one voice among several AI participants in a \
         shared group chat with a human user. Respond only as yourself; never \
         impersonate another participant or the user. {}",
        participant.display_name, participant.id, tool_line
    )
}

/// Per-session mutable state guarded by the single-turn-per-session
/// invariant: the `rotate` ordering strategy's index, and a lock that
/// serializes entry so at most one turn runs per session at a time.
#[derive(Default)]
struct SessionState {
    lock: Arc<Mutex<()>>,
    rotation: RotationState,
    cancel: Option<CancellationToken>,
}

/// The Turn Executor: the single entry point that drives a turn from a
/// user utterance to `TURN_COMPLETE`.
pub struct TurnExecutor {
    store: Arc<dyn PersistenceStore>,
    participants: Vec<Participant>,
    clients: HashMap<String, Arc<dyn ModelClient>>,
    tools: Arc<ToolRegistry>,
    permissions: Arc<dyn PermissionManager>,
    summarizer_client: Option<Arc<dyn ModelClient>>,
    config: TurnExecutorConfig,
    pricing: PricingTable,
    sessions: Mutex<HashMap<Uuid, Arc<Mutex<SessionState>>>>,
}

impl TurnExecutor {
    pub fn new(
        store: Arc<dyn PersistenceStore>,
        participants: Vec<Participant>,
        clients: HashMap<String, Arc<dyn ModelClient>>,
        tools: Arc<ToolRegistry>,
        permissions: Arc<dyn PermissionManager>,
        summarizer_client: Option<Arc<dyn ModelClient>>,
        config: TurnExecutorConfig,
    ) -> Self {
        Self::with_pricing(
            store,
            participants,
            clients,
            tools,
            permissions,
            summarizer_client,
            config,
            PricingTable::new(),
        )
    }

    /// As `new`, but with a per-participant pricing table so
    /// `Message.usage.cost_estimate` reflects real $/token rates instead
    /// of always reading 0.0.
    pub fn with_pricing(
        store: Arc<dyn PersistenceStore>,
        participants: Vec<Participant>,
        clients: HashMap<String, Arc<dyn ModelClient>>,
        tools: Arc<ToolRegistry>,
        permissions: Arc<dyn PermissionManager>,
        summarizer_client: Option<Arc<dyn ModelClient>>,
        config: TurnExecutorConfig,
        pricing: PricingTable,
    ) -> Self {
        Self {
            store,
            participants,
            clients,
            tools,
            permissions,
            summarizer_client,
            config,
            pricing,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn known_ids(&self) -> Vec<&str> {
        self.participants.iter().map(|p| p.id.as_str()).collect()
    }

    async fn session_state(&self, session_id: Uuid) -> Arc<Mutex<SessionState>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::default())))
            .clone()
    }

    /// Cancel the turn currently active for `session_id`, if any. No-op
    /// if no turn is in flight.
    pub async fn cancel_turn(&self, session_id: Uuid) {
        let state = self.session_state(session_id).await;
        let state = state.lock().await;
        if let Some(token) = &state.cancel {
            token.cancel();
        }
    }

    /// Run one full turn: parse mentions, evaluate speakers, announce,
    /// then drive the serial speaker loop. Events are pushed to `events`
    /// in a single totally-ordered stream; `requests` (if provided) is
    /// how the UI collaborator resolves permission asks.
    pub async fn run_turn(
        &self,
        session_id: Uuid,
        user_text: &str,
        events: mpsc::Sender<Event>,
        requests: Option<PermissionRequestSender>,
    ) -> Result<(), TurnError> {
        let session_lock = self.session_state(session_id).await;

        // Serializes entry: only one turn runs per session at a time. The
        // lock is held for the whole turn, acquired via the per-session
        // `Arc<Mutex<()>>` rather than the outer `SessionState` mutex
        // (which must stay free for `cancel_turn` to reach in mid-turn).
        let entry_lock = session_lock.lock().await.lock.clone();
        let _permit = entry_lock.lock().await;

        // The cancel token is only published once this turn has exclusive
        // entry, so a concurrent `cancel_turn` call can never target a
        // token belonging to a different, still-queued turn.
        let cancel = CancellationToken::new();
        session_lock.lock().await.cancel = Some(cancel.clone());

        let result = self.run_turn_inner(session_id, user_text, &events, requests, &cancel).await;

        session_lock.lock().await.cancel = None;
        result
    }

    async fn run_turn_inner(
        &self,
        session_id: Uuid,
        user_text: &str,
        events: &mpsc::Sender<Event>,
        requests: Option<PermissionRequestSender>,
        cancel: &CancellationToken,
    ) -> Result<(), TurnError> {
        let mut history = self.store.load_messages(session_id, None, None).await?;

        let parsed = parse_mentions(user_text, &self.known_ids());
        let user_message = Message::new_user(session_id, parsed.cleaned_text.clone());
        self.store.append_message(&user_message).await?;
        history.push(user_message);

        let _ = events.send(Event::Thinking).await;

        let enabled: Vec<&Participant> = self.participants.iter().filter(|p| p.enabled).collect();
        for p in &enabled {
            let _ = events.send(Event::Evaluating { participant: p.id.clone() }).await;
        }

        let decisions = evaluate_speakers(
            &self.participants,
            &self.clients,
            &parsed.forced,
            &parsed.cleaned_text,
            &[],
            self.config.evaluation_deadline,
            self.config.silence_threshold,
        )
        .await;

        for decision in &decisions {
            let event = if decision.should_speak {
                Event::WillSpeak {
                    participant: decision.participant_id.clone(),
                    confidence: decision.confidence,
                    reason: decision.reason.clone(),
                }
            } else {
                Event::WillStaySilent {
                    participant: decision.participant_id.clone(),
                    reason: decision.reason.clone(),
                }
            };
            let _ = events.send(event).await;
        }

        let speaking_order = {
            let state = self.session_state(session_id).await;
            let mut guard = state.lock().await;
            order_speakers(
                self.config.ordering_strategy,
                &decisions,
                &self.config.fixed_order,
                &mut guard.rotation,
            )
        };

        let pinned_ids: HashSet<Uuid> = history.iter().filter(|m| m.pinned).map(|m| m.id).collect();
        let mut cost_tracker = CostTracker::new();

        for participant_id in speaking_order {
            if cancel.is_cancelled() {
                break;
            }
            let Some(participant) = self.participants.iter().find(|p| p.id == participant_id) else {
                continue;
            };
            let Some(client) = self.clients.get(&participant_id).cloned() else {
                continue;
            };

            self.run_speaker(
                session_id,
                participant,
                client,
                &mut history,
                &pinned_ids,
                events,
                requests.as_ref(),
                cancel,
                &mut cost_tracker,
            )
            .await?;
        }

        let turn_cost = cost_tracker.total_cost(&self.pricing);
        if turn_cost > 0.0 {
            tracing::info!(session = %session_id, cost_usd = turn_cost, "turn complete");
        }

        if self.config.summarization_enabled {
            if let Some(summarizer) = &self.summarizer_client {
                let active = self.store.latest_summary(session_id).await?;
                let total_tokens: u32 = history
                    .iter()
                    .filter(|m| !m.pinned && !is_superseded(m, active.as_ref(), &history))
                    .map(|m| summarizer.count_tokens(&m.content))
                    .sum();
                if let Some(summary) = maybe_summarize(
                    &self.store,
                    summarizer,
                    session_id,
                    &history,
                    total_tokens,
                    self.config.summarization_threshold,
                )
                .await
                {
                    let _ = summary;
                }
            }
        }

        let _ = events.send(Event::TurnComplete).await;
        Ok(())
    }

    /// Run one speaker's segment of the turn: assemble context, stream a
    /// response, run the tool loop on demand, persist results. Pushes its
    /// own messages onto `history` so later speakers (and summarization)
    /// see them.
    async fn run_speaker(
        &self,
        session_id: Uuid,
        participant: &Participant,
        client: Arc<dyn ModelClient>,
        history: &mut Vec<Message>,
        pinned_ids: &HashSet<Uuid>,
        events: &mpsc::Sender<Event>,
        requests: Option<&PermissionRequestSender>,
        cancel: &CancellationToken,
        cost_tracker: &mut CostTracker,
    ) -> Result<(), TurnError> {
        let _ = events.send(Event::ResponseStart { participant: participant.id.clone() }).await;

        let active_summary = self.store.latest_summary(session_id).await?;
        let tool_descriptors = self.tools.descriptors();
        let tool_names: Vec<String> = tool_descriptors.iter().map(|d| d.name.clone()).collect();
        let system_prompt = build_system_prompt(participant, &tool_names);

        let build_request = |history: &[Message]| -> GenerateRequest {
            let client_ref = &client;
            let window = assemble_context(
                history,
                pinned_ids,
                active_summary.as_ref(),
                &system_prompt,
                participant.max_tokens,
                &|text| client_ref.count_tokens(text),
            );
            GenerateRequest {
                messages: window.messages,
                tools: tool_descriptors
                    .iter()
                    .map(|d| crate::provider::ToolDefinition {
                        name: d.name.clone(),
                        description: d.description.clone(),
                        parameters: d.parameters.clone(),
                    })
                    .collect(),
                max_tokens: self.config.max_tokens,
                temperature: participant.temperature,
            }
        };

        let request = build_request(history.as_slice());

        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = client.generate_stream(request) => Some(result),
        };

        let Some(stream) = stream else {
            let truncated = Message {
                truncated: true,
                ..Message::new_assistant(session_id, participant.id.clone(), String::new())
            };
            self.store.append_message(&truncated).await?;
            history.push(truncated);
            return Ok(());
        };

        let mut rx = match stream {
            Ok(rx) => rx,
            Err(e) => {
                let _ = events
                    .send(Event::Error {
                        participant: Some(participant.id.clone()),
                        kind: ErrorKind::Transport,
                        message: e.to_string(),
                        recoverable: true,
                    })
                    .await;
                return Ok(());
            }
        };

        let mut text = String::new();
        let mut final_response: Option<ModelResponse> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                chunk = rx.recv() => chunk,
            };
            let Some(chunk) = next else { break };
            match chunk {
                StreamChunk::TextDelta(delta) => {
                    if !delta.is_empty() {
                        text.push_str(&delta);
                        let _ = events
                            .send(Event::ResponseChunk { participant: participant.id.clone(), text: delta })
                            .await;
                    }
                }
                StreamChunk::ToolCallStart { .. }
                | StreamChunk::ToolCallArgsDelta { .. }
                | StreamChunk::ToolCallEnd { .. } => {
                    // Full tool-call shape arrives authoritatively in
                    // `Done`; incremental chunks exist for a UI that wants
                    // to render partial arguments and are not needed here.
                }
                StreamChunk::Done(response) => {
                    final_response = Some(response);
                    break;
                }
                StreamChunk::Error(message) => {
                    let _ = events
                        .send(Event::Error {
                            participant: Some(participant.id.clone()),
                            kind: ErrorKind::Transport,
                            message,
                            recoverable: true,
                        })
                        .await;
                    break;
                }
            }
        }

        let cancelled_mid_stream = cancel.is_cancelled() && final_response.is_none();

        let Some(mut response) = final_response else {
            let truncated = Message {
                content: text,
                truncated: true,
                ..Message::new_assistant(session_id, participant.id.clone(), String::new())
            };
            self.store.append_message(&truncated).await?;
            history.push(truncated);
            if !cancelled_mid_stream {
                let _ = events
                    .send(Event::Error {
                        participant: Some(participant.id.clone()),
                        kind: ErrorKind::Transport,
                        message: "stream ended without a completion".to_string(),
                        recoverable: true,
                    })
                    .await;
            }
            return Ok(());
        };
        if response.text.is_empty() {
            response.text = text;
        }

        let mut pending_tool_messages: Vec<Message> = Vec::new();

        if !response.tool_calls.is_empty() {
            let tool_ctx = ToolLoopContext {
                session_id,
                participant: participant.id.clone(),
                client: client.clone(),
                registry: self.tools.clone(),
                permissions: self.permissions.clone(),
                tool_deadline: self.config.tool_deadline,
                max_iterations: self.config.max_tool_iterations,
            };

            // `run_tool_loop` itself emits `ToolCall`/`ToolResult` for
            // every invocation it executes; nothing to announce here.
            let base_history = history.clone();
            let outcome = run_tool_loop(
                &tool_ctx,
                response.clone(),
                |tool_messages: &[Message]| {
                    let mut combined = base_history.clone();
                    combined.extend(tool_messages.iter().cloned());
                    build_request(&combined)
                },
                events.clone(),
                requests.cloned(),
            )
            .await;

            pending_tool_messages = outcome.tool_messages;
            response = outcome.final_response;

            if outcome.hit_iteration_limit {
                // run_tool_loop already emitted the TurnLimit error; the
                // speaker still closes out with whatever text accumulated.
            }
        }

        let mut assistant_message = Message::new_assistant(session_id, participant.id.clone(), response.text.clone());
        assistant_message.usage.prompt_tokens = response.usage.prompt_tokens;
        assistant_message.usage.completion_tokens = response.usage.completion_tokens;
        assistant_message.usage.cost_estimate = self.pricing.estimate(
            &participant.id,
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
        );
        cost_tracker.record(&participant.id, response.usage.prompt_tokens, response.usage.completion_tokens);

        // Tool messages and the final assistant message land in one
        // transaction: a crash mid-persist must never leave a tool result
        // on disk without the reply it led to, or vice versa.
        let response_event = Event::ResponseComplete { participant: participant.id.clone(), response: Some(response) };
        pending_tool_messages.push(assistant_message);
        self.store.append_messages_batch(&pending_tool_messages).await?;
        history.extend(pending_tool_messages);

        let _ = events.send(response_event).await;

        Ok(())
    }

    /// Re-run a single speaker at the tail of the session's history, as if
    /// it had been in the prior turn's speaking set. Used after an
    /// `ERROR{recoverable=true}` for that participant.
    pub async fn retry_speaker(
        &self,
        session_id: Uuid,
        participant_id: &str,
        events: mpsc::Sender<Event>,
        requests: Option<PermissionRequestSender>,
    ) -> Result<(), TurnError> {
        let session_lock = self.session_state(session_id).await;
        let entry_lock = session_lock.lock().await.lock.clone();
        let _permit = entry_lock.lock().await;

        let participant = self
            .participants
            .iter()
            .find(|p| p.id == participant_id)
            .ok_or_else(|| TurnError::UnknownParticipant(participant_id.to_string()))?
            .clone();
        let client = self
            .clients
            .get(participant_id)
            .cloned()
            .ok_or_else(|| TurnError::UnknownParticipant(participant_id.to_string()))?;

        let mut history = self.store.load_messages(session_id, None, None).await?;
        let pinned_ids: HashSet<Uuid> = history.iter().filter(|m| m.pinned).map(|m| m.id).collect();
        let cancel = CancellationToken::new();
        let mut cost_tracker = CostTracker::new();

        self.run_speaker(
            session_id,
            &participant,
            client,
            &mut history,
            &pinned_ids,
            &events,
            requests.as_ref(),
            &cancel,
            &mut cost_tracker,
        )
        .await?;

        let retry_cost = cost_tracker.total_cost(&self.pricing);
        if retry_cost > 0.0 {
            tracing::info!(session = %session_id, participant = participant_id, cost_usd = retry_cost, "retry complete");
        }

        let _ = events.send(Event::TurnComplete).await;
        Ok(())
    }
}

/// Mirrors `context::assembler`'s superseded-range check: used here only
/// to decide what counts toward the cumulative non-summarized token
/// count that triggers a summarization pass, not to build a context
/// window.
fn is_superseded(msg: &Message, summary: Option<&Summary>, history: &[Message]) -> bool {
    if msg.pinned {
        return false;
    }
    let Some(summary) = summary else { return false };
    let first_idx = history.iter().position(|m| m.id == summary.first_message_id);
    let last_idx = history.iter().position(|m| m.id == summary.last_message_id);
    let this_idx = history.iter().position(|m| m.id == msg.id);
    match (first_idx, last_idx, this_idx) {
        (Some(f), Some(l), Some(i)) => i >= f && i <= l,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::persistence::SqliteStore;
    use crate::provider::{FinishReason, ModelUsage};
    use crate::tools::permission::DefaultPermissionManager;
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePool;

    struct StubClient {
        reply: String,
    }

    #[async_trait]
    impl ModelClient for StubClient {
        async fn generate(&self, _request: GenerateRequest) -> anyhow::Result<ModelResponse> {
            Ok(ModelResponse {
                text: self.reply.clone(),
                tool_calls: Vec::new(),
                usage: ModelUsage::default(),
                finish_reason: FinishReason::Stop,
            })
        }

        async fn generate_stream(
            &self,
            _request: GenerateRequest,
        ) -> anyhow::Result<mpsc::Receiver<StreamChunk>> {
            let (tx, rx) = mpsc::channel(8);
            let reply = self.reply.clone();
            tokio::spawn(async move {
                let _ = tx
                    .send(StreamChunk::Done(ModelResponse {
                        text: reply,
                        tool_calls: Vec::new(),
                        usage: ModelUsage::default(),
                        finish_reason: FinishReason::Stop,
                    }))
                    .await;
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

    fn participant(id: &str) -> Participant {
        Participant {
            id: id.to_string(),
            display_name: id.to_string(),
            color: "white".to_string(),
            enabled: true,
            max_tokens: 4096,
            temperature: 0.5,
        }
    }

    async fn sqlite() -> Arc<dyn PersistenceStore> {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Arc::new(SqliteStore::new(pool).await.unwrap())
    }

    async fn drain(mut rx: mpsc::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn forced_all_speaks_and_emits_full_segments() {
        let store = sqlite().await;
        let session = store.create_session(None, None).await.unwrap();

        let participants = vec![participant("claude"), participant("gpt")];
        let mut clients: HashMap<String, Arc<dyn ModelClient>> = HashMap::new();
        clients.insert("claude".to_string(), Arc::new(StubClient { reply: "hi from claude".to_string() }));
        clients.insert("gpt".to_string(), Arc::new(StubClient { reply: "hi from gpt".to_string() }));

        let executor = TurnExecutor::new(
            store.clone(),
            participants,
            clients,
            Arc::new(ToolRegistry::new()),
            Arc::new(DefaultPermissionManager::new()),
            None,
            TurnExecutorConfig::default(),
        );

        let (tx, rx) = mpsc::channel(64);
        executor.run_turn(session.id, "@all hello everyone", tx, None).await.unwrap();
        let events = drain(rx).await;

        assert!(events.iter().any(|e| matches!(e, Event::Thinking)));
        assert!(events.iter().any(|e| matches!(e, Event::TurnComplete)));
        let starts = events.iter().filter(|e| matches!(e, Event::ResponseStart { .. })).count();
        let completes = events.iter().filter(|e| matches!(e, Event::ResponseComplete { .. })).count();
        assert_eq!(starts, 2);
        assert_eq!(completes, 2);

        let persisted = store.load_messages(session.id, None, None).await.unwrap();
        // user message + 2 assistant messages
        assert_eq!(persisted.len(), 3);
    }

    #[tokio::test]
    async fn no_mentions_low_confidence_silence_completes_with_zero_responses() {
        let store = sqlite().await;
        let session = store.create_session(None, None).await.unwrap();

        struct SilentClient;
        #[async_trait]
        impl ModelClient for SilentClient {
            async fn generate(&self, _request: GenerateRequest) -> anyhow::Result<ModelResponse> {
                Ok(ModelResponse {
                    text: r#"{"should_speak": true, "confidence": 0.1, "reason": "not needed"}"#.to_string(),
                    tool_calls: Vec::new(),
                    usage: ModelUsage::default(),
                    finish_reason: FinishReason::Stop,
                })
            }
            async fn generate_stream(
                &self,
                _request: GenerateRequest,
            ) -> anyhow::Result<mpsc::Receiver<StreamChunk>> {
                let (_tx, rx) = mpsc::channel(1);
                Ok(rx)
            }
            fn count_tokens(&self, text: &str) -> u32 {
                text.len() as u32
            }
            fn is_available(&self) -> bool {
                true
            }
        }

        let participants = vec![participant("claude")];
        let mut clients: HashMap<String, Arc<dyn ModelClient>> = HashMap::new();
        clients.insert("claude".to_string(), Arc::new(SilentClient));

        let executor = TurnExecutor::new(
            store.clone(),
            participants,
            clients,
            Arc::new(ToolRegistry::new()),
            Arc::new(DefaultPermissionManager::new()),
            None,
            TurnExecutorConfig::default(),
        );

        let (tx, rx) = mpsc::channel(64);
        executor.run_turn(session.id, "just chatting", tx, None).await.unwrap();
        let events = drain(rx).await;

        assert!(events.iter().any(|e| matches!(e, Event::WillStaySilent { .. })));
        assert!(!events.iter().any(|e| matches!(e, Event::ResponseStart { .. })));
        assert!(matches!(events.last().unwrap(), Event::TurnComplete));
    }

    #[tokio::test]
    async fn retry_speaker_runs_just_that_participant() {
        let store = sqlite().await;
        let session = store.create_session(None, None).await.unwrap();
        store.append_message(&Message::new_user(session.id, "earlier turn")).await.unwrap();

        let participants = vec![participant("grok")];
        let mut clients: HashMap<String, Arc<dyn ModelClient>> = HashMap::new();
        clients.insert("grok".to_string(), Arc::new(StubClient { reply: "retried".to_string() }));

        let executor = TurnExecutor::new(
            store.clone(),
            participants,
            clients,
            Arc::new(ToolRegistry::new()),
            Arc::new(DefaultPermissionManager::new()),
            None,
            TurnExecutorConfig::default(),
        );

        let (tx, rx) = mpsc::channel(64);
        executor.retry_speaker(session.id, "grok", tx, None).await.unwrap();
        let events = drain(rx).await;
        assert!(events.iter().any(|e| matches!(e, Event::ResponseComplete { participant, .. } if participant == "grok")));

        let persisted = store.load_messages(session.id, None, None).await.unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[1].content, "retried");
    }

    #[tokio::test]
    async fn priced_participant_gets_a_nonzero_cost_estimate() {
        use crate::cost::{ModelPricing, PricingTable};

        struct PricedClient;
        #[async_trait]
        impl ModelClient for PricedClient {
            async fn generate(&self, _request: GenerateRequest) -> anyhow::Result<ModelResponse> {
                unreachable!()
            }
            async fn generate_stream(
                &self,
                _request: GenerateRequest,
            ) -> anyhow::Result<mpsc::Receiver<StreamChunk>> {
                let (tx, rx) = mpsc::channel(8);
                tokio::spawn(async move {
                    let _ = tx
                        .send(StreamChunk::Done(ModelResponse {
                            text: "hi".to_string(),
                            tool_calls: Vec::new(),
                            usage: ModelUsage { prompt_tokens: 1_000_000, completion_tokens: 1_000_000 },
                            finish_reason: FinishReason::Stop,
                        }))
                        .await;
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

        let store = sqlite().await;
        let session = store.create_session(None, None).await.unwrap();
        let participants = vec![participant("claude")];
        let mut clients: HashMap<String, Arc<dyn ModelClient>> = HashMap::new();
        clients.insert("claude".to_string(), Arc::new(PricedClient));
        let pricing = PricingTable::new().with("claude", ModelPricing::new(3.0, 15.0));

        let executor = TurnExecutor::with_pricing(
            store.clone(),
            participants,
            clients,
            Arc::new(ToolRegistry::new()),
            Arc::new(DefaultPermissionManager::new()),
            None,
            TurnExecutorConfig::default(),
            pricing,
        );

        let (tx, rx) = mpsc::channel(64);
        executor.run_turn(session.id, "@claude hi", tx, None).await.unwrap();
        let _ = drain(rx).await;

        let persisted = store.load_messages(session.id, None, None).await.unwrap();
        let assistant = persisted.iter().find(|m| m.role == Role::Assistant).unwrap();
        assert!((assistant.usage.cost_estimate - 18.0).abs() < 1e-9);
    }
}
