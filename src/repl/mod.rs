//! Interactive REPL for `ensemble`.
//!
//! Readline-based interface with command history, slash commands, and a
//! streamed rendering of the Turn Executor's event stream. Permission
//! requests are resolved in the same terminal session: the `events`
//! channel's `TOOL_PERMISSION_REQUEST` carries the invocation to show the
//! user, and the separate `requests` channel carries the reply handshake
//! — this loop correlates the two in arrival order since
//! `resolve_permission` always sends the former strictly before the
//! latter.

pub mod colors;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config as RustylineConfig, Editor};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use ensemble::model::ToolInvocation;
use ensemble::persistence::PersistenceStore;
use ensemble::turn::{Event, PermissionReply, TurnExecutor};

/// One REPL session over a single `TurnExecutor` and a single, long-lived
/// conversation `Session`.
pub struct Repl {
    editor: Editor<(), DefaultHistory>,
    executor: Arc<TurnExecutor>,
    store: Arc<dyn PersistenceStore>,
    session_id: Uuid,
    history_path: std::path::PathBuf,
    cancelled: Arc<AtomicBool>,
}

impl Repl {
    pub fn new(executor: Arc<TurnExecutor>, store: Arc<dyn PersistenceStore>, session_id: Uuid) -> Result<Self> {
        let config = RustylineConfig::builder().auto_add_history(true).build();
        let editor = Editor::with_config(config)?;

        let history_path = dirs::home_dir()
            .unwrap_or_default()
            .join(".ensemble")
            .join("repl_history");

        Ok(Self {
            editor,
            executor,
            store,
            session_id,
            history_path,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    fn load_history(&mut self) {
        if self.history_path.exists() {
            let _ = self.editor.load_history(&self.history_path);
        }
    }

    fn save_history(&mut self) {
        if let Some(parent) = self.history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = self.editor.save_history(&self.history_path);
    }

    pub async fn run(&mut self) -> Result<()> {
        self.load_history();

        let cancelled = Arc::clone(&self.cancelled);
        let executor = Arc::clone(&self.executor);
        let session_id = self.session_id;
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancelled.store(true, Ordering::SeqCst);
                    executor.cancel_turn(session_id).await;
                }
            }
        });

        println!("{}", colors::header("ensemble"));
        println!("Type your message (Ctrl+D to exit, /help for commands)");
        println!();

        loop {
            let line = match self.editor.readline(&colors::prompt()) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("{}", colors::error(&format!("readline error: {err}")));
                    break;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if trimmed.starts_with('/') {
                if self.handle_command(trimmed).await? {
                    break;
                }
                continue;
            }

            self.cancelled.store(false, Ordering::SeqCst);
            self.run_turn(trimmed).await?;
        }

        self.save_history();
        println!("Goodbye!");
        Ok(())
    }

    /// Returns `true` if the command requests the REPL exit.
    async fn handle_command(&mut self, cmd: &str) -> Result<bool> {
        let parts: Vec<&str> = cmd.splitn(2, ' ').collect();
        let command = parts[0];
        let arg = parts.get(1).copied().unwrap_or("").trim();

        match command {
            "/help" => {
                println!("Commands:");
                println!("  /help              - Show this help");
                println!("  /pin <id>          - Pin a message so it is never summarized away");
                println!("  /unpin <id>        - Remove a pin");
                println!("  /retry <id>        - Re-run a participant's last response");
                println!("  /search <query>    - Search this session's messages");
                println!("  /quit              - Exit");
            }
            "/pin" | "/unpin" => {
                let Ok(message_id) = Uuid::parse_str(arg) else {
                    println!("{}", colors::error("usage: /pin <message-id>"));
                    return Ok(false);
                };
                self.store.set_pin(message_id, command == "/pin").await?;
                println!("{}", colors::success("ok"));
            }
            "/retry" => {
                if arg.is_empty() {
                    println!("{}", colors::error("usage: /retry <participant-id>"));
                    return Ok(false);
                }
                self.run_retry(arg).await?;
            }
            "/search" => {
                if arg.is_empty() {
                    println!("{}", colors::error("usage: /search <query>"));
                    return Ok(false);
                }
                let results = self.store.search(Some(self.session_id), arg).await?;
                for message in results {
                    println!("{} {}", colors::status(&message.id.to_string()), message.content);
                }
            }
            "/quit" | "/exit" => return Ok(true),
            _ => println!("Unknown command: {command}. Try /help"),
        }
        Ok(false)
    }

    async fn run_turn(&mut self, text: &str) -> Result<()> {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (requests_tx, requests_rx) = mpsc::channel(8);

        let executor = Arc::clone(&self.executor);
        let session_id = self.session_id;
        let text = text.to_string();
        let handle = tokio::spawn(async move {
            executor.run_turn(session_id, &text, events_tx, Some(requests_tx)).await
        });

        drain_turn(events_rx, requests_rx).await;
        handle.await??;
        Ok(())
    }

    async fn run_retry(&mut self, participant_id: &str) -> Result<()> {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (requests_tx, requests_rx) = mpsc::channel(8);

        let executor = Arc::clone(&self.executor);
        let session_id = self.session_id;
        let participant_id = participant_id.to_string();
        let handle = tokio::spawn(async move {
            executor.retry_speaker(session_id, &participant_id, events_tx, Some(requests_tx)).await
        });

        drain_turn(events_rx, requests_rx).await;
        handle.await??;
        Ok(())
    }
}

/// Render the event stream as it arrives and resolve permission prompts
/// inline. The `events` channel carries the full, orderly event sequence
/// (including the `TOOL_PERMISSION_REQUEST` payload a UI needs); the
/// `requests` channel carries only the reply handshake. Both are driven
/// from the same task so the pending-request queue they share can never
/// race: an event is always pushed before its paired request arrives.
async fn drain_turn(mut events: mpsc::Receiver<Event>, mut requests: mpsc::Receiver<(Event, oneshot::Sender<PermissionReply>)>) {
    let mut pending: VecDeque<ToolInvocation> = VecDeque::new();
    let mut current_speaker: Option<String> = None;

    loop {
        tokio::select! {
            biased;
            event = events.recv() => {
                let Some(event) = event else { break };
                match &event {
                    Event::ToolPermissionRequest { invocation, .. } => {
                        pending.push_back(invocation.clone());
                    }
                    _ => {}
                }
                render_event(event, &mut current_speaker);
            }
            request = requests.recv() => {
                let Some((_, reply_tx)) = request else { continue };
                let invocation = pending.pop_front();
                let reply = ask_permission(invocation.as_ref());
                let _ = reply_tx.send(reply);
            }
        }
    }
}

fn ask_permission(invocation: Option<&ToolInvocation>) -> PermissionReply {
    let name = invocation.map(|i| i.name.as_str()).unwrap_or("unknown tool");
    print!(
        "{} allow {}? [y/N] ",
        colors::warning("permission:"),
        colors::tool_name(name)
    );
    use std::io::Write;
    let _ = std::io::stdout().flush();

    let mut answer = String::new();
    let allow = std::io::stdin().read_line(&mut answer).is_ok() && answer.trim().eq_ignore_ascii_case("y");
    PermissionReply { allow, remember_for_session: allow }
}

fn render_event(event: Event, current_speaker: &mut Option<String>) {
    match event {
        Event::Thinking => println!("{}", colors::status("thinking...")),
        Event::Evaluating { participant } => println!("{}", colors::evaluating(&participant)),
        Event::WillSpeak { participant, .. } => {
            println!("{}", colors::status(&format!("{participant} will speak")));
        }
        Event::WillStaySilent { participant, reason } => {
            println!("{}", colors::status(&format!("{participant} stays silent ({reason})")));
        }
        Event::ResponseStart { participant } => {
            print!("\n{}: ", colors::participant_name(&participant, "cyan"));
            *current_speaker = Some(participant);
        }
        Event::ResponseChunk { text, .. } => {
            print!("{text}");
            use std::io::Write;
            let _ = std::io::stdout().flush();
        }
        Event::ResponseComplete { .. } => {
            println!();
            *current_speaker = None;
        }
        Event::ToolCall { invocation, .. } => {
            println!("\n{} {}", colors::tool_name(&invocation.name), colors::status(&invocation.arguments.to_string()));
        }
        Event::ToolExecuting { .. } => {
            println!("{}", colors::status("executing..."));
        }
        Event::ToolPermissionRequest { .. } => {
            // Resolved by drain_turn's requests branch; nothing to render here.
        }
        Event::ToolResult { result, .. } => {
            let rendered = colors::tool_result(&result.content);
            if result.is_error {
                println!("{}", colors::error(&result.content));
            } else {
                println!("{rendered}");
            }
        }
        Event::Error { message, participant, .. } => {
            let who = participant.unwrap_or_else(|| "turn".to_string());
            println!("{}", colors::error(&format!("[{who}] {message}")));
        }
        Event::TurnComplete => {
            println!();
        }
    }
}
