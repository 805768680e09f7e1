//! Summarizer: keeps active token usage bounded by compressing the
//! oldest not-yet-summarized half of a session's history into a
//! persisted `Summary`.
//!
//! Collapses older state into a synthetic context blob rather than
//! deleting the summarized rows: full history stays in storage, and
//! only superseded ranges are excluded from context assembly. Each pass
//! folds the previous active summary into the new one (a rolling merge),
//! so context assembly's single `latest_summary()` slot always stands for
//! the whole leading prefix of history rather than just the newest chunk.
//! The first pass over a session yields an `incremental` summary; every
//! pass after that yields a `full` summary that has absorbed it, at which
//! point the earlier record is retired by simply no longer being latest.

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::model::{Message, Summary, SummaryKind};
use crate::persistence::{PersistenceError, PersistenceStore};
use crate::provider::{GenerateRequest, ModelClient, WireMessage};

#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("summarizer model call failed: {0}")]
    Generation(#[source] anyhow::Error),
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Default cumulative non-summarized token count that triggers a summary
/// pass at end-of-turn.
pub const DEFAULT_SUMMARIZATION_THRESHOLD: u32 = 50_000;

fn compression_prompt(previous: Option<&Summary>, messages: &[&Message]) -> String {
    let transcript: String = messages
        .iter()
        .map(|m| {
            let role = m.author.as_deref().unwrap_or(match m.role {
                crate::model::Role::User => "user",
                crate::model::Role::System => "system",
                crate::model::Role::Tool => "tool",
                crate::model::Role::Assistant => "assistant",
            });
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n");
    match previous {
        Some(prev) => format!(
            "Here is the existing summary of everything before this excerpt:\n{}\n\n\
             Fold the following additional conversation excerpt into that summary, \
             producing one single updated summary that preserves decisions, facts, \
             and open threads from both. Do not include commentary about the \
             compression itself.\n\n{transcript}",
            prev.content
        ),
        None => format!(
            "Compress the following conversation excerpt into a compact summary \
             that preserves decisions, facts, and open threads. Do not include \
             commentary about the compression itself.\n\n{transcript}"
        ),
    }
}

/// Select the oldest ~50% of `history` not already covered by `active` and
/// not pinned (pinned messages are never superseded).
fn select_candidates<'a>(history: &'a [Message], active: Option<&Summary>) -> Vec<&'a Message> {
    let already_covered: HashSet<Uuid> = match active {
        Some(summary) => {
            let first_idx = history.iter().position(|m| m.id == summary.first_message_id);
            let last_idx = history.iter().position(|m| m.id == summary.last_message_id);
            match (first_idx, last_idx) {
                (Some(f), Some(l)) => history[f..=l].iter().map(|m| m.id).collect(),
                _ => HashSet::new(),
            }
        }
        None => HashSet::new(),
    };

    let eligible: Vec<&Message> = history
        .iter()
        .filter(|m| !m.pinned && !already_covered.contains(&m.id))
        .collect();

    if eligible.is_empty() {
        return Vec::new();
    }
    let take = (eligible.len() / 2).max(1);
    eligible.into_iter().take(take).collect()
}

/// Run one summarization pass for `session_id` if `current_tokens` exceeds
/// `threshold`. On any failure this logs a warning and returns `Ok(None)`
/// without propagating an error — a failed summarization never fails the
/// turn.
pub async fn maybe_summarize(
    store: &Arc<dyn PersistenceStore>,
    summarizer_client: &Arc<dyn ModelClient>,
    session_id: Uuid,
    history: &[Message],
    current_tokens: u32,
    threshold: u32,
) -> Option<Summary> {
    if current_tokens <= threshold {
        return None;
    }

    match run_summarization(store, summarizer_client, session_id, history).await {
        Ok(summary) => summary,
        Err(e) => {
            warn!(session = %session_id, error = %e, "summarization failed, continuing without it");
            None
        }
    }
}

async fn run_summarization(
    store: &Arc<dyn PersistenceStore>,
    summarizer_client: &Arc<dyn ModelClient>,
    session_id: Uuid,
    history: &[Message],
) -> Result<Option<Summary>, SummarizerError> {
    let active = store.latest_summary(session_id).await?;
    let candidates = select_candidates(history, active.as_ref());

    let Some((first, last)) = candidates.first().zip(candidates.last()) else {
        return Ok(None);
    };
    // Rolling merge: the new summary's range starts where the previous
    // active summary's range started (or at the new batch if this is the
    // first pass), so a single `latest_summary()` call always returns a
    // record covering everything from the start of history up to
    // `last_message_id`. Without this, context assembly's single-summary
    // slot would see only the newest chunk and silently lose whatever the
    // prior summary represented the moment a fresher one lands.
    let first_message_id = active.as_ref().map(|s| s.first_message_id).unwrap_or(first.id);
    let last_message_id = last.id;

    let prompt = compression_prompt(active.as_ref(), &candidates);
    let request = GenerateRequest {
        messages: vec![WireMessage { role: "user".to_string(), content: prompt }],
        tools: Vec::new(),
        max_tokens: 1024,
        temperature: 0.2,
    };

    let response = summarizer_client
        .generate(request)
        .await
        .map_err(SummarizerError::Generation)?;

    let token_count = summarizer_client.count_tokens(&response.text);

    // A summary that has absorbed a prior one now stands for the whole
    // leading prefix of the session rather than one isolated chunk; the
    // previous record becomes retired simply by no longer being returned
    // from `latest_summary()`, per the append-only persistence model (it
    // stays on disk, just unreferenced).
    let kind = if active.is_some() { SummaryKind::Full } else { SummaryKind::Incremental };

    let summary = Summary {
        id: Uuid::new_v4(),
        session_id,
        kind,
        content: response.text,
        first_message_id,
        last_message_id,
        token_count,
        created_at: chrono::Utc::now(),
    };

    store.add_summary(&summary).await?;
    Ok(Some(summary))
}
