//! Speaker Evaluator: decides who speaks this turn by fanning out a
//! "should speak" evaluation to every enabled participant in parallel,
//! with a hard deadline per task.
//!
//! One task per collaborator, failures local to the task: a concurrent
//! `tokio::spawn` + `tokio::time::timeout` fan-out so N participants can
//! be evaluated at once instead of one model at a time.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::mentions::Forced;
use crate::model::{Participant, SpeakerDecision};
use crate::provider::{GenerateRequest, ModelClient, WireMessage};

/// Default hard deadline for one participant's "should speak" call.
pub const DEFAULT_EVALUATION_DEADLINE: Duration = Duration::from_secs(5);

/// Default silence threshold `θ`: non-forced decisions below this
/// confidence are coerced to silent.
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 0.3;

/// Lenient extraction of the `{should_speak, confidence, reason}` object
/// a participant's evaluation call is expected to return. Tolerates a
/// model wrapping the object in prose by scanning for the first balanced
/// `{...}` substring, and tolerates missing fields with sane defaults.
fn parse_decision(raw: &str) -> Option<(bool, f32, String)> {
    let start = raw.find('{')?;
    let mut depth = 0i32;
    let mut end = None;
    for (i, ch) in raw[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    let end = end?;
    let value: serde_json::Value = serde_json::from_str(&raw[start..end]).ok()?;
    let should_speak = value.get("should_speak").and_then(|v| v.as_bool()).unwrap_or(true);
    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .map(|v| v.clamp(0.0, 1.0) as f32)
        .unwrap_or(0.5);
    let reason = value
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or("unspecified")
        .to_string();
    Some((should_speak, confidence, reason))
}

fn should_speak_prompt(participant_id: &str, user_message: &str, prior: &[SpeakerDecision]) -> String {
    let prior_summary = if prior.is_empty() {
        "none yet".to_string()
    } else {
        prior
            .iter()
            .map(|d| format!("{}: {}", d.participant_id, if d.should_speak { "speaking" } else { "silent" }))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "You are participant \"{participant_id}\" in a group chat. The user just said:\n{user_message}\n\nEarlier responders this turn: {prior_summary}.\n\nDecide whether you should respond. Reply with ONLY a JSON object: {{\"should_speak\": bool, \"confidence\": 0.0-1.0, \"reason\": string}}."
    )
}

/// Run one participant's "should speak" evaluation and fold in whether
/// it was mentioned. Mentioned (forced) participants still run the
/// evaluation call — its outcome becomes the decision's `reason`/
/// `confidence` for diagnostics and a later `retry_speaker` — but
/// `should_speak` ends up `true` unconditionally.
async fn evaluate_one(
    participant: Participant,
    client: Arc<dyn ModelClient>,
    user_message: String,
    prior: Vec<SpeakerDecision>,
    forced: bool,
    deadline: Duration,
    threshold: f32,
) -> SpeakerDecision {
    let prompt = should_speak_prompt(&participant.id, &user_message, &prior);
    let request = GenerateRequest {
        messages: vec![WireMessage { role: "user".to_string(), content: prompt }],
        tools: Vec::new(),
        max_tokens: 128,
        temperature: 0.0,
    };

    let mut decision = match tokio::time::timeout(deadline, client.generate(request)).await {
        Ok(Ok(response)) => match parse_decision(&response.text) {
            Some((should_speak, confidence, reason)) => SpeakerDecision {
                participant_id: participant.id.clone(),
                should_speak,
                confidence,
                reason,
                forced,
            },
            None => SpeakerDecision {
                participant_id: participant.id.clone(),
                should_speak: true,
                confidence: 0.5,
                reason: "parse-fallback".to_string(),
                forced,
            },
        },
        Ok(Err(_)) => SpeakerDecision {
            participant_id: participant.id.clone(),
            should_speak: false,
            confidence: 0.0,
            reason: "error".to_string(),
            forced,
        },
        Err(_) => SpeakerDecision {
            participant_id: participant.id.clone(),
            should_speak: false,
            confidence: 0.0,
            reason: "timeout".to_string(),
            forced,
        },
    };

    if forced {
        decision.should_speak = true;
    } else if decision.confidence < threshold {
        decision.should_speak = false;
    }

    decision
}

/// Run the Speaker Evaluator for one turn. `clients` must contain an
/// entry for every enabled participant.
pub async fn evaluate_speakers(
    participants: &[Participant],
    clients: &std::collections::HashMap<String, Arc<dyn ModelClient>>,
    forced: &Forced,
    user_message: &str,
    prior_decisions: &[SpeakerDecision],
    deadline: Duration,
    threshold: f32,
) -> Vec<SpeakerDecision> {
    let enabled: Vec<&Participant> = participants.iter().filter(|p| p.enabled).collect();

    let mentioned_ids: HashSet<String> = match forced {
        Forced::All => enabled.iter().map(|p| p.id.clone()).collect(),
        Forced::Participants(ids) => ids.iter().cloned().collect(),
    };

    // F = {ALL} bypasses evaluation entirely: everyone speaks at full
    // confidence.
    if matches!(forced, Forced::All) {
        return enabled
            .iter()
            .map(|p| SpeakerDecision::forced_speak(p.id.clone()))
            .collect();
    }

    let mut tasks = Vec::new();
    for participant in enabled {
        let Some(client) = clients.get(&participant.id).cloned() else {
            continue;
        };
        let is_forced = mentioned_ids.contains(&participant.id);
        let participant = participant.clone();
        let user_message = user_message.to_string();
        let prior = prior_decisions.to_vec();

        tasks.push(tokio::spawn(evaluate_one(
            participant,
            client,
            user_message,
            prior,
            is_forced,
            deadline,
            threshold,
        )));
    }

    let mut decisions = Vec::new();
    for task in tasks {
        if let Ok(decision) = task.await {
            decisions.push(decision);
        }
    }

    decisions.sort_by(|a, b| {
        let a_mentioned = mentioned_ids.contains(&a.participant_id);
        let b_mentioned = mentioned_ids.contains(&b.participant_id);
        b_mentioned
            .cmp(&a_mentioned)
            .then(b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal))
    });

    decisions
}
