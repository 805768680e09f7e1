//! Priority-ordered, token-bounded context window.
//!
//! Assembles context in priority tiers against a running token count,
//! stopping once the budget is spent, operating over whole messages
//! (never splitting one) with a real per-participant token counter.

use std::collections::HashSet;
use uuid::Uuid;

use crate::model::{Message, Summary};
use crate::provider::WireMessage;

/// A warning surfaced when the assembled window could not include
/// everything the priority algorithm would otherwise want.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetWarning {
    /// A pinned message could not fit; pins already included are kept,
    /// and no further pins (or recent messages) are considered.
    BudgetExceeded { skipped_pin: Uuid },
}

/// The assembled, chronologically-ordered window for one participant.
#[derive(Debug, Clone, Default)]
pub struct AssembledWindow {
    pub messages: Vec<WireMessage>,
    pub total_tokens: u32,
    pub warnings: Vec<BudgetWarning>,
}

fn wire(role: &str, content: &str) -> WireMessage {
    WireMessage {
        role: role.to_string(),
        content: content.to_string(),
    }
}

/// Returns true if `msg` falls within the inclusive range an active
/// summary already covers (and is therefore skipped from raw inclusion —
/// superseded messages remain in storage but are not reassembled into
/// context). Pinned messages are never superseded.
fn is_superseded(msg: &Message, summary: Option<&Summary>, history: &[Message]) -> bool {
    if msg.pinned {
        return false;
    }
    let Some(summary) = summary else {
        return false;
    };
    let first_idx = history.iter().position(|m| m.id == summary.first_message_id);
    let last_idx = history.iter().position(|m| m.id == summary.last_message_id);
    let this_idx = history.iter().position(|m| m.id == msg.id);
    match (first_idx, last_idx, this_idx) {
        (Some(f), Some(l), Some(i)) => i >= f && i <= l,
        _ => false,
    }
}

/// Build the context window for one participant about to speak.
///
/// `count_tokens` is the participant's own token counter; assembly is a
/// pure function of its inputs — identical inputs (including the same
/// counter) produce identical output.
pub fn assemble_context(
    history: &[Message],
    pinned_ids: &HashSet<Uuid>,
    active_summary: Option<&Summary>,
    system_prompt: &str,
    budget_tokens: u32,
    count_tokens: &dyn Fn(&str) -> u32,
) -> AssembledWindow {
    let mut out = AssembledWindow::default();

    // Step 1: system prompt occupies slot 0, unconditionally.
    let system_tokens = count_tokens(system_prompt);
    out.messages.push(wire("system", system_prompt));
    out.total_tokens += system_tokens;
    let mut remaining = budget_tokens.saturating_sub(system_tokens);

    // Step 2: active summary, as a synthetic system message.
    if let Some(summary) = active_summary {
        let summary_tokens = count_tokens(&summary.content);
        if summary_tokens <= remaining {
            out.messages.push(wire("system", &summary.content));
            out.total_tokens += summary_tokens;
            remaining -= summary_tokens;
        }
    }

    // Step 3: pinned messages, oldest first. Stop at the first one that
    // doesn't fit; pins already included stay (older wins on overflow
    // ties because we iterate oldest-first already).
    let mut pinned_in_order: Vec<&Message> = history
        .iter()
        .filter(|m| pinned_ids.contains(&m.id))
        .collect();
    pinned_in_order.sort_by_key(|m| m.created_at);

    let mut included: Vec<(&Message, u32)> = Vec::new();
    for msg in &pinned_in_order {
        let tokens = count_tokens(&msg.content);
        if tokens > remaining {
            out.warnings.push(BudgetWarning::BudgetExceeded { skipped_pin: msg.id });
            break;
        }
        remaining -= tokens;
        included.push((msg, tokens));
    }

    // Step 4: fill from the most recent unpinned, unsummarized message
    // backwards, never splitting a message, stopping on first overflow.
    let mut recent_fill: Vec<(&Message, u32)> = Vec::new();
    for msg in history.iter().rev() {
        if pinned_ids.contains(&msg.id) {
            continue;
        }
        if is_superseded(msg, active_summary, history) {
            continue;
        }
        let tokens = count_tokens(&msg.content);
        if tokens > remaining {
            break;
        }
        remaining -= tokens;
        recent_fill.push((msg, tokens));
    }
    // recent_fill was built newest-first; reverse for chronological order.
    recent_fill.reverse();

    // Merge pins and recent fill, then sort chronologically — pins and
    // recent messages may interleave in time.
    let mut body: Vec<(&Message, u32)> = included;
    body.extend(recent_fill);
    body.sort_by_key(|(m, _)| m.created_at);
    // Messages could in principle appear in both sets if a pin is also
    // within the recency window; dedupe by id, keeping the first.
    let mut seen = HashSet::new();
    for (msg, tokens) in body {
        if !seen.insert(msg.id) {
            continue;
        }
        let role = match msg.role {
            crate::model::Role::User => "user",
            crate::model::Role::Assistant => "assistant",
            crate::model::Role::System => "system",
            crate::model::Role::Tool => "tool",
        };
        out.messages.push(wire(role, &msg.content));
        out.total_tokens += tokens;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Message;
    use chrono::Duration;

    fn counter(tokens_per_char: u32) -> impl Fn(&str) -> u32 {
        move |s: &str| (s.chars().count() as u32) * tokens_per_char
    }

    fn history_of(n: usize) -> Vec<Message> {
        let sid = Uuid::new_v4();
        let mut msgs = Vec::new();
        let base = chrono::Utc::now();
        for i in 0..n {
            let mut m = Message::new_user(sid, format!("msg{}", i));
            m.created_at = base + Duration::seconds(i as i64);
            msgs.push(m);
        }
        msgs
    }

    #[test]
    fn output_is_chronological_and_within_budget() {
        let history = history_of(20);
        let count = counter(1);
        let window = assemble_context(&history, &HashSet::new(), None, "sys", 50, &count);

        assert!(window.total_tokens <= 50);
        let mut last = None;
        // Skip the synthetic system message(s) at the front.
        for m in window.messages.iter().filter(|m| m.role != "system") {
            let idx: u32 = m.content.trim_start_matches("msg").parse().unwrap();
            if let Some(prev) = last {
                assert!(prev < idx);
            }
            last = Some(idx);
        }
    }

    #[test]
    fn never_splits_a_message() {
        let history = history_of(5);
        let count = counter(100); // each message costs way more than the budget
        let window = assemble_context(&history, &HashSet::new(), None, "sys", 150, &count);
        // Only the system prompt fits; no partial message content appears.
        assert_eq!(window.messages.len(), 1);
        assert_eq!(window.messages[0].role, "system");
    }

    #[test]
    fn pins_win_over_recent_on_overflow() {
        let mut history = history_of(3);
        let pin_id = history[0].id;
        history[0].pinned = true;
        let mut pinned = HashSet::new();
        pinned.insert(pin_id);

        let count = counter(1);
        // Budget fits system + the pin, but not all three messages.
        let sys_cost = count("sys");
        let pin_cost = count(&history[0].content);
        let budget = sys_cost + pin_cost; // no room for anything else
        let window = assemble_context(&history, &pinned, None, "sys", budget, &count);

        let has_pin = window
            .messages
            .iter()
            .any(|m| m.content == history[0].content);
        assert!(has_pin, "pinned message should always be included when it fits");
    }

    #[test]
    fn same_inputs_yield_identical_output() {
        let history = history_of(10);
        let count = counter(2);
        let a = assemble_context(&history, &HashSet::new(), None, "sys", 200, &count);
        let b = assemble_context(&history, &HashSet::new(), None, "sys", 200, &count);
        assert_eq!(a.messages.len(), b.messages.len());
        for (x, y) in a.messages.iter().zip(b.messages.iter()) {
            assert_eq!(x.content, y.content);
        }
    }

    #[test]
    fn budget_exceeded_warning_when_a_pin_cannot_fit() {
        let mut history = history_of(2);
        history[0].pinned = true;
        history[1].pinned = true;
        let mut pinned = HashSet::new();
        pinned.insert(history[0].id);
        pinned.insert(history[1].id);

        let count = counter(1);
        let sys_cost = count("sys");
        let first_pin_cost = count(&history[0].content);
        // Budget fits system + first pin only.
        let budget = sys_cost + first_pin_cost;
        let window = assemble_context(&history, &pinned, None, "sys", budget, &count);

        assert!(window
            .warnings
            .iter()
            .any(|w| matches!(w, BudgetWarning::BudgetExceeded { skipped_pin } if *skipped_pin == history[1].id)));
    }
}
