//! Turn Manager: turns the Speaker Evaluator's decisions into a serial
//! speaking order.
//!
//! Small per-session mutable state guarded behind the single-turn
//! invariant, generalized to a rotation index so several speakers can be
//! ordered against each other across turns.

use crate::model::SpeakerDecision;

/// How the serial speaking order is derived from the speaking set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingStrategy {
    /// Highest confidence first, ties broken by participant id.
    Confidence,
    /// Rotating first-responder: each turn starts from a stateful index
    /// into the fixed participant order and advances it by one.
    Rotate,
    /// A user-configured static order, intersected with who is speaking.
    Fixed,
}

/// Per-session mutable state the `rotate` strategy needs. Protected by
/// the single-turn-per-session invariant at the executor's entry point;
/// no internal locking here.
#[derive(Debug, Clone, Default)]
pub struct RotationState {
    next_index: usize,
}

impl RotationState {
    pub fn new() -> Self {
        Self::default()
    }
}

fn speaking(decisions: &[SpeakerDecision]) -> Vec<&SpeakerDecision> {
    decisions.iter().filter(|d| d.should_speak).collect()
}

/// Order `decisions` (the full evaluated set, speaking or not) into the
/// serial list of participant ids that will actually speak this turn.
///
/// `fixed_order` is the user-configured static participant order,
/// required by `rotate` and `fixed` and ignored by `confidence`.
pub fn order_speakers(
    strategy: OrderingStrategy,
    decisions: &[SpeakerDecision],
    fixed_order: &[String],
    rotation: &mut RotationState,
) -> Vec<String> {
    let speakers = speaking(decisions);

    match strategy {
        OrderingStrategy::Confidence => {
            let mut ordered: Vec<&SpeakerDecision> = speakers;
            ordered.sort_by(|a, b| {
                let forced_cmp = b.forced.cmp(&a.forced);
                if forced_cmp != std::cmp::Ordering::Equal {
                    return forced_cmp;
                }
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.participant_id.cmp(&b.participant_id))
            });
            ordered.into_iter().map(|d| d.participant_id.clone()).collect()
        }

        OrderingStrategy::Fixed => {
            let speaking_ids: std::collections::HashSet<&str> =
                speakers.iter().map(|d| d.participant_id.as_str()).collect();
            let mut forced: Vec<String> = speakers
                .iter()
                .filter(|d| d.forced)
                .map(|d| d.participant_id.clone())
                .collect();
            forced.sort();
            let rest: Vec<String> = fixed_order
                .iter()
                .filter(|id| speaking_ids.contains(id.as_str()) && !forced.contains(id))
                .cloned()
                .collect();
            forced.into_iter().chain(rest).collect()
        }

        OrderingStrategy::Rotate => {
            if fixed_order.is_empty() {
                return order_speakers(OrderingStrategy::Confidence, decisions, fixed_order, rotation);
            }
            let speaking_ids: std::collections::HashSet<&str> =
                speakers.iter().map(|d| d.participant_id.as_str()).collect();

            let mut forced: Vec<String> = speakers
                .iter()
                .filter(|d| d.forced)
                .map(|d| d.participant_id.clone())
                .collect();
            forced.sort();

            // Walk the fixed order starting at the rotation index, promoting
            // the next participant in fixed order when the one the index
            // currently points to isn't speaking this turn.
            let n = fixed_order.len();
            let start = rotation.next_index % n;
            let mut rest = Vec::new();
            for offset in 0..n {
                let id = &fixed_order[(start + offset) % n];
                if speaking_ids.contains(id.as_str()) && !forced.contains(id) {
                    rest.push(id.clone());
                }
            }
            rotation.next_index = (start + 1) % n;

            forced.into_iter().chain(rest).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(id: &str, speak: bool, confidence: f32, forced: bool) -> SpeakerDecision {
        SpeakerDecision {
            participant_id: id.to_string(),
            should_speak: speak,
            confidence,
            reason: "test".to_string(),
            forced,
        }
    }

    #[test]
    fn confidence_orders_descending_with_forced_first() {
        let decisions = vec![
            decision("a", true, 0.4, false),
            decision("b", true, 0.9, false),
            decision("c", true, 0.5, true),
        ];
        let mut rotation = RotationState::new();
        let order = order_speakers(OrderingStrategy::Confidence, &decisions, &[], &mut rotation);
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn fixed_intersects_with_speaking_set() {
        let decisions = vec![
            decision("a", true, 0.9, false),
            decision("b", false, 0.1, false),
            decision("c", true, 0.5, false),
        ];
        let fixed = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        let mut rotation = RotationState::new();
        let order = order_speakers(OrderingStrategy::Fixed, &decisions, &fixed, &mut rotation);
        assert_eq!(order, vec!["c", "a"]);
    }

    #[test]
    fn rotate_advances_index_each_call() {
        let decisions = vec![
            decision("a", true, 0.5, false),
            decision("b", true, 0.5, false),
            decision("c", true, 0.5, false),
        ];
        let fixed = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut rotation = RotationState::new();

        let first = order_speakers(OrderingStrategy::Rotate, &decisions, &fixed, &mut rotation);
        assert_eq!(first, vec!["a", "b", "c"]);

        let second = order_speakers(OrderingStrategy::Rotate, &decisions, &fixed, &mut rotation);
        assert_eq!(second, vec!["b", "c", "a"]);
    }

    #[test]
    fn rotate_promotes_next_when_pointed_to_participant_is_silent() {
        let decisions = vec![
            decision("a", false, 0.1, false),
            decision("b", true, 0.5, false),
            decision("c", true, 0.5, false),
        ];
        let fixed = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut rotation = RotationState::new();
        // Index points at "a" but it's silent; "b" should be promoted to
        // first among the remaining speakers.
        let order = order_speakers(OrderingStrategy::Rotate, &decisions, &fixed, &mut rotation);
        assert_eq!(order, vec!["b", "c"]);
    }

    #[test]
    fn forced_speakers_precede_fixed_order_under_rotate() {
        let decisions = vec![
            decision("a", true, 0.5, false),
            decision("b", true, 1.0, true),
            decision("c", true, 0.5, false),
        ];
        let fixed = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut rotation = RotationState::new();
        let order = order_speakers(OrderingStrategy::Rotate, &decisions, &fixed, &mut rotation);
        assert_eq!(order[0], "b");
    }
}
