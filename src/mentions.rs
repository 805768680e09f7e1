//! Mention parsing and routing.
//!
//! `@name` tokens route a turn to specific participants or the whole
//! group. Recognition is case-insensitive and token-delimited; unknown
//! `@tokens` pass through the cleaned text verbatim.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// A mention resolves either to a specific set of participant ids, or to
/// the whole group via `@all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forced {
    Participants(BTreeSet<String>),
    All,
}

impl Forced {
    pub fn is_empty(&self) -> bool {
        matches!(self, Forced::Participants(set) if set.is_empty())
    }
}

/// Result of parsing a raw user utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMention {
    pub forced: Forced,
    pub cleaned_text: String,
}

static MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|\s)@([a-z0-9_]+)\b").expect("static mention regex is valid")
});

/// Parse `@mentions` out of raw text, given the set of known participant
/// ids (case-insensitive). Unknown `@tokens` are left in `cleaned_text`.
pub fn parse_mentions(raw: &str, known_ids: &[&str]) -> ParsedMention {
    let known_lower: BTreeSet<String> = known_ids.iter().map(|s| s.to_lowercase()).collect();
    let mut forced_ids = BTreeSet::new();
    let mut forced_all = false;

    // Replace recognized mentions with a single space, leaving unknown
    // `@tokens` untouched so they surface verbatim in cleaned_text.
    let mut cleaned = String::with_capacity(raw.len());
    let mut last_end = 0;
    for cap in MENTION_RE.captures_iter(raw) {
        let whole = cap.get(0).unwrap();
        let name = cap.get(1).unwrap().as_str();
        let name_lower = name.to_lowercase();

        let recognized = name_lower == "all" || known_lower.contains(&name_lower);
        if recognized {
            if name_lower == "all" {
                forced_all = true;
            } else {
                // Recover the canonical-cased id from known_ids.
                if let Some(id) = known_ids.iter().find(|k| k.to_lowercase() == name_lower) {
                    forced_ids.insert((*id).to_string());
                }
            }
            cleaned.push_str(&raw[last_end..whole.start()]);
            cleaned.push(' ');
            last_end = whole.end();
        }
    }
    cleaned.push_str(&raw[last_end..]);

    let cleaned_text = collapse_whitespace(&cleaned);

    let forced = if forced_all {
        Forced::All
    } else {
        Forced::Participants(forced_ids)
    };

    ParsedMention {
        forced,
        cleaned_text,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compose a raw utterance from a forced set and body text — the inverse
/// of `parse_mentions`, used by the round-trip test below.
pub fn compose_mentions(forced: &Forced, text: &str) -> String {
    let mentions: String = match forced {
        Forced::All => "@all".to_string(),
        Forced::Participants(ids) => ids
            .iter()
            .map(|id| format!("@{}", id))
            .collect::<Vec<_>>()
            .join(" "),
    };
    if mentions.is_empty() {
        text.to_string()
    } else if text.is_empty() {
        mentions
    } else {
        format!("{} {}", mentions, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: &[&str] = &["claude", "gpt", "gemini", "grok"];

    #[test]
    fn single_mention_and_all() {
        let p = parse_mentions("@claude explain @all of this", KNOWN);
        assert_eq!(p.forced, Forced::All);
        assert_eq!(p.cleaned_text, "explain of this");
    }

    #[test]
    fn unknown_mention_passes_through() {
        let p = parse_mentions("ping @someone please", KNOWN);
        assert_eq!(p.forced, Forced::Participants(BTreeSet::new()));
        assert_eq!(p.cleaned_text, "ping @someone please");
    }

    #[test]
    fn case_insensitive_and_dedup() {
        let p = parse_mentions("@Claude @claude @CLAUDE hi", KNOWN);
        match p.forced {
            Forced::Participants(set) => {
                assert_eq!(set.len(), 1);
                assert!(set.contains("claude"));
            }
            Forced::All => panic!("unexpected ALL"),
        }
        assert_eq!(p.cleaned_text, "hi");
    }

    #[test]
    fn purely_mention_message_is_valid_empty() {
        let p = parse_mentions("@gpt @gemini", KNOWN);
        assert_eq!(p.cleaned_text, "");
    }

    #[test]
    fn whitespace_collapses() {
        let p = parse_mentions("  @claude    hello   world  ", KNOWN);
        assert_eq!(p.cleaned_text, "hello world");
    }

    #[test]
    fn no_mentions_cleaned_equals_trimmed_input() {
        let p = parse_mentions("  just talking  ", KNOWN);
        assert_eq!(p.cleaned_text, "just talking");
        assert_eq!(p.forced, Forced::Participants(BTreeSet::new()));
    }

    #[test]
    fn cleaned_text_never_contains_recognized_mention() {
        for input in [
            "@claude @gpt hello @all world",
            "no mentions here",
            "@all",
            "trailing @grok",
        ] {
            let p = parse_mentions(input, KNOWN);
            for id in KNOWN.iter().chain(["all"].iter()) {
                let needle = format!("@{}", id);
                assert!(
                    !p.cleaned_text.to_lowercase().contains(&needle),
                    "cleaned text {:?} still contains {:?}",
                    p.cleaned_text,
                    needle
                );
            }
        }
    }

    #[test]
    fn round_trip_recovers_forced_set() {
        let mut ids = BTreeSet::new();
        ids.insert("claude".to_string());
        ids.insert("gpt".to_string());
        let forced = Forced::Participants(ids);
        let composed = compose_mentions(&forced, "let's ship it");
        let parsed = parse_mentions(&composed, KNOWN);
        assert_eq!(parsed.forced, forced);
        assert_eq!(parsed.cleaned_text, "let's ship it");
    }
}
