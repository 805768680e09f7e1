//! Configuration loading. Loading is a collaborator the core itself
//! never touches; this module exists to produce a `TurnExecutorConfig`
//! plus the participant roster the binary wires up before constructing
//! a `TurnExecutor`.
//!
//! A TOML file at a fixed path, falling back to defaults on any
//! read/parse failure rather than aborting startup.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::turn::OrderingStrategy;
use crate::turn::TurnExecutorConfig;

/// One configured participant, as read from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantConfig {
    pub id: String,
    pub display_name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Which `ModelClient` this participant is backed by, e.g. `"openai"`
    /// or `"deepseek"` — resolved to a concrete client by the binary.
    #[serde(default)]
    pub provider: Option<String>,
}

fn default_color() -> String {
    "white".to_string()
}
fn default_enabled() -> bool {
    true
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_temperature() -> f32 {
    0.7
}

/// A tool permission override: force a tool's permission level instead of
/// the registry's declared default.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionOverride {
    pub tool_name: String,
    pub level: String,
}

fn default_ordering_strategy() -> String {
    "confidence".to_string()
}
fn default_silence_threshold() -> f32 {
    crate::speaker::DEFAULT_SILENCE_THRESHOLD
}
fn default_evaluation_deadline_secs() -> u64 {
    crate::speaker::DEFAULT_EVALUATION_DEADLINE.as_secs()
}
fn default_tool_deadline_secs() -> u64 {
    crate::turn::DEFAULT_TOOL_DEADLINE.as_secs()
}
fn default_summarization_enabled() -> bool {
    true
}
fn default_summarization_threshold() -> u32 {
    crate::summarizer::DEFAULT_SUMMARIZATION_THRESHOLD
}
fn default_max_context_tokens() -> u32 {
    8192
}
fn default_max_tool_iterations() -> usize {
    crate::turn::DEFAULT_MAX_ITERATIONS
}

/// Everything the config file may declare. Deserialized directly from
/// TOML; any field absent from the file falls back to its default rather
/// than failing the load.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub deepseek_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub project: Option<String>,

    #[serde(default)]
    pub participants: Vec<ParticipantConfig>,

    #[serde(default = "default_ordering_strategy")]
    pub ordering_strategy: String,
    #[serde(default)]
    pub fixed_order: Vec<String>,

    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: u32,
    #[serde(default = "default_evaluation_deadline_secs")]
    pub evaluation_deadline_secs: u64,
    #[serde(default = "default_tool_deadline_secs")]
    pub tool_deadline_secs: u64,
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    #[serde(default = "default_summarization_enabled")]
    pub summarization_enabled: bool,
    #[serde(default = "default_summarization_threshold")]
    pub summarization_threshold: u32,

    #[serde(default)]
    pub permission_overrides: Vec<PermissionOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            deepseek_api_key: None,
            anthropic_api_key: None,
            database_url: None,
            project: None,
            participants: Vec::new(),
            ordering_strategy: default_ordering_strategy(),
            fixed_order: Vec::new(),
            silence_threshold: default_silence_threshold(),
            max_context_tokens: default_max_context_tokens(),
            evaluation_deadline_secs: default_evaluation_deadline_secs(),
            tool_deadline_secs: default_tool_deadline_secs(),
            max_tool_iterations: default_max_tool_iterations(),
            summarization_enabled: default_summarization_enabled(),
            summarization_threshold: default_summarization_threshold(),
            permission_overrides: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from `~/.ensemble/config.toml`, falling back to
    /// defaults if the file is absent or fails to parse — a malformed
    /// config file should never prevent the assistant from starting.
    pub fn load() -> Self {
        let path = config_path();

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: failed to parse {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: failed to read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Get a value with fallback to an environment variable.
    pub fn get_or_env(&self, field: Option<&String>, env_var: &str) -> Option<String> {
        field.cloned().or_else(|| std::env::var(env_var).ok())
    }

    fn ordering_strategy(&self) -> OrderingStrategy {
        match self.ordering_strategy.as_str() {
            "rotate" => OrderingStrategy::Rotate,
            "fixed" => OrderingStrategy::Fixed,
            _ => OrderingStrategy::Confidence,
        }
    }

    /// Derive the executor's tunables from this config. `participants`
    /// config is handed out separately (via `self.participants`) since
    /// turning it into live `Participant`/`ModelClient` pairs needs the
    /// binary's provider wiring, which this crate deliberately knows
    /// nothing about.
    pub fn executor_config(&self) -> TurnExecutorConfig {
        TurnExecutorConfig {
            evaluation_deadline: Duration::from_secs(self.evaluation_deadline_secs),
            silence_threshold: self.silence_threshold,
            tool_deadline: Duration::from_secs(self.tool_deadline_secs),
            max_tool_iterations: self.max_tool_iterations,
            ordering_strategy: self.ordering_strategy(),
            fixed_order: self.fixed_order.clone(),
            summarization_enabled: self.summarization_enabled,
            summarization_threshold: self.summarization_threshold,
            max_tokens: self.max_context_tokens,
            temperature: 0.7,
        }
    }
}

/// The config file path: `~/.ensemble/config.toml`.
pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".ensemble")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_credentials() {
        let config = Config::default();
        assert!(config.openai_api_key.is_none());
        assert!(config.deepseek_api_key.is_none());
        assert_eq!(config.participants.len(), 0);
    }

    #[test]
    fn config_path_points_at_dotfile() {
        let path = config_path();
        assert!(path.to_string_lossy().contains(".ensemble"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn ordering_strategy_falls_back_to_confidence() {
        let mut config = Config::default();
        config.ordering_strategy = "nonsense".to_string();
        assert_eq!(config.ordering_strategy(), OrderingStrategy::Confidence);
    }

    #[test]
    fn parses_a_minimal_toml_document() {
        let toml_str = r#"
            ordering_strategy = "rotate"
            silence_threshold = 0.4

            [[participants]]
            id = "claude"
            display_name = "Claude"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.participants.len(), 1);
        assert_eq!(config.participants[0].max_tokens, default_max_tokens());
        assert_eq!(config.ordering_strategy(), OrderingStrategy::Rotate);
    }

    #[test]
    fn get_or_env_prefers_explicit_field() {
        let config = Config::default();
        let explicit = Some("explicit-key".to_string());
        assert_eq!(
            config.get_or_env(explicit.as_ref(), "ENSEMBLE_TEST_VAR_DOES_NOT_EXIST"),
            Some("explicit-key".to_string())
        );
    }
}
