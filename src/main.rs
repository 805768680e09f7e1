//! `ensemble` — a conversation orchestration core for a multi-model AI
//! coding assistant.
//!
//! Wires a configured participant roster, their model clients, the
//! built-in tool set, and a SQLite-backed persistence store into a
//! `TurnExecutor`, then either drives it from an interactive REPL or
//! exposes it over an SSE HTTP server.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ensemble::config::Config;
use ensemble::cost::{ModelPricing, PricingTable};
use ensemble::model::Participant;
use ensemble::persistence::{PersistenceStore, SqliteStore};
use ensemble::provider::http::{HttpClientConfig, HttpModelClient};
use ensemble::provider::ModelClient;
use ensemble::tools::builtin::{ReadFileTool, WriteFileTool, RunShellTool};
use ensemble::tools::{DefaultPermissionManager, PermissionLevel, PermissionManager, ToolRegistry};
use ensemble::TurnExecutor;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

mod repl;
mod server;

#[derive(Parser)]
#[command(name = "ensemble")]
#[command(about = "Conversation orchestration core for a multi-model AI coding assistant")]
struct Args {
    /// Run as an HTTP/SSE server instead of the interactive REPL.
    #[arg(long)]
    serve: bool,

    /// HTTP server port, only used with --serve.
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Database path (sqlite URL).
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// OpenAI API key.
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: Option<String>,

    /// DeepSeek API key.
    #[arg(long, env = "DEEPSEEK_API_KEY")]
    deepseek_api_key: Option<String>,

    /// Anthropic API key.
    #[arg(long, env = "ANTHROPIC_API_KEY")]
    anthropic_api_key: Option<String>,

    /// Project root (defaults to the current directory).
    #[arg(long, short = 'p')]
    project: Option<String>,
}

/// Base URL, default model id, and config-field accessor for a named
/// provider. Unrecognized provider names fall back to OpenAI's
/// chat-completions-shaped endpoint, since the generic `HttpModelClient`
/// speaks that wire format regardless of which backend actually serves it.
fn provider_defaults(provider: &str) -> (&'static str, &'static str) {
    match provider {
        "deepseek" => ("https://api.deepseek.com", "deepseek-chat"),
        "anthropic" => ("https://api.anthropic.com/v1", "claude-sonnet-4-5"),
        _ => ("https://api.openai.com/v1", "gpt-5.2"),
    }
}

/// Published $/million-token rates for the default model behind each
/// provider, used only to populate `Message.usage.cost_estimate` — an
/// estimate for the user's own awareness, not a billing record.
fn default_pricing(provider: &str) -> ModelPricing {
    match provider {
        "deepseek" => ModelPricing::new(0.27, 1.10),
        "anthropic" => ModelPricing::new(3.00, 15.00),
        _ => ModelPricing::new(2.50, 10.00),
    }
}

fn resolve_api_key(config: &Config, provider: &str) -> Option<String> {
    match provider {
        "deepseek" => config.get_or_env(config.deepseek_api_key.as_ref(), "DEEPSEEK_API_KEY"),
        "anthropic" => config.get_or_env(config.anthropic_api_key.as_ref(), "ANTHROPIC_API_KEY"),
        _ => config.get_or_env(config.openai_api_key.as_ref(), "OPENAI_API_KEY"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_path = dirs::home_dir()
        .map(|h| h.join(".ensemble").join(".env"))
        .filter(|p| p.exists());
    if let Some(path) = env_path {
        let _ = dotenvy::from_path(&path);
    } else {
        let _ = dotenvy::dotenv();
    }

    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let mut config = Config::load();

    if let Some(key) = args.openai_api_key {
        config.openai_api_key = Some(key);
    }
    if let Some(key) = args.deepseek_api_key {
        config.deepseek_api_key = Some(key);
    }
    if let Some(key) = args.anthropic_api_key {
        config.anthropic_api_key = Some(key);
    }
    if let Some(url) = args.database_url.clone() {
        config.database_url = Some(url);
    }

    let project_root = args
        .project
        .clone()
        .or_else(|| config.project.clone())
        .or_else(|| std::env::current_dir().ok().map(|p| p.to_string_lossy().to_string()))
        .unwrap_or_else(|| ".".to_string());
    let project_root = std::path::Path::new(&project_root)
        .canonicalize()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or(project_root);

    use repl::colors::ansi::*;

    println!();
    println!("{}{}ensemble {}{}", BOLD, MAGENTA, env!("CARGO_PKG_VERSION"), RESET);
    println!("{}", repl::colors::separator(50));
    println!("{}", repl::colors::banner_line("Project", &project_root));

    let database_url = config
        .database_url
        .clone()
        .unwrap_or_else(|| "sqlite://ensemble.db?mode=rwc".to_string());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .with_context(|| format!("connecting to {database_url}"))?;
    let store: Arc<dyn PersistenceStore> = Arc::new(SqliteStore::new(pool).await?);
    println!("{}", repl::colors::banner_line("Database", "connected"));

    let mut participants = Vec::new();
    let mut clients: HashMap<String, Arc<dyn ModelClient>> = HashMap::new();
    let mut summarizer_client: Option<Arc<dyn ModelClient>> = None;
    let mut pricing = PricingTable::new();

    for participant_config in &config.participants {
        if !participant_config.enabled {
            continue;
        }
        let provider = participant_config.provider.as_deref().unwrap_or("openai");
        let Some(api_key) = resolve_api_key(&config, provider) else {
            println!(
                "{}",
                repl::colors::banner_line(
                    &participant_config.display_name,
                    &format!("skipped (no {provider} api key)")
                )
            );
            continue;
        };

        let (base_url, default_model) = provider_defaults(provider);
        let client: Arc<dyn ModelClient> = Arc::new(HttpModelClient::new(HttpClientConfig {
            base_url: base_url.to_string(),
            model: default_model.to_string(),
            api_key,
        }));

        println!(
            "{}",
            repl::colors::banner_line(&participant_config.display_name, &format!("{provider} ({default_model})"))
        );

        participants.push(Participant {
            id: participant_config.id.clone(),
            display_name: participant_config.display_name.clone(),
            color: participant_config.color.clone(),
            enabled: participant_config.enabled,
            max_tokens: participant_config.max_tokens,
            temperature: participant_config.temperature,
        });
        if summarizer_client.is_none() {
            summarizer_client = Some(Arc::clone(&client));
        }
        pricing = pricing.with(participant_config.id.clone(), default_pricing(provider));
        clients.insert(participant_config.id.clone(), client);
    }

    if participants.is_empty() {
        anyhow::bail!(
            "no enabled participants with a resolvable API key; configure at least one in {}",
            ensemble::config::config_path().display()
        );
    }

    let mut tools = ToolRegistry::new();
    let cwd = std::path::PathBuf::from(&project_root);
    tools.register(Arc::new(ReadFileTool { cwd: cwd.clone() }));
    tools.register(Arc::new(WriteFileTool { cwd: cwd.clone() }));
    tools.register(Arc::new(RunShellTool { cwd: cwd.clone() }));

    for override_entry in &config.permission_overrides {
        match PermissionLevel::parse(&override_entry.level) {
            Some(level) => tools.override_permission(&override_entry.tool_name, level),
            None => {
                tracing::warn!(
                    tool = %override_entry.tool_name,
                    level = %override_entry.level,
                    "ignoring permission override with unrecognized level"
                );
            }
        }
    }
    let tools = Arc::new(tools);

    let permissions: Arc<dyn PermissionManager> = Arc::new(DefaultPermissionManager::new());

    let executor = Arc::new(TurnExecutor::with_pricing(
        Arc::clone(&store),
        participants,
        clients,
        tools,
        permissions,
        summarizer_client,
        config.executor_config(),
        pricing,
    ));

    println!("{}", repl::colors::separator(50));
    println!();

    if args.serve {
        server::run(args.port, executor, store).await
    } else {
        let session = store.create_session(None, Some(project_root)).await?;
        let mut repl = repl::Repl::new(executor, store, session.id)?;
        repl.run().await
    }
}
