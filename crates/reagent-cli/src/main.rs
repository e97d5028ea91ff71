//! Reagent CLI — entry point.
//!
//! # Commands
//!
//! - `reagent ask <QUERY>` — run one query and print the answer
//! - `reagent chat` — interactive REPL
//! - `reagent tools` — list the tools the agent can call
//! - `reagent status` — show configuration and credential status
//! - `reagent init` — write a default config file

mod helpers;
mod init;
mod repl;
mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use reagent_agent::{default_registry, AgentLoop, QueryRequest};
use reagent_core::config::{load_config, Config};
use reagent_providers::create_gateway;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Reagent — a ReAct-style reasoning agent with tools
#[derive(Parser)]
#[command(name = "reagent", version, about, long_about = None)]
struct Cli {
    /// Path to the config file (defaults to ~/.reagent/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single query
    Ask {
        /// The question or task for the agent
        query: String,

        /// API key for this run only (overrides the configured key)
        #[arg(long)]
        api_key: Option<String>,

        /// Print the full reasoning trace and tool log
        #[arg(long, default_value_t = false)]
        trace: bool,

        /// Print the run result as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Interactive chat (REPL)
    Chat {
        /// Print the reasoning trace after each answer
        #[arg(long, default_value_t = false)]
        trace: bool,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// List available tools
    Tools,

    /// Show configuration and credential status
    Status,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing config file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Ask {
            query,
            api_key,
            trace,
            json,
            logs,
        } => {
            init_logging(logs);
            let config = load_config(config_path);
            run_ask(&config, query, api_key, trace, json).await
        }
        Commands::Chat { trace, logs } => {
            init_logging(logs);
            let config = load_config(config_path);
            let agent_loop = build_agent_loop(&config)?;
            repl::run(agent_loop, trace).await
        }
        Commands::Tools => {
            let config = load_config(config_path);
            helpers::print_catalogue(&default_registry(&config.tools).descriptors());
            Ok(())
        }
        Commands::Status => status::run(config_path),
        Commands::Init { force } => init::run(config_path, force),
    }
}

// ─────────────────────────────────────────────
// Ask command
// ─────────────────────────────────────────────

async fn run_ask(
    config: &Config,
    query: String,
    api_key: Option<String>,
    trace: bool,
    json: bool,
) -> Result<()> {
    let agent_loop = match api_key.as_deref() {
        // The per-run key doubles as the gateway key when none is configured.
        Some(key) if !config.provider.is_configured() => {
            let mut config = config.clone();
            config.provider.api_key = key.to_string();
            build_agent_loop(&config)?
        }
        _ => build_agent_loop(config)?,
    };

    let mut request = QueryRequest::new(query);
    if let Some(key) = api_key {
        request = request.with_api_key(key);
    }

    let cancel = CancellationToken::new();
    let watcher = spawn_ctrl_c_watcher(cancel.clone());
    info!("processing single query");
    let outcome = agent_loop.run_with_cancel(request, cancel).await;
    watcher.abort();

    match outcome {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                if trace {
                    helpers::print_trace(&result.conversation, &result.tool_invocations);
                }
                helpers::print_response(&result);
            }
            Ok(())
        }
        Err(failure) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&helpers::failure_json(&failure))?);
            } else if trace {
                helpers::print_trace(&failure.conversation, &failure.tool_invocations);
            }
            Err(failure).context("query failed")
        }
    }
}

/// Cancel `token` on Ctrl-C. Abort the returned handle once the run is over.
pub(crate) fn spawn_ctrl_c_watcher(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

/// Build an `AgentLoop` from the loaded configuration.
pub fn build_agent_loop(config: &Config) -> Result<AgentLoop> {
    let gateway = create_gateway(config)
        .context("failed to create model gateway (run `reagent init` and set provider.apiKey)")?;

    let tools = default_registry(&config.tools);
    Ok(AgentLoop::new(
        Arc::new(gateway),
        Arc::new(tools),
        Some(config.agent.max_iterations as usize),
    ))
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("reagent=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_ask_flags() {
        let cli = Cli::try_parse_from([
            "reagent", "ask", "find *.md", "--api-key", "sk-x", "--trace", "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask {
                query,
                api_key,
                trace,
                json,
                logs,
            } => {
                assert_eq!(query, "find *.md");
                assert_eq!(api_key.as_deref(), Some("sk-x"));
                assert!(trace && json && !logs);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn cli_global_config_flag() {
        let cli = Cli::try_parse_from(["reagent", "status", "--config", "/tmp/c.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn build_requires_api_key() {
        let config = Config::default();
        assert!(build_agent_loop(&config).is_err());
    }

    #[test]
    fn build_uses_configured_budget() {
        let mut config = Config::default();
        config.provider.api_key = "sk-test".into();
        config.agent.max_iterations = 7;
        let agent_loop = build_agent_loop(&config).unwrap();
        assert_eq!(agent_loop.max_iterations(), 7);
        assert_eq!(agent_loop.tools().len(), 3);
    }
}
