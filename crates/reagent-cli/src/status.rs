//! `reagent status` — show configuration and credential status.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use reagent_agent::default_registry;
use reagent_core::config::{get_config_path, load_config};
use reagent_core::utils::expand_home;

/// Run the status command.
pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(get_config_path);

    println!();
    println!("{}", "Reagent Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        path.display(),
        found_marker(path.exists())
    );

    let workspace = expand_home(&config.tools.workspace);
    println!(
        "  {:<18} {} {}{}",
        "Workspace:".bold(),
        workspace.display(),
        found_marker(workspace.exists()),
        if config.tools.restrict_to_workspace {
            " (restricted)".dimmed().to_string()
        } else {
            String::new()
        }
    );

    println!("  {:<18} {}", "Model:".bold(), config.agent.model);
    println!("  {:<18} {}", "API base:".bold(), config.provider.api_base);
    println!(
        "  {:<18} {}",
        "API key:".bold(),
        if config.provider.is_configured() {
            format!("{} (key set)", "✓".green())
        } else {
            format!("{}", "· not configured".dimmed())
        }
    );

    println!(
        "  {:<18} {} | max_tokens: {} | max_iterations: {}",
        "Parameters:".bold(),
        format!("temp: {}", config.agent.temperature).dimmed(),
        format!("{}", config.agent.max_tokens).dimmed(),
        format!("{}", config.agent.max_iterations).dimmed(),
    );
    println!(
        "  {:<18} {} attempt(s), {}ms base delay, {}s timeout",
        "Retry:".bold(),
        config.provider.max_attempts,
        config.provider.retry_base_delay_ms,
        config.provider.timeout_secs
    );

    let tools = default_registry(&config.tools).tool_names();
    println!("  {:<18} {}", "Tools:".bold(), tools.join(", "));

    println!();

    Ok(())
}

fn found_marker(exists: bool) -> String {
    if exists {
        "✓".green().to_string()
    } else {
        "(not found)".red().to_string()
    }
}
