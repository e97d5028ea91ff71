//! `reagent init` — write the default configuration file.
//!
//! Creates `~/.reagent/config.json` with defaults and the history directory.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use reagent_core::config::{get_config_path, save_config, Config};
use reagent_core::utils::get_history_path;

/// Run the init command.
pub fn run(config_path: Option<&Path>, force: bool) -> Result<()> {
    println!();
    println!("{}", "Reagent — Setup".cyan().bold());
    println!();

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(get_config_path);

    if write_default_config(&path, force)? {
        println!("  {} created config at {}", "✓".green(), path.display());
    } else {
        println!(
            "  {} config already exists at {} (use --force to overwrite)",
            "✓".green(),
            path.display()
        );
    }

    if let Some(history_dir) = get_history_path().parent() {
        std::fs::create_dir_all(history_dir)
            .with_context(|| format!("failed to create {}", history_dir.display()))?;
    }

    println!();
    println!(
        "{}",
        "Next: set provider.apiKey in the config (or REAGENT_PROVIDER__API_KEY), then run `reagent ask \"...\"`."
            .dimmed()
    );
    println!();

    Ok(())
}

/// Write defaults to `path`. Returns `false` if a file was already there and
/// `force` is off.
fn write_default_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    save_config(&Config::default(), Some(path))
        .with_context(|| format!("failed to write config to {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reagent_core::config::load_config;

    #[test]
    fn writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        assert!(write_default_config(&path, false).unwrap());
        assert!(path.exists());
        assert_eq!(load_config(Some(path.as_path())).agent.max_iterations, 5);

        std::fs::write(&path, r#"{"agent": {"model": "custom"}}"#).unwrap();
        assert!(!write_default_config(&path, false).unwrap());
        assert!(std::fs::read_to_string(&path).unwrap().contains("custom"));

        assert!(write_default_config(&path, true).unwrap());
        assert!(!std::fs::read_to_string(&path).unwrap().contains("custom"));
    }
}
