//! Config loader — reads `~/.reagent/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.reagent/config.json`
//! 3. Environment variables `REAGENT_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the given path (or the default one) + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    apply_env_overrides(load_config_from_path(&config_path))
}

/// Load config from a specific file path, without env overrides.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to parse config {}: {}", path.display(), e);
            Config::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `REAGENT_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `REAGENT_AGENT__MODEL`, `REAGENT_AGENT__MAX_ITERATIONS`,
///   `REAGENT_AGENT__MAX_TOKENS`, `REAGENT_AGENT__TEMPERATURE`
/// - `REAGENT_PROVIDER__API_KEY`, `REAGENT_PROVIDER__API_BASE`,
///   `REAGENT_PROVIDER__TIMEOUT_SECS`, `REAGENT_PROVIDER__MAX_ATTEMPTS`
/// - `REAGENT_TOOLS__WORKSPACE`, `REAGENT_TOOLS__RESTRICT_TO_WORKSPACE`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("REAGENT_AGENT__MODEL") {
        config.agent.model = val;
    }
    override_parsed("REAGENT_AGENT__MAX_ITERATIONS", &mut config.agent.max_iterations);
    override_parsed("REAGENT_AGENT__MAX_TOKENS", &mut config.agent.max_tokens);
    override_parsed("REAGENT_AGENT__TEMPERATURE", &mut config.agent.temperature);

    if let Ok(val) = std::env::var("REAGENT_PROVIDER__API_KEY") {
        config.provider.api_key = val;
    }
    if let Ok(val) = std::env::var("REAGENT_PROVIDER__API_BASE") {
        config.provider.api_base = val;
    }
    override_parsed("REAGENT_PROVIDER__TIMEOUT_SECS", &mut config.provider.timeout_secs);
    override_parsed("REAGENT_PROVIDER__MAX_ATTEMPTS", &mut config.provider.max_attempts);

    if let Ok(val) = std::env::var("REAGENT_TOOLS__WORKSPACE") {
        config.tools.workspace = val;
    }
    if let Ok(val) = std::env::var("REAGENT_TOOLS__RESTRICT_TO_WORKSPACE") {
        config.tools.restrict_to_workspace = val == "true" || val == "1";
    }

    config
}

/// Overwrite `target` when `var` is set and parses; unparsable values are ignored.
fn override_parsed<T: FromStr>(var: &str, target: &mut T) {
    if let Ok(val) = std::env::var(var) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(var = var, value = %val, "ignoring unparsable env override"),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
