//! Reagent core — shared types, configuration, and utilities.
//!
//! - **types**: conversation records, run results, chat wire format
//! - **config**: JSON + env configuration
//! - **utils**: paths and string helpers

pub mod config;
pub mod types;
pub mod utils;
