//! Command implementations
//!
//! Each submodule contains the implementation for a CLI command.

pub mod preview;
pub mod serve;
pub mod webhook;

// Re-export command functions for main.rs
pub use preview::*;
pub use serve::*;
pub use webhook::*;

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::Config;

/// Load config from `path` (or the default location) plus environment
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).context("Failed to load configuration")
}
