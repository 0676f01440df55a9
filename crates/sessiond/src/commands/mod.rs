//! CLI command handlers.

pub mod config;
pub mod run;
pub mod simulate;

use std::path::Path;

use anyhow::{Context as _, Result};
use sessiond_config::{ConfigSource, LoadedConfig};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Configuration and where it came from.
    pub loaded: LoadedConfig,
}

/// Load configuration from an explicit file, or by discovery.
pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let Some(path) = explicit else {
        return sessiond_config::load_config(None).context("failed to load configuration");
    };

    let config = sessiond_config::load_config_file(path)?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(LoadedConfig {
        config,
        sources: vec![ConfigSource {
            path: path.to_path_buf(),
            loaded: true,
        }],
        warnings: Vec::new(),
    })
}
