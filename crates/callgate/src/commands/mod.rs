//! CLI command handlers.

pub mod config;
pub mod serve;
pub mod token;

use std::path::PathBuf;

use callgate_config::LoadedConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, bypassing discovery.
    pub config_path: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load configuration from `--config` or by discovery.
    pub fn load_config(&self) -> callgate_config::Result<LoadedConfig> {
        match &self.config_path {
            Some(path) => callgate_config::load_explicit(path),
            None => callgate_config::load_config(None),
        }
    }
}
