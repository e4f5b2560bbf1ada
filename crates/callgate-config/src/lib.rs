//! Configuration system for the callgate BFF gateway.
//!
//! Provides TOML-based configuration with:
//! - Config file layering (user config + project-local overrides)
//! - `CALLGATE_*` environment overrides (upstream base URL, bind, port)
//! - Validation of the upstream base URL and listener settings

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    load_explicit, save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
