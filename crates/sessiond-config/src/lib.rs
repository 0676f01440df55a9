//! Configuration system for sessiond.
//!
//! Provides TOML-based configuration with:
//! - A `[store]` section shaping the session store's windows and limits
//! - A `[logging]` section for console and rolling file output
//! - Config file layering (user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
