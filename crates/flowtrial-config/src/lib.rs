//! Configuration system for flowtrial.
//!
//! Provides TOML-based configuration with:
//! - Trial defaults (`[trial]`): sandbox name, timeouts, results directory
//! - External collaborators (`[compiler]`, `[scanner]`, `[host]`)
//! - Repository layout conventions (`[paths]`)
//! - Config file layering (user config + project-local overrides)
//!
//! Command-line flags are applied on top by the binary.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
