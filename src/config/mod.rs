//! Configuration for taskmind.
//!
//! ## config.kdl - User settings
//!
//! Located at `~/.config/taskmind/config.kdl` (or `$TM_CONFIG_DIR/config.kdl`).
//!
//! Contains:
//! - `ollama-url` - Base URL of the Ollama server
//! - `ollama-model` - Preferred model for insights
//! - `temperature`, `top-p`, `num-predict` - Sampling options
//! - `probe-timeout-secs` - Timeout for the model listing probe
//! - `host`, `port` - Web server bind address
//!
//! ## Precedence
//!
//! CLI flag > environment variable > config.kdl > defaults
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    ConfigOverrides, Resolved, ResolvedConfig, ValueSource, resolve_config, resolve_with,
};
pub use schema::{CONFIG_DIR_ENV, CONFIG_FILE, TaskmindConfig, config_dir, config_path};
