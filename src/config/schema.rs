//! KDL schema for config.kdl.
//!
//! This module provides:
//! - The Rust struct representing the KDL schema
//! - Parsing from KDL format
//! - Validation
//! - Loading from disk

use crate::{Error, Result};
use kdl::{KdlDocument, KdlValue};
use std::path::{Path, PathBuf};

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE: &str = "config.kdl";

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "TM_CONFIG_DIR";

/// User settings stored in config.kdl.
///
/// Every field is optional; unset fields fall through to environment
/// variables and built-in defaults during resolution.
///
/// # KDL Schema
///
/// ```kdl
/// ollama-url "http://localhost:11434"
/// ollama-model "llama3.1"
/// temperature 0.7
/// top-p 0.9
/// num-predict 800
/// probe-timeout-secs 5
/// host "127.0.0.1"
/// port 8000
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskmindConfig {
    /// Base URL of the Ollama server
    pub ollama_url: Option<String>,

    /// Preferred model for insights
    pub ollama_model: Option<String>,

    /// Sampling temperature (0.0-2.0)
    pub temperature: Option<f64>,

    /// Nucleus sampling threshold (0.0-1.0)
    pub top_p: Option<f64>,

    /// Maximum tokens generated per insight
    pub num_predict: Option<u32>,

    /// Timeout for the model listing probe
    pub probe_timeout_secs: Option<u64>,

    /// Web server bind address
    pub host: Option<String>,

    /// Web server port
    pub port: Option<u16>,
}

impl TaskmindConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(url) = &self.ollama_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("ollama-url must start with http:// or https://, got {}", url));
            }
        }
        if let Some(model) = &self.ollama_model {
            if model.trim().is_empty() {
                return Err("ollama-model must not be empty".to_string());
            }
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(format!("temperature must be 0.0-2.0, got {}", t));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("top-p must be 0.0-1.0, got {}", p));
            }
        }
        if self.num_predict == Some(0) {
            return Err("num-predict must be positive".to_string());
        }
        if self.probe_timeout_secs == Some(0) {
            return Err("probe-timeout-secs must be positive".to_string());
        }
        if self.port == Some(0) {
            return Err("port must be 1-65535".to_string());
        }
        if let Some(host) = &self.host {
            if host.parse::<std::net::IpAddr>().is_err() {
                return Err(format!("host must be an IP address, got {}", host));
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    ///
    /// Unknown nodes are ignored. A known node whose value has the wrong
    /// type or does not fit the field is a config error naming the node.
    pub fn from_kdl(doc: &KdlDocument) -> Result<Self> {
        Ok(Self {
            ollama_url: string_arg(doc, "ollama-url")?,
            ollama_model: string_arg(doc, "ollama-model")?,
            temperature: float_arg(doc, "temperature")?,
            top_p: float_arg(doc, "top-p")?,
            num_predict: integer_arg(doc, "num-predict")?,
            probe_timeout_secs: integer_arg(doc, "probe-timeout-secs")?,
            host: string_arg(doc, "host")?,
            port: integer_arg(doc, "port")?,
        })
    }

    /// Load and validate the config at `path`.
    ///
    /// Returns an empty config if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let doc: KdlDocument = content
            .parse()
            .map_err(|e| Error::Config(format!("Failed to parse KDL in {}: {}", path.display(), e)))?;

        let in_file = |msg: String| Error::Config(format!("{}: {}", path.display(), msg));
        let config = Self::from_kdl(&doc).map_err(|e| match e {
            Error::Config(msg) => in_file(msg),
            other => other,
        })?;
        config.validate().map_err(in_file)?;
        Ok(config)
    }
}

/// Directory holding config.kdl.
///
/// `TM_CONFIG_DIR` wins, otherwise `<config dir>/taskmind`.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    dirs::config_dir().map(|d| d.join("taskmind"))
}

/// Full path of config.kdl, if a config directory can be determined.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(CONFIG_FILE))
}

fn first_value<'a>(doc: &'a KdlDocument, name: &str) -> Result<Option<&'a KdlValue>> {
    match doc.get(name) {
        None => Ok(None),
        Some(node) => node
            .entries()
            .first()
            .map(|entry| Some(entry.value()))
            .ok_or_else(|| Error::Config(format!("{} requires a value", name))),
    }
}

fn string_arg(doc: &KdlDocument, name: &str) -> Result<Option<String>> {
    match first_value(doc, name)? {
        None => Ok(None),
        Some(KdlValue::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(Error::Config(format!("{} must be a string, got {}", name, other))),
    }
}

fn integer_arg<T: TryFrom<i128>>(doc: &KdlDocument, name: &str) -> Result<Option<T>> {
    match first_value(doc, name)? {
        None => Ok(None),
        Some(KdlValue::Integer(i)) => T::try_from(*i)
            .map(Some)
            .map_err(|_| Error::Config(format!("{} is out of range, got {}", name, i))),
        Some(other) => Err(Error::Config(format!("{} must be an integer, got {}", name, other))),
    }
}

/// Floats also accept integer literals (`temperature 1`).
fn float_arg(doc: &KdlDocument, name: &str) -> Result<Option<f64>> {
    match first_value(doc, name)? {
        None => Ok(None),
        Some(KdlValue::Float(f)) => Ok(Some(*f)),
        Some(KdlValue::Integer(i)) => Ok(Some(*i as f64)),
        Some(other) => Err(Error::Config(format!("{} must be a number, got {}", name, other))),
    }
}
