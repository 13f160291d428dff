//! Precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`TM_OLLAMA_URL`, `TM_OLLAMA_MODEL`, `TM_HOST`, `TM_PORT`)
//! 3. config.kdl (`~/.config/taskmind/config.kdl`)
//! 4. Built-in defaults

use crate::config::schema::{TaskmindConfig, config_path};
use crate::inference::{ChatOptions, DEFAULT_BASE_URL, OllamaClient};
use crate::insights::{DEFAULT_MODEL, InsightSettings};
use crate::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const OLLAMA_URL_ENV: &str = "TM_OLLAMA_URL";
pub const OLLAMA_MODEL_ENV: &str = "TM_OLLAMA_MODEL";
pub const HOST_ENV: &str = "TM_HOST";
pub const PORT_ENV: &str = "TM_PORT";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from config.kdl
    ConfigFile,
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    /// Create a new resolved value.
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub ollama_url: Resolved<String>,
    pub ollama_model: Resolved<String>,
    pub temperature: Resolved<f64>,
    pub top_p: Resolved<f64>,
    pub num_predict: Resolved<u32>,
    pub probe_timeout_secs: Resolved<u64>,
    pub host: Resolved<String>,
    pub port: Resolved<u16>,
    /// config.kdl location, whether or not it exists
    pub config_path: Option<PathBuf>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        let options = ChatOptions::default();
        Self {
            ollama_url: Resolved::new(DEFAULT_BASE_URL.to_string(), ValueSource::Default),
            ollama_model: Resolved::new(DEFAULT_MODEL.to_string(), ValueSource::Default),
            temperature: Resolved::new(f64::from(options.temperature), ValueSource::Default),
            top_p: Resolved::new(f64::from(options.top_p), ValueSource::Default),
            num_predict: Resolved::new(options.num_predict, ValueSource::Default),
            probe_timeout_secs: Resolved::new(DEFAULT_PROBE_TIMEOUT_SECS, ValueSource::Default),
            host: Resolved::new(DEFAULT_HOST.to_string(), ValueSource::Default),
            port: Resolved::new(DEFAULT_PORT, ValueSource::Default),
            config_path: None,
        }
    }
}

impl ResolvedConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.value)
    }

    /// Model and sampling options for the insight generator.
    pub fn insight_settings(&self) -> InsightSettings {
        InsightSettings {
            model: self.ollama_model.value.clone(),
            options: ChatOptions {
                temperature: self.temperature.value as f32,
                top_p: self.top_p.value as f32,
                num_predict: self.num_predict.value,
            },
        }
    }

    /// Check the final values, whichever layer they came from.
    pub fn validate(&self) -> Result<()> {
        let values = TaskmindConfig {
            ollama_url: Some(self.ollama_url.value.clone()),
            ollama_model: Some(self.ollama_model.value.clone()),
            temperature: Some(self.temperature.value),
            top_p: Some(self.top_p.value),
            num_predict: Some(self.num_predict.value),
            probe_timeout_secs: Some(self.probe_timeout_secs.value),
            host: Some(self.host.value.clone()),
            port: Some(self.port.value),
        };
        values.validate().map_err(Error::Config)
    }

    /// Client for the configured Ollama server.
    pub fn ollama_client(&self) -> OllamaClient {
        OllamaClient::new(self.ollama_url.value.clone(), self.probe_timeout())
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub ollama_url: Option<String>,
    pub ollama_model: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ConfigOverrides {
    /// Create empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}

/// Resolve configuration from CLI flags, the process environment and config.kdl.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let path = config_path();
    let file = match &path {
        Some(p) => TaskmindConfig::load(p)?,
        None => TaskmindConfig::default(),
    };

    let mut resolved = resolve_with(&file, overrides, |name| std::env::var(name).ok())?;
    resolved.config_path = path;
    Ok(resolved)
}

/// Resolve from an already-loaded file and an environment lookup.
pub fn resolve_with<F>(file: &TaskmindConfig, overrides: &ConfigOverrides, env: F) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let env = |name: &str| env(name).filter(|v| !v.is_empty());
    let mut result = ResolvedConfig::default();

    if let Some(ref url) = overrides.ollama_url {
        result.ollama_url = Resolved::new(url.clone(), ValueSource::CliFlag);
    } else if let Some(url) = env(OLLAMA_URL_ENV) {
        result.ollama_url = Resolved::new(url, ValueSource::EnvVar(OLLAMA_URL_ENV.to_string()));
    } else if let Some(ref url) = file.ollama_url {
        result.ollama_url = Resolved::new(url.clone(), ValueSource::ConfigFile);
    }

    if let Some(ref model) = overrides.ollama_model {
        result.ollama_model = Resolved::new(model.clone(), ValueSource::CliFlag);
    } else if let Some(model) = env(OLLAMA_MODEL_ENV) {
        result.ollama_model = Resolved::new(model, ValueSource::EnvVar(OLLAMA_MODEL_ENV.to_string()));
    } else if let Some(ref model) = file.ollama_model {
        result.ollama_model = Resolved::new(model.clone(), ValueSource::ConfigFile);
    }

    if let Some(ref host) = overrides.host {
        result.host = Resolved::new(host.clone(), ValueSource::CliFlag);
    } else if let Some(host) = env(HOST_ENV) {
        result.host = Resolved::new(host, ValueSource::EnvVar(HOST_ENV.to_string()));
    } else if let Some(ref host) = file.host {
        result.host = Resolved::new(host.clone(), ValueSource::ConfigFile);
    }

    if let Some(port) = overrides.port {
        result.port = Resolved::new(port, ValueSource::CliFlag);
    } else if let Some(raw) = env(PORT_ENV) {
        let port = raw
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| Error::Config(format!("{} must be a port number, got {}", PORT_ENV, raw)))?;
        result.port = Resolved::new(port, ValueSource::EnvVar(PORT_ENV.to_string()));
    } else if let Some(port) = file.port {
        result.port = Resolved::new(port, ValueSource::ConfigFile);
    }

    // File-only settings
    if let Some(t) = file.temperature {
        result.temperature = Resolved::new(t, ValueSource::ConfigFile);
    }
    if let Some(p) = file.top_p {
        result.top_p = Resolved::new(p, ValueSource::ConfigFile);
    }
    if let Some(n) = file.num_predict {
        result.num_predict = Resolved::new(n, ValueSource::ConfigFile);
    }
    if let Some(secs) = file.probe_timeout_secs {
        result.probe_timeout_secs = Resolved::new(secs, ValueSource::ConfigFile);
    }

    result.validate()?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{CONFIG_DIR_ENV, CONFIG_FILE};
    use serial_test::serial;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ==================== ValueSource Tests ====================

    #[test]
    fn test_value_source_display() {
        assert_eq!(
            format!("{}", ValueSource::EnvVar("FOO".to_string())),
            "env:FOO"
        );
        assert_eq!(format!("{}", ValueSource::ConfigFile), "config");
        assert_eq!(format!("{}", ValueSource::CliFlag), "cli");
        assert_eq!(format!("{}", ValueSource::Default), "default");
    }

    #[test]
    fn test_value_source_serializes_as_display() {
        let json = serde_json::to_value(ValueSource::EnvVar(PORT_ENV.to_string())).unwrap();
        assert_eq!(json, "env:TM_PORT");
    }

    // ==================== Resolution Tests ====================

    #[test]
    fn test_resolve_defaults() {
        let config = resolve_with(&TaskmindConfig::default(), &ConfigOverrides::default(), no_env).unwrap();

        assert_eq!(config.ollama_url.value, "http://localhost:11434");
        assert_eq!(config.ollama_url.source, ValueSource::Default);
        assert_eq!(config.ollama_model.value, "llama3.1");
        assert_eq!(config.host.value, "127.0.0.1");
        assert_eq!(config.port.value, 8000);
        assert_eq!(config.port.source, ValueSource::Default);
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.insight_settings(), InsightSettings::default());
    }

    #[test]
    fn test_resolve_from_file() {
        let file = TaskmindConfig {
            ollama_model: Some("mistral".to_string()),
            num_predict: Some(300),
            port: Some(9000),
            ..Default::default()
        };
        let config = resolve_with(&file, &ConfigOverrides::default(), no_env).unwrap();

        assert_eq!(config.ollama_model.value, "mistral");
        assert_eq!(config.ollama_model.source, ValueSource::ConfigFile);
        assert_eq!(config.port.value, 9000);
        assert_eq!(config.insight_settings().options.num_predict, 300);
        assert_eq!(config.ollama_url.source, ValueSource::Default);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = TaskmindConfig {
            ollama_model: Some("mistral".to_string()),
            port: Some(9000),
            ..Default::default()
        };
        let env = env_from(&[(OLLAMA_MODEL_ENV, "llama3"), (PORT_ENV, "9100")]);
        let config = resolve_with(&file, &ConfigOverrides::default(), env).unwrap();

        assert_eq!(config.ollama_model.value, "llama3");
        assert_eq!(
            config.ollama_model.source,
            ValueSource::EnvVar(OLLAMA_MODEL_ENV.to_string())
        );
        assert_eq!(config.port.value, 9100);
    }

    #[test]
    fn test_cli_overrides_env() {
        let env = env_from(&[(HOST_ENV, "0.0.0.0"), (PORT_ENV, "9100")]);
        let overrides = ConfigOverrides::new().with_host("192.168.1.10").with_port(7000);
        let config = resolve_with(&TaskmindConfig::default(), &overrides, env).unwrap();

        assert_eq!(config.host.value, "192.168.1.10");
        assert_eq!(config.host.source, ValueSource::CliFlag);
        assert_eq!(config.port.value, 7000);
        assert_eq!(config.port.source, ValueSource::CliFlag);
    }

    #[test]
    fn test_empty_env_value_ignored() {
        let env = env_from(&[(OLLAMA_URL_ENV, "")]);
        let config = resolve_with(&TaskmindConfig::default(), &ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.ollama_url.source, ValueSource::Default);
    }

    #[test]
    fn test_invalid_port_env() {
        let env = env_from(&[(PORT_ENV, "not-a-port")]);
        let err = resolve_with(&TaskmindConfig::default(), &ConfigOverrides::default(), env).unwrap_err();
        assert!(err.to_string().contains("TM_PORT"));
    }

    #[test]
    fn test_invalid_cli_and_env_values_rejected() {
        let overrides = ConfigOverrides {
            ollama_url: Some("localhost:11434".to_string()),
            ..Default::default()
        };
        let err = resolve_with(&TaskmindConfig::default(), &overrides, no_env).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("ollama-url"));

        let env = env_from(&[(OLLAMA_MODEL_ENV, "   ")]);
        let err = resolve_with(&TaskmindConfig::default(), &ConfigOverrides::default(), env).unwrap_err();
        assert!(err.to_string().contains("ollama-model"));

        let env = env_from(&[(HOST_ENV, "not a host")]);
        let err = resolve_with(&TaskmindConfig::default(), &ConfigOverrides::default(), env).unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_cli_flag_fixes_invalid_env() {
        let env = env_from(&[(OLLAMA_URL_ENV, "gpu-box:11434")]);
        let overrides = ConfigOverrides {
            ollama_url: Some("http://gpu-box:11434".to_string()),
            ..Default::default()
        };
        let config = resolve_with(&TaskmindConfig::default(), &overrides, env).unwrap();
        assert_eq!(config.ollama_url.source, ValueSource::CliFlag);
    }

    #[test]
    #[serial]
    fn test_resolve_config_reads_config_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "ollama-url \"http://gpu-box:11434\"\ntemperature 0.2\n",
        )
        .unwrap();

        // SAFETY: We're in a test environment and this test runs serially
        unsafe { std::env::set_var(CONFIG_DIR_ENV, dir.path()) };
        let result = resolve_config(&ConfigOverrides::default());
        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };

        let config = result.unwrap();
        assert_eq!(config.ollama_url.value, "http://gpu-box:11434");
        assert_eq!(config.ollama_url.source, ValueSource::ConfigFile);
        assert_eq!(config.temperature.value, 0.2);
        assert_eq!(config.config_path, Some(dir.path().join(CONFIG_FILE)));
        assert_eq!(config.ollama_client().base_url(), "http://gpu-box:11434");
    }
}
