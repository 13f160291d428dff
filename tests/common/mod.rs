//! Common test utilities for taskmind integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute
//! the user's data or config directories.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A test environment with isolated data and config directories.
///
/// The `tm()` method returns a `Command` that sets `TM_DATA_DIR` and
/// `TM_CONFIG_DIR` per-invocation, making tests parallel-safe. Ollama is
/// pointed at a closed local port so no test talks to a real server.
pub struct TestEnv {
    pub data_dir: TempDir,
    pub config_dir: TempDir,
    pub dead_ollama_url: String,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
            dead_ollama_url: dead_url(),
        }
    }

    /// Get a Command for the tm binary with isolated directories.
    pub fn tm(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_tm"));
        cmd.env("TM_DATA_DIR", self.data_dir.path());
        cmd.env("TM_CONFIG_DIR", self.config_dir.path());
        cmd.env("TM_OLLAMA_URL", &self.dead_ollama_url);
        cmd.env_remove("TM_OLLAMA_MODEL");
        cmd.env_remove("TM_HOST");
        cmd.env_remove("TM_PORT");
        cmd.env_remove("TM_LOG");
        cmd
    }

    /// Create a task and return its ID.
    pub fn create_task(&self, title: &str) -> i64 {
        let output = self
            .tm()
            .args(["task", "create", title])
            .output()
            .unwrap();
        assert!(output.status.success(), "create failed: {:?}", output);
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        json["id"].as_i64().unwrap()
    }

    /// Run a command expected to succeed and parse its JSON output.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.tm().args(args).output().unwrap();
        assert!(output.status.success(), "command {:?} failed: {:?}", args, output);
        serde_json::from_slice(&output.stdout).unwrap()
    }

    /// Get the path to the data directory.
    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }

    /// Get the path to the config directory.
    pub fn config_path(&self) -> &std::path::Path {
        self.config_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// An http URL on which nothing listens.
pub fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
