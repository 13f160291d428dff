//! taskmind - A task manager with insights from a local language model.
//!
//! This library provides the core functionality for the `tm` CLI tool and its
//! web server, including task storage, the Ollama client, and insight
//! generation.

pub mod cli;
pub mod commands;
pub mod config;
pub mod inference;
pub mod insights;
pub mod logging;
pub mod models;
pub mod storage;
#[cfg(feature = "web")]
pub mod web;

/// Test utilities for isolated test environments.
#[cfg(test)]
pub(crate) mod test_utils {
    use std::path::Path;
    use tempfile::TempDir;

    use crate::storage::Storage;

    /// Test environment with an isolated data directory.
    pub struct TestEnv {
        pub data_dir: TempDir,
    }

    impl TestEnv {
        pub fn new() -> Self {
            Self {
                data_dir: TempDir::new().unwrap(),
            }
        }

        /// Get the path to the isolated data directory.
        pub fn data_path(&self) -> &Path {
            self.data_dir.path()
        }

        /// Open (creating if needed) storage for this test environment.
        pub fn open_storage(&self) -> Storage {
            Storage::open_in(self.data_path()).unwrap()
        }
    }

    impl Default for TestEnv {
        fn default() -> Self {
            Self::new()
        }
    }
}

/// Library-level error type for taskmind operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for taskmind operations.
pub type Result<T> = std::result::Result<T, Error>;
