//! CLI argument definitions for taskmind.

use clap::{Parser, Subcommand};

/// taskmind - A task manager with insights from a local language model.
///
/// Tasks live in a SQLite database; `tm insights` asks a local Ollama model
/// for an analysis of the whole list.
#[derive(Parser, Debug)]
#[command(name = "tm")]
#[command(author, version, about = "A task manager with local LLM insights", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Directory holding the task database.
    /// Can also be set via TM_DATA_DIR environment variable.
    #[arg(long = "data-dir", global = true, env = "TM_DATA_DIR")]
    pub data_dir: Option<std::path::PathBuf>,

    /// Base URL of the Ollama server (overrides TM_OLLAMA_URL and config.kdl)
    #[arg(long = "ollama-url", global = true)]
    pub ollama_url: Option<String>,

    /// Preferred model for insights (overrides TM_OLLAMA_MODEL and config.kdl)
    #[arg(long = "model", global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Task management commands
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Show task counts by status, and overdue tasks
    Stats,

    /// Ask the local model for an analysis of all tasks
    Insights,

    /// Inspect the Ollama server
    Ollama {
        #[command(subcommand)]
        command: OllamaCommands,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Start the web interface
    Serve {
        /// Address to bind (default: 127.0.0.1)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (default: 8000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a new task
    Create {
        /// Task title (3-200 characters)
        title: String,

        /// Task description
        #[arg(short, long)]
        description: Option<String>,

        /// Status (todo, doing, done)
        #[arg(short, long)]
        status: Option<String>,

        /// Priority (low, medium, high, urgent)
        #[arg(short, long)]
        priority: Option<String>,

        /// Due date (e.g. "2026-12-31 18:00", "31/12/2026 18:00", RFC 3339)
        #[arg(long)]
        due: Option<String>,
    },

    /// List tasks, newest first
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,

        /// Filter by priority
        #[arg(long)]
        priority: Option<String>,

        /// Search in title and description
        #[arg(long)]
        search: Option<String>,

        /// Page number (10 tasks per page)
        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Show task details
    Show {
        /// Task ID
        id: i64,
    },

    /// Update a task
    Update {
        /// Task ID
        id: i64,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description (empty string clears it)
        #[arg(long)]
        description: Option<String>,

        /// New status (todo, doing, done)
        #[arg(long)]
        status: Option<String>,

        /// New priority (low, medium, high, urgent)
        #[arg(long)]
        priority: Option<String>,

        /// New due date
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,

        /// Remove the due date
        #[arg(long)]
        clear_due: bool,
    },

    /// Delete a task
    Delete {
        /// Task ID
        id: i64,
    },

    /// Advance the status: todo -> doing -> done -> todo
    Toggle {
        /// Task ID
        id: i64,
    },
}

/// Ollama subcommands
#[derive(Subcommand, Debug)]
pub enum OllamaCommands {
    /// Show whether Ollama is reachable and which models are installed
    Status,

    /// Run a one-line chat against the first available model
    Test,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved settings and where each came from
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        // This will panic if the CLI is misconfigured
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_task_create() {
        let cli = Cli::try_parse_from([
            "tm", "task", "create", "Write report", "-p", "high", "--due", "2030-01-01",
        ])
        .unwrap();
        match cli.command {
            Commands::Task {
                command: TaskCommands::Create { title, priority, due, .. },
            } => {
                assert_eq!(title, "Write report");
                assert_eq!(priority.as_deref(), Some("high"));
                assert_eq!(due.as_deref(), Some("2030-01-01"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tm", "stats", "-H", "--model", "mistral"]).unwrap();
        assert!(cli.human_readable);
        assert_eq!(cli.model.as_deref(), Some("mistral"));
    }

    #[test]
    fn test_update_due_conflicts_with_clear_due() {
        let result = Cli::try_parse_from(["tm", "task", "update", "1", "--due", "2030-01-01", "--clear-due"]);
        assert!(result.is_err());
    }
}
