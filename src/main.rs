//! taskmind CLI - A task manager with insights from a local language model.

use clap::Parser;
use std::path::Path;
use std::process;
use std::sync::Arc;
use taskmind::cli::{Cli, Commands, ConfigCommands, OllamaCommands, TaskCommands};
use taskmind::commands::{self, Output};
use taskmind::config::{ConfigOverrides, ResolvedConfig, resolve_config};
use taskmind::insights::InsightGenerator;
use taskmind::logging;
use taskmind::storage::get_data_dir;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    // The server sets up its own subscriber with a log file.
    if !matches!(cli.command, Commands::Serve { .. }) {
        if let Err(e) = logging::init("warn") {
            eprintln!("Warning: {}", e);
        }
    }

    if let Err(e) = run(cli) {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), taskmind::Error> {
    let human = cli.human_readable;
    let data_dir = get_data_dir(cli.data_dir.as_deref())?;

    let mut overrides = ConfigOverrides::new();
    overrides.ollama_url = cli.ollama_url;
    overrides.ollama_model = cli.model;

    match cli.command {
        Commands::Task { command } => run_task_command(command, &data_dir, human),
        Commands::Stats => {
            output(&commands::stats(&data_dir)?, human);
            Ok(())
        }
        Commands::Insights => {
            let config = resolve_config(&overrides)?;
            let result = commands::insights(&data_dir, &generator(&config))?;
            output(&result, human);
            Ok(())
        }
        Commands::Ollama { command } => {
            let config = resolve_config(&overrides)?;
            let client = config.ollama_client();
            match command {
                OllamaCommands::Status => {
                    let status = commands::ollama_status(
                        &client,
                        &config.ollama_url.value,
                        &config.ollama_model.value,
                    );
                    output(&status, human);
                }
                OllamaCommands::Test => output(&commands::ollama_test(&client)?, human),
            }
            Ok(())
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = resolve_config(&overrides)?;
                output(&commands::config_show(&config), human);
                Ok(())
            }
        },
        Commands::Serve { host, port } => {
            overrides.host = host;
            overrides.port = port;
            let config = resolve_config(&overrides)?;
            run_server(&data_dir, &config)
        }
    }
}

fn run_task_command(command: TaskCommands, data_dir: &Path, human: bool) -> Result<(), taskmind::Error> {
    match command {
        TaskCommands::Create {
            title,
            description,
            status,
            priority,
            due,
        } => {
            let result = commands::task_create(
                data_dir,
                title,
                description,
                status.as_deref(),
                priority.as_deref(),
                due.as_deref(),
            )?;
            output(&result, human);
        }
        TaskCommands::List {
            status,
            priority,
            search,
            page,
        } => {
            let result = commands::task_list(
                data_dir,
                status.as_deref(),
                priority.as_deref(),
                search.as_deref(),
                page,
            )?;
            output(&result, human);
        }
        TaskCommands::Show { id } => output(&commands::task_show(data_dir, id)?, human),
        TaskCommands::Update {
            id,
            title,
            description,
            status,
            priority,
            due,
            clear_due,
        } => {
            let result = commands::task_update(
                data_dir,
                id,
                title,
                description,
                status.as_deref(),
                priority.as_deref(),
                due.as_deref(),
                clear_due,
            )?;
            output(&result, human);
        }
        TaskCommands::Delete { id } => output(&commands::task_delete(data_dir, id)?, human),
        TaskCommands::Toggle { id } => output(&commands::task_toggle(data_dir, id)?, human),
    }
    Ok(())
}

fn generator(config: &ResolvedConfig) -> InsightGenerator {
    InsightGenerator::new(Arc::new(config.ollama_client()), config.insight_settings())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

/// Run the web server
#[cfg(feature = "web")]
fn run_server(data_dir: &Path, config: &ResolvedConfig) -> Result<(), taskmind::Error> {
    use taskmind::storage::Storage;
    use taskmind::web::{AppState, start_server};

    let log_dir = data_dir.join("logs");
    let _guard = logging::init_with_file("info", &log_dir)?;

    let storage = Storage::open_in(data_dir)?;
    tracing::info!("Using database at {}", storage.root().display());
    let state = AppState::new(storage, generator(config));

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| taskmind::Error::Other(format!("Failed to create runtime: {}", e)))?
        .block_on(async {
            start_server(state, &config.host.value, config.port.value)
                .await
                .map_err(|e| taskmind::Error::Other(format!("Web server error: {}", e)))
        })
}

#[cfg(not(feature = "web"))]
fn run_server(_data_dir: &Path, _config: &ResolvedConfig) -> Result<(), taskmind::Error> {
    Err(taskmind::Error::Other(
        "Web server not available: rebuild with the 'web' feature".to_string(),
    ))
}
