use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use confstore::config::Settings;
use confstore::logging::init_tracing;
use confstore::{Configurator, ShutdownHandle, Value};

#[derive(Parser, Debug)]
#[command(name = "confstore", version, about = "Inspect and edit a JSON-backed config store")]
struct Cli {
    /// Settings file (default: ~/.config/confstore/settings.toml).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Config file to operate on, overriding `store.path` from settings.
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the whole configuration, or one key.
    Get { key: Option<String> },
    /// Exit with status 0 if the key exists, 1 otherwise.
    Has { key: String },
    /// Add a new key. VALUE is parsed as JSON, falling back to a plain string.
    Add { key: String, value: String },
    /// Overwrite an existing key.
    Update { key: String, value: String },
    /// Remove an existing key.
    Delete { key: String },
    /// Keep the cache refreshed and log changes until interrupted.
    Watch,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("loading settings")?;
    if let Some(file) = cli.file {
        settings.store.path = file;
    }

    let options = settings.init_options().context("building store options")?;
    let store = Configurator::init(options)
        .await
        .context("initializing config store")?;

    let result = run(&store, cli.command).await;
    store.shutdown().await;
    result
}

async fn run(store: &Configurator, command: Command) -> Result<ExitCode> {
    match command {
        Command::Get { key: None } => {
            println!("{}", serde_json::to_string_pretty(&store.get())?);
        }
        Command::Get { key: Some(key) } => match store.value(&key) {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => {
                eprintln!("key '{}' not found", key);
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Has { key } => {
            let present = store.has(&key);
            println!("{}", present);
            if !present {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Add { key, value } => store.add(key, parse_value(&value))?,
        Command::Update { key, value } => store.update(key, parse_value(&value))?,
        Command::Delete { key } => store.delete(&key)?,
        Command::Watch => {
            eprintln!(
                "Watching {} (Ctrl-C to stop)",
                store.source().describe()
            );
            ShutdownHandle::new()
                .wait_for_signal()
                .await
                .context("waiting for shutdown signal")?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
