//! Events CLI - track events and drive the event pool from the command line.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use events_config_and_utils::{init_logging_with, Config, LogConfig, Paths};

/// Events pool command-line interface.
#[derive(Parser)]
#[command(name = "events")]
#[command(about = "Track events into a durable pool and ship them to the collector")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, cache and logs. Defaults to ~/.events
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Track one event
    Track {
        /// Event type
        event_type: String,
        /// Property as key=value; the value is parsed as JSON when possible
        #[arg(short, long = "property", value_parser = commands::parse_property)]
        properties: Vec<(String, serde_json::Value)>,
        /// Dispatch right after tracking
        #[arg(long)]
        dispatch: bool,
    },
    /// Run one dispatch cycle
    Dispatch,
    /// Show pool status
    Status,
    /// Run the dispatch loop until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    init_logging_with(LogConfig {
        default_level: cli.log_level.unwrap_or_else(|| config.log_level.clone()),
        log_file: Some(paths.log_file()),
        also_stderr: true,
    })?;

    match cli.command {
        Commands::Track {
            event_type,
            properties,
            dispatch,
        } => {
            commands::track(&config, &paths, event_type, properties, dispatch).await?;
        }
        Commands::Dispatch => {
            commands::dispatch(&config, &paths).await?;
        }
        Commands::Status => {
            commands::status(&config, &paths)?;
        }
        Commands::Run => {
            commands::run(&config, &paths).await?;
        }
    }

    Ok(())
}
